use pricetrek::models::NewSample;
use pricetrek::storage::{SampleStore, SqliteStore};
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn test_sample_survives_reopen() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("data").join("trek.db");

    let mut extra = serde_json::Map::new();
    extra.insert("raw".to_string(), json!("€1.299,00"));
    {
        let store = SqliteStore::open(&path).await?;
        store
            .append_sample(NewSample::new("laptop", 1299.0, "EUR", true).with_meta(extra))
            .await?;
        store.pool().close().await;
    }

    let store = SqliteStore::open(&path).await?;
    let latest = store.recent_samples("laptop", 1).await?;
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].price, 1299.0);
    assert_eq!(latest[0].currency, "EUR");
    assert_eq!(latest[0].in_stock(), Some(true));
    assert_eq!(latest[0].meta.get("raw"), Some(&json!("€1.299,00")));
    Ok(())
}

#[tokio::test]
async fn test_items_are_isolated() -> anyhow::Result<()> {
    let store = SqliteStore::in_memory().await?;
    store.append_sample(NewSample::new("a", 1.0, "USD", true)).await?;
    store.append_sample(NewSample::new("b", 2.0, "USD", true)).await?;
    store.append_sample(NewSample::new("a", 3.0, "USD", false)).await?;

    let a = store.recent_samples("a", 10).await?;
    assert_eq!(a.iter().map(|s| s.price).collect::<Vec<_>>(), vec![3.0, 1.0]);
    assert_eq!(store.delete_item_samples("a").await?, 2);
    assert!(store.latest_sample("a").await?.is_none());
    assert_eq!(store.latest_sample("b").await?.map(|s| s.price), Some(2.0));
    Ok(())
}
