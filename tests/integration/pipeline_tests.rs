use super::*;
use pricetrek::models::ProviderKind;
use pricetrek::resilience::FetchOptions;
use pricetrek::storage::SampleStore;
use pricetrek::utils::error::{FetchError, TrackError};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_retries_through_transient_server_errors() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page("$19.99")))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(vec![selector_item("flaky", format!("{}/flaky", server.uri()))]);
    let (tracker, store) = create_test_tracker(&config).await?;
    let items = tracked_items(&config);

    let outcome = tracker.track_item(&items[0], FetchOptions::default()).await?;
    assert_eq!(outcome.sample.price, 19.99);
    assert!(!outcome.from_cache);

    let latest = store.latest_sample("flaky").await?.expect("sample written");
    assert_eq!(latest.price, 19.99);
    assert_eq!(latest.currency, "USD");
    Ok(())
}

#[tokio::test]
async fn test_exhausted_retries_write_nothing() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let config = test_config(vec![selector_item("down", format!("{}/down", server.uri()))]);
    let (tracker, store) = create_test_tracker(&config).await?;
    let items = tracked_items(&config);

    let err = tracker
        .track_item(&items[0], FetchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TrackError::Fetch(FetchError::Exhausted { attempts: 3, .. })
    ));
    assert!(store.recent_samples("down", 10).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_one_failing_item_does_not_stop_the_others() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page("$10.00")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/c"))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page("$30.00")))
        .mount(&server)
        .await;

    let config = test_config(vec![
        selector_item("a", format!("{}/a", server.uri())),
        selector_item("b", format!("{}/b", server.uri())),
        selector_item("c", format!("{}/c", server.uri())),
    ]);
    let (tracker, store) = create_test_tracker(&config).await?;

    let summary = tracker.track_all(&tracked_items(&config), FetchOptions::default()).await;
    assert_eq!(summary.tracked, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].0, "b");
    assert!(!summary.is_success());

    assert_eq!(store.recent_samples("a", 10).await?.len(), 1);
    assert!(store.recent_samples("b", 10).await?.is_empty());
    assert_eq!(store.recent_samples("c", 10).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_cached_response_skips_the_network() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cached"))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page("$42.00")))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = test_config(vec![selector_item("cached", format!("{}/cached", server.uri()))]);
    config.defaults.cache_ttl_min = 30;
    let (tracker, store) = create_test_tracker(&config).await?;
    let items = tracked_items(&config);

    let first = tracker.track_item(&items[0], FetchOptions::default()).await?;
    let second = tracker.track_item(&items[0], FetchOptions::default()).await?;
    let forced = tracker
        .track_item(&items[0], FetchOptions { force_refresh: true })
        .await?;

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert!(!forced.from_cache);
    // A cache hit still records a sample.
    assert_eq!(store.recent_samples("cached", 10).await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_unparseable_page_is_not_retried() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>No price</body></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let config = test_config(vec![selector_item("broken", format!("{}/broken", server.uri()))]);
    let (tracker, _store) = create_test_tracker(&config).await?;

    let err = tracker
        .track_item(&tracked_items(&config)[0], FetchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TrackError::Fetch(FetchError::PermanentExtraction(_))));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_provider_end_to_end() -> anyhow::Result<()> {
    let mut item = selector_item("gpu", "https://shop.example.com/gpu".to_string());
    item.provider = ProviderKind::Command;
    item.selector = None;
    item.target_price = Some(50.0);
    item.command = Some(r#"echo '{"price": 42.5, "currency": "USD", "in_stock": true}'"#.to_string());

    let config = test_config(vec![item]);
    let (tracker, store) = create_test_tracker(&config).await?;

    let outcome = tracker
        .track_item(&tracked_items(&config)[0], FetchOptions::default())
        .await?;
    assert_eq!(outcome.sample.price, 42.5);
    assert_eq!(outcome.sample.in_stock(), Some(true));
    assert_eq!(outcome.alerts.len(), 1);
    assert_eq!(outcome.alerts[0].kind.as_str(), "target_reached");

    assert_eq!(store.recent_samples("gpu", 1).await?[0].price, 42.5);
    Ok(())
}
