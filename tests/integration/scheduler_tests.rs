use super::*;
use pricetrek::resilience::FetchOptions;
use pricetrek::scheduler::{PollingLoop, ShutdownHandle};
use pricetrek::storage::SampleStore;
use std::time::Duration;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_polling_loop_stops_on_shutdown() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(product_page("$5.00")))
        .mount(&server)
        .await;

    let config = test_config(vec![selector_item("tick", format!("{}/tick", server.uri()))]);
    let (tracker, store) = create_test_tracker(&config).await?;
    let items = tracked_items(&config);

    let (handle, signal) = ShutdownHandle::new();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(180)).await;
        handle.trigger();
    });

    let polling = PollingLoop::new(tracker, Duration::from_millis(50), signal);
    let stats = tokio::time::timeout(
        Duration::from_secs(5),
        polling.run(&items, FetchOptions::default()),
    )
    .await?;
    assert!(stats.runs >= 1);
    assert_eq!(stats.failures, 0);

    // A run interrupted by shutdown may already have written its sample.
    let written = store.recent_samples("tick", 100).await?.len() as u64;
    assert!(written >= stats.runs && written <= stats.runs + 1);
    Ok(())
}

#[tokio::test]
async fn test_triggered_before_start_runs_nothing() -> anyhow::Result<()> {
    let config = test_config(Vec::new());
    let (tracker, _store) = create_test_tracker(&config).await?;

    let (handle, signal) = ShutdownHandle::new();
    handle.trigger();

    let stats = PollingLoop::new(tracker, Duration::from_secs(3600), signal)
        .run(&[], FetchOptions::default())
        .await;
    assert_eq!(stats.runs, 0);
    Ok(())
}
