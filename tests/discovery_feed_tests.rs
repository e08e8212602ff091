use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use portscan_rs::cache::CacheStore;
use portscan_rs::discovery::{
    CycleReport, DiscoveryFeed, DiscoveryManager, HttpDiscoveryFeed, ManagerSettings,
};
use portscan_rs::jobs::JobQueue;
use portscan_rs::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn feed_server() -> String {
    let app = Router::new()
        .route("/bad", get(|| async { "{not json" }))
        .route("/500", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route(
            "/ok",
            get(|| async { r#"{"scan":[{"ipv4":"10.0.0.5","mac":"aa:bb:cc:dd:ee:05"}]}"# }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn feed(url: String) -> HttpDiscoveryFeed {
    HttpDiscoveryFeed::new(url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn malformed_body_is_a_payload_error() {
    let base = feed_server().await;
    let err = feed(format!("{base}/bad")).fetch().await.unwrap_err();
    assert!(matches!(err, Error::FeedPayload(_)), "got {err:?}");
}

#[tokio::test]
async fn server_error_is_a_transport_error() {
    let base = feed_server().await;
    let err = feed(format!("{base}/500")).fetch().await.unwrap_err();
    assert!(matches!(err, Error::Discovery(_)), "got {err:?}");
}

#[tokio::test]
async fn well_formed_feed_yields_normalized_hosts() {
    let base = feed_server().await;
    let hosts = feed(format!("{base}/ok")).fetch().await.unwrap();
    assert_eq!(hosts.len(), 1);
    assert_eq!(hosts[0].ipv4.to_string(), "10.0.0.5");
    assert_eq!(hosts[0].mac, "AA:BB:CC:DD:EE:05");
}

#[tokio::test]
async fn unreachable_feed_gives_an_empty_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let cache = CacheStore::open(dir.path()).unwrap();
    let jobs = Arc::new(JobQueue::new());
    let manager = DiscoveryManager::new(
        feed("http://127.0.0.1:1/".to_string()),
        jobs.clone(),
        cache,
        ManagerSettings {
            cache_expiry: Duration::from_secs(3600),
            drain_poll: Duration::from_millis(10),
            cycle_sleep: Duration::from_millis(10),
        },
    );

    let report = manager.run_cycle(&CancellationToken::new()).await;
    assert_eq!(report, Some(CycleReport::default()));
    assert!(jobs.is_empty());
}
