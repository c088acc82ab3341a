use std::sync::Arc;
use std::time::Duration;

use tablesync::network::{ConnectivityState, NetworkMonitor};

#[tokio::test]
async fn connectivity_check_once_returns_true_for_healthy_server() {
    let mut server = mockito::Server::new_async().await;
    let health = server
        .mock("GET", "/health")
        .with_status(200)
        .create_async()
        .await;

    let ok = NetworkMonitor::check_once(&format!("{}/health", server.url())).await;
    assert!(ok, "expected a reachable health endpoint to count as online");
    health.assert_async().await;
}

#[tokio::test]
async fn connectivity_check_once_treats_http_errors_as_reachable() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/health")
        .with_status(503)
        .create_async()
        .await;

    assert!(NetworkMonitor::check_once(&format!("{}/health", server.url())).await);
}

#[tokio::test]
async fn connectivity_check_once_returns_false_for_unreachable_target() {
    // Nothing listens on port 1 in the test environment.
    let ok = NetworkMonitor::check_once("http://127.0.0.1:1/health").await;
    assert!(!ok, "expected an unreachable target to count as offline");
}

#[tokio::test]
async fn run_loop_publishes_online_status() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/health")
        .with_status(200)
        .expect_at_least(1)
        .create_async()
        .await;

    let monitor = Arc::new(NetworkMonitor::default());
    let mut rx = monitor.subscribe();

    let probe_url = format!("{}/health", server.url());
    let runner = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { monitor.run(probe_url, Duration::from_millis(50)).await })
    };

    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| s.is_online()))
        .await
        .expect("monitor went online in time")
        .expect("monitor alive");
    assert_eq!(monitor.status().state, ConnectivityState::Connected);

    runner.abort();
}

#[tokio::test]
async fn run_loop_moves_to_reconnecting_after_repeated_failures() {
    let monitor = Arc::new(NetworkMonitor::new(tablesync::network::NetworkStatus::online()));
    let mut rx = monitor.subscribe();

    let runner = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move {
            monitor
                .run("http://127.0.0.1:1/health".to_string(), Duration::from_millis(20))
                .await
        })
    };

    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.state == ConnectivityState::Reconnecting),
    )
    .await
    .expect("monitor reached reconnecting in time")
    .expect("monitor alive");
    assert!(!monitor.is_online());

    runner.abort();
}
