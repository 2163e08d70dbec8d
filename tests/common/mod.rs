//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use routekit::config::ListenerConfig;
use routekit::{HandlerSource, HttpServer, Shutdown};
use tokio::net::TcpListener;

pub const TOKEN: &str = "test-token";

/// Serve `source` on an ephemeral port until `shutdown.trigger()`.
pub async fn spawn_server(source: HandlerSource) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let server = HttpServer::new(&ListenerConfig::default(), source);
    let stop = shutdown.clone();
    tokio::spawn(async move {
        server.run(listener, stop).await.unwrap();
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Poll `check` every 50ms until it returns true or `limit` elapses.
#[allow(dead_code)]
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
