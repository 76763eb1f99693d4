//! Test-only scaffolding: a disposable local HTTP server for integration
//! tests to exercise retries, rate limiting, SSE, and downloads against real
//! transport I/O instead of mocked internals.

use std::net::SocketAddr;

use axum::Router;
use tokio::task::JoinHandle;

/// A convenience alias for fallible test bodies.
pub type TestResult<T = ()> = anyhow::Result<T>;

/// A running axum server bound to an ephemeral local port. Dropping it aborts
/// the serve task.
pub struct SpawnedServer {
    pub base_url: String,
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl Drop for SpawnedServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Binds `router` to `127.0.0.1:0` and serves it on a background task.
pub async fn spawn(router: Router) -> SpawnedServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let base_url = format!("http://{addr}");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("serve test router");
    });

    SpawnedServer { base_url, addr, handle }
}
