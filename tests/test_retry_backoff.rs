//! Exponential backoff over a flaky server: retries exhaust before success,
//! and the resolved envelope reflects the eventual 200.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use axum::{Router, routing::get};
use ironclad::{
    backoff::{BackoffMode, BackoffPolicy},
    request::RequestCore,
};

#[test_log::test(tokio::test)]
async fn exponential_backoff_retries_until_success() {
    let calls = Arc::new(AtomicUsize::new(0));

    let router = Router::new().route(
        "/flaky",
        get({
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        (axum::http::StatusCode::SERVICE_UNAVAILABLE, "unavailable")
                    } else {
                        (axum::http::StatusCode::OK, "ok")
                    }
                }
            }
        }),
    );

    let server = ironclad::test_util::spawn(router).await;

    let mut core = RequestCore::new(reqwest::Client::new(), server.base_url.clone())
        .endpoint("flaky")
        .retry_codes([503])
        .max_retries(2)
        .backoff(BackoffPolicy::new(
            Duration::from_millis(20),
            Duration::from_millis(200),
            BackoffMode::Exponential,
        ));

    let envelope = core.execute().await.unwrap();
    assert!(envelope.ok);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test_log::test(tokio::test)]
async fn retries_exhausted_returns_terminal_failure() {
    let router = Router::new().route(
        "/always-503",
        get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "nope") }),
    );
    let server = ironclad::test_util::spawn(router).await;

    let mut core = RequestCore::new(reqwest::Client::new(), server.base_url.clone())
        .endpoint("always-503")
        .retry_codes([503])
        .max_retries(1)
        .handle_errors(true)
        .backoff(BackoffPolicy::new(
            Duration::from_millis(5),
            Duration::from_millis(20),
            BackoffMode::Exponential,
        ));

    let envelope = core.execute().await.unwrap();
    assert_eq!(envelope.status, 503);
    assert!(!envelope.ok);
}
