//! Circuit breaker trip-and-probe: three consecutive failures open the
//! breaker; a call inside the cooldown window is denied without transport;
//! after cooldown, a single probe that succeeds closes it again.
//!
//! Uses one `RequestCore` throughout (never `.clone()`d) since cloning
//! deliberately gives a breaker its own independent state.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use axum::{Router, routing::get};
use ironclad::{breaker::CircuitBreaker, request::RequestCore};

#[test_log::test(tokio::test)]
async fn breaker_opens_after_threshold_and_recovers_on_probe() {
    let calls = Arc::new(AtomicUsize::new(0));
    let router = Router::new().route(
        "/unstable",
        get({
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < 3 {
                        (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom")
                    } else {
                        (axum::http::StatusCode::OK, "ok")
                    }
                }
            }
        }),
    );
    let server = ironclad::test_util::spawn(router).await;
    let breaker = CircuitBreaker::new(3, Duration::from_millis(100));

    let mut core = RequestCore::new(reqwest::Client::new(), server.base_url.clone())
        .endpoint("unstable")
        .max_retries(0)
        .handle_errors(true)
        .circuit_breaker(breaker);

    for _ in 0..3 {
        let envelope = core.execute().await.unwrap();
        assert_eq!(envelope.status, 500);
    }

    // Denied within the cooldown window: no transport call, terminal 598.
    let envelope = core.execute().await.unwrap();
    assert_eq!(envelope.status, 598);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    tokio::time::sleep(Duration::from_millis(150)).await;

    // The single probe succeeds and closes the breaker.
    let envelope = core.execute().await.unwrap();
    assert!(envelope.ok);

    // Breaker is closed again: another call proceeds to the transport.
    let envelope = core.execute().await.unwrap();
    assert!(envelope.ok);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}
