//! Hook dispatch order: `before -> (retry)* -> (after, success)` on success,
//! `before -> (retry)* -> (error, after)` on a handled failure. Hooks are
//! fire-and-forget (see `hooks.rs`), so the recorder waits a beat for the
//! spawned tasks to land before asserting the recorded sequence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Router, routing::get};
use ironclad::{hooks::HookEvent, request::RequestCore};

/// Registers a callback for every event category that appends the fired
/// event to `log`, preserving dispatch order.
fn attach_recorder(mut core: RequestCore, log: &Arc<Mutex<Vec<HookEvent>>>) -> RequestCore {
    for event in [
        HookEvent::Before,
        HookEvent::After,
        HookEvent::Retry,
        HookEvent::Success,
        HookEvent::Error,
    ] {
        let log = log.clone();
        core = core.on(
            event,
            Arc::new(move |e, _payload| {
                log.lock().unwrap().push(e);
            }),
        );
    }
    core
}

#[test_log::test(tokio::test)]
async fn success_dispatches_after_before_success() {
    let router = Router::new().route("/ok", get(|| async { "ok" }));
    let server = ironclad::test_util::spawn(router).await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut core = attach_recorder(
        RequestCore::new(reqwest::Client::new(), server.base_url.clone()).endpoint("ok"),
        &log,
    );

    let envelope = core.execute().await.unwrap();
    assert!(envelope.ok);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let recorded = log.lock().unwrap().clone();
    assert_eq!(recorded, vec![HookEvent::Before, HookEvent::After, HookEvent::Success]);
}

#[test_log::test(tokio::test)]
async fn handled_failure_dispatches_error_before_after() {
    let router = Router::new().route(
        "/fail",
        get(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }),
    );
    let server = ironclad::test_util::spawn(router).await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut core = attach_recorder(
        RequestCore::new(reqwest::Client::new(), server.base_url.clone())
            .endpoint("fail")
            .max_retries(0)
            .handle_errors(true),
        &log,
    );

    let envelope = core.execute().await.unwrap();
    assert!(!envelope.ok);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let recorded = log.lock().unwrap().clone();
    assert_eq!(recorded, vec![HookEvent::Before, HookEvent::Error, HookEvent::After]);
}
