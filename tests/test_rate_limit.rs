//! Rate-limiter precedence: rules are tried last-inserted-first, so the most
//! specific rule added last governs even though broader rules also match.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use axum::{Router, routing::post};
use ironclad::{
    rate_limiter::{RateLimitRule, RateLimiter},
    request::RequestCore,
};
use reqwest::Method;

#[test_log::test(tokio::test)]
async fn most_specific_last_inserted_rule_governs() {
    let calls = Arc::new(AtomicUsize::new(0));
    let router = Router::new().route(
        "/a",
        post({
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    "ok"
                }
            }
        }),
    );
    let server = ironclad::test_util::spawn(router).await;

    // Rules are keyed by the relative endpoint passed to `.endpoint(...)`,
    // not the resolved absolute URL the request ends up dispatching to.
    let limiter = RateLimiter::new();
    limiter.add_rule(RateLimitRule::new(10, Duration::from_secs(60)));
    limiter.add_rule(RateLimitRule::new(5, Duration::from_secs(60)).endpoint("a"));
    limiter.add_rule(
        RateLimitRule::new(1, Duration::from_secs(60))
            .endpoint("a")
            .method(Method::POST),
    );

    let mut core = RequestCore::new(reqwest::Client::new(), server.base_url.clone())
        .endpoint("a")
        .method(Method::POST)
        .max_retries(0)
        .handle_errors(true)
        .rate_limiter(limiter);

    let first = core.execute().await.unwrap();
    assert!(first.ok);

    // The (endpoint, POST) rule allows only one call per minute, even though
    // the broader endpoint and global rules would still have room.
    let second = core.execute().await.unwrap();
    assert_eq!(second.status, 429);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
