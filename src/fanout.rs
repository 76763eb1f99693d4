//! Concurrent and sequential fan-out over a base request, one clone per item.
//!
//! `multi` runs sequentially; `gather` runs under a worker-count semaphore;
//! `dos` is `gather` over a synthetic list of identical requests. All three
//! preserve the input order of their results. See the component design for
//! `FanOut`.

use std::sync::Arc;

use reqwest::Method;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::{
    Result,
    error::RuntimeError,
    request::RequestCore,
    response::ResponseEnvelope,
};

/// Customizes one clone of the base `RequestCore` for a single fan-out item
/// (setting its endpoint, method, params, and so on).
pub type RequestBuilder = Box<dyn Fn(RequestCore) -> RequestCore + Send + Sync>;

/// Runs `items` against clones of `base`, one at a time, in order.
pub async fn multi(base: &RequestCore, items: Vec<RequestBuilder>) -> Vec<Result<ResponseEnvelope>> {
    let mut out = Vec::with_capacity(items.len());
    for build in items {
        let mut core = build(base.clone());
        out.push(core.execute().await);
    }
    out
}

/// A running `gather` call. `join` awaits every worker's result in input
/// order; `cancel` aborts outstanding workers without disturbing results
/// already produced.
pub struct GatherHandle {
    handles: Vec<JoinHandle<Result<ResponseEnvelope>>>,
}

impl GatherHandle {
    pub async fn join(self) -> Vec<Result<ResponseEnvelope>> {
        let mut out = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            out.push(match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => {
                    Err(RuntimeError::other("fan-out worker cancelled"))
                }
                Err(_) => Err(RuntimeError::other("fan-out worker panicked")),
            });
        }
        out
    }

    pub fn cancel(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Runs `items` against clones of `base` concurrently, bounded by a
/// semaphore of `max_workers`. Each worker gets its own clone (no shared
/// rate-limiter/breaker state, per their `Clone` impls).
pub fn gather(base: &RequestCore, items: Vec<RequestBuilder>, max_workers: usize) -> GatherHandle {
    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut handles = Vec::with_capacity(items.len());

    for build in items {
        let core = build(base.clone());
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| RuntimeError::other("fan-out semaphore closed"))?;
            let mut core = core;
            core.execute().await
        }));
    }

    GatherHandle { handles }
}

/// `gather` over `count` identical requests to `(method, endpoint)`.
pub fn dos(
    base: &RequestCore,
    count: usize,
    max_workers: usize,
    endpoint: impl Into<String>,
    method: Method,
) -> GatherHandle {
    let endpoint = endpoint.into();
    let items: Vec<RequestBuilder> = (0..count)
        .map(|_| {
            let endpoint = endpoint.clone();
            let method = method.clone();
            Box::new(move |core: RequestCore| core.endpoint(endpoint.clone()).method(method.clone())) as RequestBuilder
        })
        .collect();
    gather(base, items, max_workers)
}
