//! Event dispatch. Callbacks are registered per category and fired
//! concurrently, off the critical path, with a bounded number in flight at
//! once — once the bound is exhausted, additional dispatches are dropped
//! (logged at debug) rather than queued, so a slow or wedged callback can
//! never back up the request loop.

use std::{fmt, sync::Arc};

use tokio::sync::Semaphore;
use tracing::debug;

use crate::response::ResponseEnvelope;

/// The bound on concurrently in-flight hook callbacks across all categories.
const MAX_IN_FLIGHT: usize = 256;

/// The event categories a [`HookBus`] dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    Before,
    After,
    Retry,
    Success,
    Error,
    Stream,
    Progress,
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookEvent::Before => "before",
            HookEvent::After => "after",
            HookEvent::Retry => "retry",
            HookEvent::Success => "success",
            HookEvent::Error => "error",
            HookEvent::Stream => "stream",
            HookEvent::Progress => "progress",
        };
        f.write_str(s)
    }
}

/// The payload handed to a hook callback. Always a clone or owned value;
/// callbacks cannot mutate the originating request.
#[derive(Debug, Clone)]
pub enum HookPayload {
    Request { method: String, url: String },
    Response(Box<ResponseEnvelope>),
    Error { message: String },
    Stream { chunk_len: usize },
    Progress { downloaded: u64, total: Option<u64> },
}

pub type HookCallback = Arc<dyn Fn(HookEvent, HookPayload) + Send + Sync + 'static>;

/// An ordered, per-category list of callbacks, dispatched concurrently and
/// fire-and-forget.
#[derive(Clone)]
pub struct HookBus {
    before: Vec<HookCallback>,
    after: Vec<HookCallback>,
    retry: Vec<HookCallback>,
    success: Vec<HookCallback>,
    error: Vec<HookCallback>,
    stream: Vec<HookCallback>,
    progress: Vec<HookCallback>,
    in_flight: Arc<Semaphore>,
}

impl fmt::Debug for HookBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookBus")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("retry", &self.retry.len())
            .field("success", &self.success.len())
            .field("error", &self.error.len())
            .field("stream", &self.stream.len())
            .field("progress", &self.progress.len())
            .finish()
    }
}

impl Default for HookBus {
    fn default() -> Self {
        Self::new()
    }
}

impl HookBus {
    pub fn new() -> Self {
        Self {
            before: Vec::new(),
            after: Vec::new(),
            retry: Vec::new(),
            success: Vec::new(),
            error: Vec::new(),
            stream: Vec::new(),
            progress: Vec::new(),
            in_flight: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        }
    }

    pub fn on(&mut self, event: HookEvent, callback: HookCallback) {
        self.list_mut(event).push(callback);
    }

    fn list(&self, event: HookEvent) -> &[HookCallback] {
        match event {
            HookEvent::Before => &self.before,
            HookEvent::After => &self.after,
            HookEvent::Retry => &self.retry,
            HookEvent::Success => &self.success,
            HookEvent::Error => &self.error,
            HookEvent::Stream => &self.stream,
            HookEvent::Progress => &self.progress,
        }
    }

    fn list_mut(&mut self, event: HookEvent) -> &mut Vec<HookCallback> {
        match event {
            HookEvent::Before => &mut self.before,
            HookEvent::After => &mut self.after,
            HookEvent::Retry => &mut self.retry,
            HookEvent::Success => &mut self.success,
            HookEvent::Error => &mut self.error,
            HookEvent::Stream => &mut self.stream,
            HookEvent::Progress => &mut self.progress,
        }
    }

    /// Fires every registered callback for `event` with its own clone of
    /// `payload`, each on its own spawned task. Callbacks that can't acquire
    /// an in-flight permit are dropped, not queued.
    pub fn dispatch(&self, event: HookEvent, payload: HookPayload) {
        for callback in self.list(event) {
            let Ok(permit) = self.in_flight.clone().try_acquire_owned() else {
                debug!(event = %event, "hook dispatch dropped: in-flight bound exhausted");
                continue;
            };
            let callback = callback.clone();
            let payload = payload.clone();
            tokio::spawn(async move {
                callback(event, payload);
                drop(permit);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn dispatches_all_registered_callbacks_for_an_event() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = HookBus::new();
        for _ in 0..3 {
            let counter = counter.clone();
            bus.on(
                HookEvent::After,
                Arc::new(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        bus.dispatch(
            HookEvent::After,
            HookPayload::Request {
                method: "GET".into(),
                url: "http://x".into(),
            },
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unrelated_events_do_not_fire_callback() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = HookBus::new();
        let counter_clone = counter.clone();
        bus.on(
            HookEvent::Error,
            Arc::new(move |_, _| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        bus.dispatch(HookEvent::Success, HookPayload::Error { message: "x".into() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
