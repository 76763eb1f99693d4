//! Three-state circuit breaker guarding outbound calls.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
struct Inner {
    state: State,
    failures: u32,
    opened_at: Option<Instant>,
    half_open_probe_used: bool,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            state: State::Closed,
            failures: 0,
            opened_at: None,
            half_open_probe_used: false,
        }
    }
}

/// Guards outbound calls with closed / open / half-open states. See the
/// transition table in the component design for `CircuitBreaker`.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Arc<Mutex<Inner>>,
    pub threshold: u32,
    pub cooldown: Duration,
}

impl Clone for CircuitBreaker {
    /// Deep clone: the new breaker starts from the current state but does
    /// not share it with the original (no live session is shared across
    /// clones, matching the rest of the runtime).
    fn clone(&self) -> Self {
        let state = self.inner.lock().clone();
        Self {
            inner: Arc::new(Mutex::new(state)),
            threshold: self.threshold,
            cooldown: self.cooldown,
        }
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            threshold,
            cooldown,
        }
    }

    pub fn reset(&self) {
        *self.inner.lock() = Inner::default();
    }

    /// Whether the next attempt may proceed. `OPEN` transitions to
    /// `HALF_OPEN` and admits exactly one probe once the cooldown elapses; a
    /// second concurrent probe in `HALF_OPEN` is denied.
    pub fn allowed(&self) -> bool {
        let mut g = self.inner.lock();

        if g.state == State::Open {
            let opened_at = g.opened_at.unwrap_or_else(Instant::now);
            if Instant::now() >= opened_at + self.cooldown {
                g.state = State::HalfOpen;
                g.half_open_probe_used = false;
            } else {
                return false;
            }
        }

        match g.state {
            State::Closed => true,
            State::HalfOpen => {
                if g.half_open_probe_used {
                    false
                } else {
                    g.half_open_probe_used = true;
                    true
                }
            }
            State::Open => unreachable!("handled above"),
        }
    }

    /// Records the outcome of an attempt that [`allowed`](Self::allowed) admitted.
    pub fn update(&self, success: bool) {
        let mut g = self.inner.lock();

        if success {
            g.state = State::Closed;
            g.failures = 0;
            g.half_open_probe_used = false;
            return;
        }

        if g.state == State::HalfOpen {
            g.state = State::Open;
            g.opened_at = Some(Instant::now());
            g.half_open_probe_used = false;
            return;
        }

        g.failures += 1;
        if g.failures >= self.threshold {
            g.state = State::Open;
            g.opened_at = Some(Instant::now());
            g.failures = 0;
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().state == State::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_failures() {
        let cb = CircuitBreaker::new(3, Duration::from_millis(50));
        assert!(cb.allowed());
        cb.update(false);
        assert!(cb.allowed());
        cb.update(false);
        assert!(cb.allowed());
        cb.update(false);
        assert!(cb.is_open());
        assert!(!cb.allowed());
    }

    #[test]
    fn half_open_admits_one_probe() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.update(false);
        assert!(cb.is_open());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allowed());
        // second concurrent probe denied while still half-open
        assert!(!cb.allowed());
    }

    #[test]
    fn successful_probe_closes_breaker() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.update(false);
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allowed());
        cb.update(true);
        assert!(cb.allowed());
        assert!(cb.allowed());
    }

    #[test]
    fn failed_probe_reopens() {
        let cb = CircuitBreaker::new(1, Duration::from_millis(10));
        cb.update(false);
        std::thread::sleep(Duration::from_millis(20));
        assert!(cb.allowed());
        cb.update(false);
        assert!(cb.is_open());
        assert!(!cb.allowed());
    }

    #[test]
    fn clone_does_not_share_state() {
        let cb = CircuitBreaker::new(1, Duration::from_secs(10));
        let clone = cb.clone();
        cb.update(false);
        assert!(cb.is_open());
        assert!(!clone.is_open());
    }
}
