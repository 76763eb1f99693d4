//! Delay computation between retry attempts.
//!
//! A fresh [`BackoffPolicy`] is cloned out for every call to
//! [`RequestCore::execute`](crate::request::RequestCore); `decorrelated` mode
//! seeds its jitter from the previous delay *within that call only* (see the
//! open question this resolves in `DESIGN.md`).

use std::time::Duration;

use rand::Rng;

const MIN_DELAY: Duration = Duration::from_millis(10);

/// How [`BackoffPolicy::delay`] spaces out retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffMode {
    /// `base * 2^attempt`.
    #[default]
    Exponential,
    /// Uniform in `[0, base * 2^attempt]`.
    Jitter,
    /// Uniform in `[base, prev*3]`, where `prev` seeds the next call.
    Decorrelated,
}

/// A `Retry-After` value as parsed off a response: either a relative
/// duration (seconds) or an absolute instant expressed as a delta from now.
#[derive(Debug, Clone, Copy)]
pub enum RetryAfter {
    Seconds(f64),
    Relative(Duration),
}

/// Parses an HTTP `Retry-After` header value: a bare integer/float number of
/// seconds, or an HTTP-date (RFC 1123/2822).
pub fn parse_retry_after(value: &str) -> Option<RetryAfter> {
    let trimmed = value.trim();
    if let Ok(secs) = trimmed.parse::<f64>() {
        return Some(RetryAfter::Seconds(secs));
    }
    let parsed = chrono::DateTime::parse_from_rfc2822(trimmed)
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(trimmed))
        .ok()?;
    let now = chrono::Utc::now();
    let delta = parsed.with_timezone(&chrono::Utc) - now;
    let secs = delta.num_milliseconds() as f64 / 1000.0;
    Some(RetryAfter::Relative(Duration::from_secs_f64(secs.max(0.0))))
}

/// Computes the wait between attempt `n` and `n+1`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub mode: BackoffMode,
    last_delay: Option<Duration>,
}

impl BackoffPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration, mode: BackoffMode) -> Self {
        Self {
            base_delay,
            max_delay,
            mode,
            last_delay: None,
        }
    }

    /// Resets the decorrelated-mode seed. Called at the start of every
    /// `execute` loop so a call's jitter never leaks into the next.
    pub fn reset(&mut self) {
        self.last_delay = None;
    }

    /// Computes the delay for `attempt`. If `retry_after` is present it is
    /// honored directly (no exponent, no upper clamp for the seconds form);
    /// otherwise the configured mode computes a delay, clamped to
    /// `[0.01s, max_delay]` when `max_delay` is nonzero.
    pub fn delay(&mut self, attempt: u32, retry_after: Option<RetryAfter>) -> Duration {
        if let Some(retry_after) = retry_after {
            return match retry_after {
                RetryAfter::Seconds(s) => Duration::from_secs_f64(s.max(0.0)),
                RetryAfter::Relative(d) => d.max(MIN_DELAY),
            };
        }

        let base = self.base_delay.as_secs_f64();
        let exp = base * 2f64.powi(attempt as i32);

        let computed = match self.mode {
            BackoffMode::Exponential => exp,
            BackoffMode::Jitter => rand::rng().random_range(0.0..=exp.max(0.0)),
            BackoffMode::Decorrelated => {
                let prev = self.last_delay.map(|d| d.as_secs_f64()).unwrap_or(base);
                let hi = (prev * 3.0).max(base);
                let computed = rand::rng().random_range(base..=hi);
                self.last_delay = Some(Duration::from_secs_f64(computed));
                computed
            }
        };

        let mut secs = computed;
        if !self.max_delay.is_zero() {
            secs = secs.min(self.max_delay.as_secs_f64());
        }
        secs = secs.max(MIN_DELAY.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_grows_and_clamps() {
        let mut b = BackoffPolicy::new(
            Duration::from_millis(200),
            Duration::from_secs(2),
            BackoffMode::Exponential,
        );
        assert_eq!(b.delay(0, None), Duration::from_millis(200));
        assert_eq!(b.delay(1, None), Duration::from_millis(400));
        // attempt large enough to blow past max_delay
        assert_eq!(b.delay(10, None), Duration::from_secs(2));
    }

    #[test]
    fn delay_never_below_floor() {
        let mut b = BackoffPolicy::new(Duration::ZERO, Duration::ZERO, BackoffMode::Exponential);
        assert!(b.delay(0, None) >= MIN_DELAY);
    }

    #[test]
    fn retry_after_seconds_bypasses_clamp() {
        let mut b = BackoffPolicy::new(
            Duration::from_millis(200),
            Duration::from_secs(1),
            BackoffMode::Exponential,
        );
        let d = b.delay(0, Some(RetryAfter::Seconds(5.0)));
        assert_eq!(d, Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        let mut b = BackoffPolicy::new(
            Duration::from_millis(100),
            Duration::ZERO,
            BackoffMode::Jitter,
        );
        for attempt in 0..5 {
            let d = b.delay(attempt, None);
            let upper = Duration::from_millis(100) * 2u32.pow(attempt);
            assert!(d <= upper.max(MIN_DELAY));
            assert!(d >= MIN_DELAY);
        }
    }

    #[test]
    fn decorrelated_seed_resets_per_call() {
        let mut b = BackoffPolicy::new(
            Duration::from_millis(100),
            Duration::ZERO,
            BackoffMode::Decorrelated,
        );
        let _ = b.delay(0, None);
        assert!(b.last_delay.is_some());
        b.reset();
        assert!(b.last_delay.is_none());
    }

    #[test]
    fn parses_numeric_and_http_date_retry_after() {
        match parse_retry_after("120").unwrap() {
            RetryAfter::Seconds(s) => assert_eq!(s, 120.0),
            _ => panic!("expected seconds form"),
        }
        let future = (chrono::Utc::now() + chrono::Duration::seconds(30)).to_rfc2822();
        match parse_retry_after(&future).unwrap() {
            RetryAfter::Relative(d) => assert!(d.as_secs() > 0),
            _ => panic!("expected relative form"),
        }
    }
}
