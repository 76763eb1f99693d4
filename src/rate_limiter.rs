//! Per-`(endpoint, method)` sliding-window rate limiting.

use std::{
    collections::{HashMap, VecDeque},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use reqwest::Method;

/// One configured rule: `rate` calls per `window`, optionally scoped to an
/// endpoint and/or method. Rules are evaluated last-inserted-first; the
/// first match wins in precedence order (exact pair) > (endpoint, any
/// method) > (any endpoint, any method).
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    pub rate: u32,
    pub window: Duration,
    pub endpoint: Option<String>,
    pub method: Option<Method>,
}

impl RateLimitRule {
    pub fn new(rate: u32, window: Duration) -> Self {
        Self {
            rate,
            window,
            endpoint: None,
            method: None,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }
}

fn strip_query(endpoint: &str) -> &str {
    endpoint.split('?').next().unwrap_or(endpoint)
}

/// Per-(endpoint, method) sliding windows. Cloning produces an independent
/// limiter: rules are copied but buckets start empty, matching the rest of
/// the runtime's "clones share no live state" contract.
#[derive(Debug, Default)]
pub struct RateLimiter {
    rules: Mutex<Vec<RateLimitRule>>,
    buckets: Mutex<HashMap<(String, String), VecDeque<Instant>>>,
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        Self {
            rules: Mutex::new(self.rules.lock().clone()),
            buckets: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rule(&self, rule: RateLimitRule) {
        self.rules.lock().push(rule);
    }

    pub fn clear(&self) {
        self.rules.lock().clear();
        self.buckets.lock().clear();
    }

    fn find_rule(&self, endpoint: &str, method: &Method) -> Option<RateLimitRule> {
        let rules = self.rules.lock();

        if let Some(r) = rules
            .iter()
            .rev()
            .find(|r| r.endpoint.as_deref() == Some(endpoint) && r.method.as_ref() == Some(method))
        {
            return Some(r.clone());
        }
        if let Some(r) = rules
            .iter()
            .rev()
            .find(|r| r.endpoint.as_deref() == Some(endpoint) && r.method.is_none())
        {
            return Some(r.clone());
        }
        rules
            .iter()
            .rev()
            .find(|r| r.endpoint.is_none() && r.method.is_none())
            .cloned()
    }

    /// Returns `true` (and records the call) if the call is allowed under
    /// the matching rule; `false` if the window is saturated. A call with no
    /// matching rule is always allowed.
    pub fn allow(&self, endpoint: &str, method: &Method) -> bool {
        let key_endpoint = strip_query(endpoint);
        let Some(rule) = self.find_rule(key_endpoint, method) else {
            return true;
        };
        if rule.rate == 0 {
            return true;
        }

        let key = (key_endpoint.to_string(), method.to_string());
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key).or_default();

        while let Some(&front) = bucket.front() {
            if now.duration_since(front) >= rule.window {
                bucket.pop_front();
            } else {
                break;
            }
        }

        if bucket.len() as u32 >= rule.rate {
            return false;
        }
        bucket.push_back(now);
        true
    }
}
