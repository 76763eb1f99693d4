//! The top-level entry point: a `Client` resolves transport-level settings
//! (base URL, TLS verification, proxy, timeout, impersonation) into a
//! `reqwest::Client` and hands out `RequestCore` instances bound to it.
//!
//! # Creating a client
//!
//! - [`new`](Client::new) — client for a base URL with default settings
//! - [`with_config`](Client::with_config) — client built from a `RuntimeConfig`
//!
//! # Configuration
//!
//! - [`config`](Client::config) — returns the resolved configuration

use std::time::Duration;

use tracing::debug;

use crate::{
    Result,
    error::RuntimeError,
    request::RequestCore,
};

const MAX_RETRIES_ENV: &str = "IRONCLAD_MAX_RETRIES";
const MAX_RETRIES_DEFAULT: u32 = 3;

const BACKOFF_BASE_MILLIS_ENV: &str = "IRONCLAD_BACKOFF_BASE_MILLIS";
const BACKOFF_BASE_MILLIS_DEFAULT: u64 = 250;

const BACKOFF_MAX_MILLIS_ENV: &str = "IRONCLAD_BACKOFF_MAX_MILLIS";
const BACKOFF_MAX_MILLIS_DEFAULT: u64 = 30_000;

const RATE_LIMIT_MAX_RETRIES_ENV: &str = "IRONCLAD_RATE_LIMIT_MAX_RETRIES";
const RATE_LIMIT_MAX_RETRIES_DEFAULT: u32 = 5;

const GATHER_WORKERS_ENV: &str = "IRONCLAD_GATHER_WORKERS";
const GATHER_WORKERS_DEFAULT: usize = 8;

/// Runtime-wide defaults resolved from explicit values, then named
/// environment variables, then hard-coded constants — the same three-tier
/// resolution the donor's `ClientConfig::default()` applies to its
/// rate-limit-retries knob.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Base URL every relative endpoint resolves against.
    pub base_url: Option<String>,

    /// Default retry ceiling applied to `RequestCore::max_retries` unless a
    /// caller overrides it per-request.
    pub max_retries: u32,

    /// Default backoff lower bound.
    pub backoff_base: Duration,

    /// Default backoff upper bound.
    pub backoff_max: Duration,

    /// Maximum consecutive 429 retries before giving up (0 disables the cap).
    pub rate_limit_max_retries: u32,

    /// Default worker-pool size for `gather`/`dos` fan-out calls.
    pub gather_workers: usize,

    /// Per-attempt transport timeout.
    pub timeout: Duration,

    /// TLS certificate verification. Disabling this is only ever appropriate
    /// against trusted test fixtures.
    pub verify: bool,

    /// Outbound proxy URL, if any.
    pub proxy: Option<String>,

    /// Opaque impersonation profile, passed through as the `User-Agent`
    /// header since the stock transport has no native browser-impersonation
    /// hook.
    pub impersonate: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            max_retries: env_u32(MAX_RETRIES_ENV).unwrap_or(MAX_RETRIES_DEFAULT),
            backoff_base: Duration::from_millis(
                env_u64(BACKOFF_BASE_MILLIS_ENV).unwrap_or(BACKOFF_BASE_MILLIS_DEFAULT),
            ),
            backoff_max: Duration::from_millis(
                env_u64(BACKOFF_MAX_MILLIS_ENV).unwrap_or(BACKOFF_MAX_MILLIS_DEFAULT),
            ),
            rate_limit_max_retries: env_u32(RATE_LIMIT_MAX_RETRIES_ENV)
                .unwrap_or(RATE_LIMIT_MAX_RETRIES_DEFAULT),
            gather_workers: env_u64(GATHER_WORKERS_ENV)
                .map(|v| v as usize)
                .unwrap_or(GATHER_WORKERS_DEFAULT),
            timeout: Duration::from_secs(30),
            verify: true,
            proxy: None,
            impersonate: None,
        }
    }
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl RuntimeConfig {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Duration::from_secs(seconds);
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn proxy(mut self, url: impl Into<String>) -> Self {
        self.proxy = Some(url.into());
        self
    }

    pub fn impersonate(mut self, profile: impl Into<String>) -> Self {
        self.impersonate = Some(profile.into());
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// The resolved runtime: a `reqwest::Client` plus the defaults every
/// `RequestCore` it hands out is seeded with.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    config: RuntimeConfig,
}

impl Client {
    /// A client bound to `base_url` with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_config(RuntimeConfig::default().base_url(base_url))
    }

    /// A client built from a fully-resolved `RuntimeConfig`.
    pub fn with_config(config: RuntimeConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(!config.verify);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| {
                RuntimeError::other(format!("invalid proxy url {proxy}: {e}"))
            })?;
            builder = builder.proxy(proxy);
        }

        if let Some(profile) = &config.impersonate {
            builder = builder.user_agent(profile.clone());
        }

        let http = builder
            .build()
            .map_err(|e| RuntimeError::other(format!("failed to build transport: {e}")))?;

        debug!(base_url = ?config.base_url, verify = config.verify, "constructed client");
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// A fresh `RequestCore` bound to this client's transport and base URL,
    /// seeded with the runtime's default retry/backoff policy.
    pub fn request(&self) -> RequestCore {
        let base_url = self.config.base_url.clone().unwrap_or_default();
        RequestCore::new(self.http.clone(), base_url)
            .max_retries(self.config.max_retries)
            .backoff(crate::backoff::BackoffPolicy::new(
                self.config.backoff_base,
                self.config.backoff_max,
                crate::backoff::BackoffMode::Exponential,
            ))
    }

    /// The default worker-pool size this runtime resolved for `gather`/`dos`
    /// fan-out calls, for callers that don't want to hard-code one.
    pub fn gather_workers(&self) -> usize {
        self.config.gather_workers
    }

    /// The default 429-retry ceiling this runtime resolved, separate from
    /// the general `max_retries` applied to other status codes.
    pub fn rate_limit_max_retries(&self) -> u32 {
        self.config.rate_limit_max_retries
    }
}
