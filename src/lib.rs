/*
 * ironclad
 * github.com/stevelr/ironclad
 *
 * SPDX-FileCopyrightText: 2025-2026 Steve Schoettler
 * SPDX-License-Identifier: Apache-2.0
 */
//! # ironclad
//!
//! A fault-tolerant HTTP client runtime: a composable wrapper around
//! `reqwest` that adds retries, exponential/jittered backoff, per-endpoint
//! rate limiting, a circuit breaker, dependency pre-checks, OAuth2 token
//! lifecycle management, server-sent-event parsing, resumable streaming
//! downloads, multipart uploads, GraphQL transport, pagination walking,
//! response classification, concurrent fan-out, and a hook system — all
//! exposed through one fluent, cloneable request object.
//!
//! ## Features
//!
//! - retries with exponential, jittered, or decorrelated backoff, honoring
//!   server `Retry-After` headers
//! - per-(endpoint, method) sliding-window rate limiting
//! - a three-state circuit breaker
//! - OAuth2 client-credentials refresh, Basic-then-body fallback
//! - server-sent-event streaming with incremental framing
//! - resumable, adaptively-chunked downloads
//! - cursor/page/offset pagination walking, forward and backward
//! - concurrent fan-out (`multi`/`gather`/`dos`) over request clones
//! - structured logging, metrics, and a typed error hierarchy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ironclad::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let client = Client::new("https://api.example.com")?;
//!
//! let response = client.request()
//!     .endpoint("widgets")
//!     .max_retries(5)
//!     .auth(AuthScheme::bearer("my-token"))
//!     .execute()
//!     .await?;
//!
//! println!("{}", response.data);
//! # Ok(())
//! # }
//! ```
//!
//! ## API structure
//!
//! `Client` resolves transport settings (base URL, TLS verification, proxy,
//! timeout) into a `reqwest::Client` and hands out `RequestCore` instances.
//! `RequestCore` is the fluent builder: chained setters configure the
//! request, and a terminal call (`execute`, `download`, `stream`) runs it.
//! `Resource` wraps a `RequestCore` behind a path-prefix surface with
//! `list/get/create/update/delete` verbs for REST-shaped endpoints.
//! `Paginator` and the `fanout` module compose additional calls on top of
//! the same `RequestCore`.

pub mod auth;
pub mod backoff;
pub mod breaker;
pub mod client;
pub mod downloader;
pub mod error;
pub mod fanout;
pub mod files;
pub mod hooks;
pub mod metrics;
pub mod paged;
pub mod rate_limiter;
pub mod request;
pub mod response;
pub mod sse;
pub mod validation;

#[cfg(feature = "test-util")]
pub mod test_util;

/// Result type alias using `RuntimeError` as the default error.
pub type Result<T, E = crate::error::RuntimeError> = std::result::Result<T, E>;

/// Prelude module - import (nearly) all the things with `use ironclad::prelude::*;`
pub mod prelude {
    pub use super::Result;

    // Error types
    pub use crate::error::{ErrorKind, RuntimeError};

    pub use crate::{
        auth::{AuthScheme, OAuth2Config},
        backoff::{BackoffMode, BackoffPolicy},
        breaker::CircuitBreaker,
        client::{Client, RuntimeConfig},
        downloader::DownloadOutcome,
        fanout::{GatherHandle, RequestBuilder},
        files::FileInput,
        hooks::{HookEvent, HookPayload},
        metrics::{RuntimeMetrics, RuntimeMetricsSnapshot},
        paged::{Direction, Paginator},
        rate_limiter::{RateLimitRule, RateLimiter},
        request::{BlockingRequestCore, RequestCore, Resource},
        response::{PaginationInfo, ResponseEnvelope},
        sse::{SseEvent, SseHandle, SseParser},
    };
}
