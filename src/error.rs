//! Errors returned by `ironclad`.
//!
//! Per-response failures are not modeled as one variant per HTTP status: the
//! classifier (see [`crate::response::classify`]) tags a response with an
//! [`ErrorKind`] and the kind travels with the envelope. `RuntimeError::Response`
//! carries that tag plus enough context to report it; everything else here is
//! ambient (transport, io, (de)serialization, auth setup).

use std::path::PathBuf;

use snafu::prelude::*;

/// Classification of a non-2xx (or synthetic) response. Not a concrete error
/// type per kind: a tag carried alongside the response, per the taxonomy in
/// the component design for error classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, serde::Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Synthetic 599: transport-level exception (connect/timeout/etc).
    Network,
    /// Synthetic 598: circuit breaker denied the attempt.
    CircuitBreaker,
    /// Synthetic 597: a dependency callback raised.
    DependencyRuntime,
    /// Synthetic 596: a dependency callback returned falsy.
    DependencyFailed,
    /// 422, or 400 without missing-parameter keywords.
    Validation,
    /// 400 with missing/required/parameter/field/empty keywords.
    MissingParameter,
    /// 404.
    NotFound,
    /// 405.
    MethodNotAllowed,
    /// 429 or 420.
    RateLimit,
    /// 415.
    Parsing,
    /// 401/403 with expired/token/authorization/signature/credential/jwt keywords.
    TokenExpired,
    /// 403, after the token-expired rule.
    PermissionDenied,
    /// 401, after the token-expired rule.
    Auth,
    /// 502/503/504.
    Gateway,
    /// Any other 5xx.
    Server,
    /// Anything else non-2xx.
    Unexpected,
}

impl ErrorKind {
    /// The synthetic or HTTP status code most associated with this kind.
    /// Real HTTP statuses are carried separately on the envelope; this is
    /// only meaningful for the synthetic 596-599 kinds.
    pub fn synthetic_code(self) -> Option<u16> {
        match self {
            ErrorKind::Network => Some(599),
            ErrorKind::CircuitBreaker => Some(598),
            ErrorKind::DependencyRuntime => Some(597),
            ErrorKind::DependencyFailed => Some(596),
            _ => None,
        }
    }
}

/// Errors returned by the ironclad request runtime.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuntimeError {
    /// A classified response failure (see [`ErrorKind`]). Raised only when
    /// the originating request did not opt in to `handle_errors`.
    #[snafu(display("{kind} ({status} {method} {url}): {message}"))]
    Response {
        kind: ErrorKind,
        status: u16,
        method: String,
        url: String,
        message: String,
    },

    /// The transport itself raised (connect refused, TLS failure, timeout, ...).
    #[snafu(display("transport error: {method} {url}"))]
    Transport {
        method: String,
        url: String,
        source: reqwest::Error,
    },

    /// `resolve_method_url` rejected the resolved URL (no recognized scheme).
    #[snafu(display("invalid url resolved from base_url/endpoint: {url}"))]
    InvalidUrl { url: String },

    /// `resolve_method_url` rejected the method.
    #[snafu(display("invalid http method: {method}"))]
    InvalidMethod { method: String },

    /// Resumable download file I/O failed.
    #[snafu(display("io error on {path}"))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Request body failed to serialize to JSON.
    #[snafu(display("failed to serialize request body"))]
    Serialization { source: serde_json::Error },

    /// JWT signing failed.
    #[snafu(display("jwt encoding failed"))]
    Jwt { source: jsonwebtoken::errors::Error },

    /// OAuth2 client-credentials exchange failed on both the Basic-auth and
    /// body-credentials attempts.
    #[snafu(display("oauth2 token refresh failed: {message}"))]
    OAuth { message: String },

    /// Generic internal/config error that does not fit the above.
    #[snafu(display("{message}"))]
    Other { message: String },
}

impl RuntimeError {
    /// The [`ErrorKind`] of a classified response failure, if this is one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RuntimeError::Response { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The HTTP (or synthetic) status code of a classified response failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            RuntimeError::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn other(message: impl Into<String>) -> Self {
        RuntimeError::Other {
            message: message.into(),
        }
    }
}
