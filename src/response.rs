//! Response classification and the envelope returned from every call.
//!
//! `classify` turns a raw status code plus a body prefix into an
//! [`ErrorKind`]; [`ResponseEnvelope`] is the terminal value every request
//! resolves to, whether it succeeded or was classified as a handled failure.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{Method, StatusCode, header::HeaderMap};
use serde_json::Value;

use crate::error::ErrorKind;

const ENVELOPE_KEYS: &[&str] = &["items", "results", "rows", "records", "payload", "data"];
const METADATA_KEYS: &[&str] = &["errors", "error", "status", "message", "msg", "success"];

const MISSING_PARAMETER_KEYWORDS: &[&str] = &["missing", "required", "parameter", "field", "empty"];
const TOKEN_EXPIRED_KEYWORDS: &[&str] = &[
    "expired",
    "token",
    "authorization",
    "signature",
    "credential",
    "jwt",
];

/// Classifies a response by status code and a lower-cased body prefix (the
/// first 200 characters of the body are enough; callers may pass more).
pub fn classify(status: u16, body_prefix: &str) -> ErrorKind {
    let body = body_prefix.to_lowercase();
    let contains_any = |keywords: &[&str]| keywords.iter().any(|k| body.contains(k));

    match status {
        599 => return ErrorKind::Network,
        598 => return ErrorKind::CircuitBreaker,
        597 => return ErrorKind::DependencyRuntime,
        596 => return ErrorKind::DependencyFailed,
        _ => {}
    }

    if (200..300).contains(&status) {
        return ErrorKind::Unexpected;
    }

    match status {
        422 => ErrorKind::Validation,
        400 => {
            if contains_any(MISSING_PARAMETER_KEYWORDS) {
                ErrorKind::MissingParameter
            } else {
                ErrorKind::Validation
            }
        }
        404 => ErrorKind::NotFound,
        405 => ErrorKind::MethodNotAllowed,
        429 | 420 => ErrorKind::RateLimit,
        415 => ErrorKind::Parsing,
        401 | 403 => {
            if contains_any(TOKEN_EXPIRED_KEYWORDS) {
                ErrorKind::TokenExpired
            } else if status == 403 {
                ErrorKind::PermissionDenied
            } else {
                ErrorKind::Auth
            }
        }
        502 | 503 | 504 => ErrorKind::Gateway,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Unexpected,
    }
}

/// Status codes treated as "unauthenticated": real HTTP 401 plus the common
/// framework-specific variants.
pub fn is_unauthenticated(status: u16, body_prefix: &str) -> bool {
    matches!(status, 401 | 498 | 419 | 440) || {
        let body = body_prefix.to_lowercase();
        TOKEN_EXPIRED_KEYWORDS.iter().any(|k| body.contains(k))
    }
}

/// The terminal value every call resolves to: a parsed, classified
/// response. Deliberately does not carry the originating request
/// configuration — callers that need it should capture it themselves before
/// dispatch.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub ok: bool,
    pub status: u16,
    pub code: u16,
    pub success: bool,
    pub message: String,
    pub errors: Value,
    pub data: Value,
    pub json: Value,
    pub text: String,
    pub bytes: Bytes,
    pub url: String,
    pub method: Method,
    pub request_time: Duration,
    pub total_time: Duration,
    pub handled: bool,
    pub kind: Option<ErrorKind>,
}

impl ResponseEnvelope {
    /// Builds an envelope from a fully-read transport response.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        status: StatusCode,
        url: String,
        method: Method,
        headers: &HeaderMap,
        bytes: Bytes,
        request_time: Duration,
        total_time: Duration,
        handle_errors: bool,
    ) -> Self {
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let json = parse_tolerant(&text).unwrap_or(Value::Null);
        let ok = status.is_success();

        let success = json
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(ok);

        let code = json
            .get("status")
            .and_then(Value::as_u64)
            .map(|v| v as u16)
            .unwrap_or(status.as_u16());

        let message = extract_message(&json, ok);
        let errors = first_nonempty(&json, &["errors", "error", "err"]).unwrap_or(Value::Null);
        let data = project_data(&json);

        let prefix: String = text.chars().take(200).collect();
        let kind = if ok {
            None
        } else {
            Some(classify(status.as_u16(), &prefix))
        };

        let _ = headers;

        Self {
            ok,
            status: status.as_u16(),
            code,
            success,
            message,
            errors,
            data,
            json,
            text,
            bytes,
            url,
            method,
            request_time,
            total_time,
            handled: handle_errors,
            kind,
        }
    }

    /// Builds a synthesized envelope for transport-level or pre-flight
    /// failures that never reached the wire (codes 596-599, per the
    /// classifier).
    pub fn synthetic(
        code: u16,
        method: Method,
        url: String,
        message: impl Into<String>,
        handle_errors: bool,
    ) -> Self {
        let message = message.into();
        Self {
            ok: false,
            status: code,
            code,
            success: false,
            message: message.clone(),
            errors: Value::String(message),
            data: Value::Null,
            json: Value::Null,
            text: String::new(),
            bytes: Bytes::new(),
            url,
            method,
            request_time: Duration::ZERO,
            total_time: Duration::ZERO,
            handled: handle_errors,
            kind: Some(classify(code, "")),
        }
    }

    /// The auth token discovered by deep-searching the response body for
    /// common token field names, falling back to the `Authorization`
    /// request header's second token (the bearer value).
    pub fn auth_token(&self, request_authorization_header: Option<&str>) -> Option<String> {
        const KEYS: &[&str] = &["token", "auth_token", "access_token", "oauth_token", "bearer_token"];
        for key in KEYS {
            if let Some(v) = deep_find(&self.json, key) {
                if let Some(s) = v.as_str() {
                    return Some(s.to_string());
                }
            }
        }
        request_authorization_header.and_then(|h| h.split_whitespace().nth(1).map(str::to_string))
    }

    pub fn pagination(&self) -> PaginationInfo {
        PaginationInfo::discover(&self.json)
    }
}

fn parse_tolerant(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str(trimmed) {
        return Some(v);
    }
    // tolerate single-quoted, python-dict-ish bodies by swapping quotes
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let normalized = trimmed.replace('\'', "\"");
        if let Ok(v) = serde_json::from_str(&normalized) {
            return Some(v);
        }
    }
    None
}

/// Strips envelope keys (`items`/`results`/`rows`/`records`/`payload`/`data`)
/// and metadata keys (`errors`/`error`/`status`/`message`/`msg`/`success`)
/// from a top-level object body; non-object bodies pass through unchanged.
fn project_data(json: &Value) -> Value {
    let Value::Object(map) = json else {
        return json.clone();
    };
    let mut stripped = map.clone();
    for key in ENVELOPE_KEYS.iter().chain(METADATA_KEYS) {
        stripped.remove(*key);
    }
    Value::Object(stripped)
}

fn first_nonempty(json: &Value, keys: &[&str]) -> Option<Value> {
    for key in keys {
        if let Some(v) = json.get(key) {
            if !is_empty_value(v) {
                return Some(v.clone());
            }
        }
    }
    None
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

fn extract_message(json: &Value, ok: bool) -> String {
    if let Some(v) = first_nonempty(json, &["message", "msg", "messages"]) {
        return flatten_message(&v).unwrap_or_else(|| default_message(ok));
    }
    default_message(ok)
}

fn default_message(ok: bool) -> String {
    if ok { "Success".to_string() } else { "Failed".to_string() }
}

fn flatten_message(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(a) => a.first().and_then(flatten_message),
        Value::Object(o) => o
            .get("message")
            .or_else(|| o.get("msg"))
            .and_then(|inner| inner.as_str().map(str::to_string))
            .or_else(|| {
                o.iter()
                    .next()
                    .map(|(k, val)| format!("{k}: {val}"))
            }),
        _ => None,
    }
}

fn deep_find<'a>(json: &'a Value, key: &str) -> Option<&'a Value> {
    match json {
        Value::Object(map) => {
            if let Some(v) = map.get(key) {
                return Some(v);
            }
            map.values().find_map(|v| deep_find(v, key))
        }
        Value::Array(items) => items.iter().find_map(|v| deep_find(v, key)),
        _ => None,
    }
}

const PAGE_KEYS: &[&str] = &["page", "current_page", "pageIndex", "page_index"];
const LIMIT_KEYS: &[&str] = &["limit", "per_page", "size", "pageSize", "first", "last", "count"];
const OFFSET_KEYS: &[&str] = &["offset", "skip"];
const TOTAL_KEYS: &[&str] = &["total", "total_count", "totalCount"];
const NEXT_KEYS: &[&str] = &["next", "next_page", "nextPage", "hasNextPage", "hasNext"];
const PREV_KEYS: &[&str] = &["prev", "prev_page", "prevPage", "hasPrevPage", "hasPrev"];
const NEXT_CURSOR_KEYS: &[&str] = &["next_cursor", "endCursor", "end_cursor"];
const PREV_CURSOR_KEYS: &[&str] = &["prev_cursor", "startCursor", "start_cursor"];

/// Pagination metadata discovered in a response body, per the key sets in
/// the component design for `ResponseModel`.
#[derive(Debug, Clone, Default)]
pub struct PaginationInfo {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub total: Option<u64>,
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
    has_next_marker: bool,
    has_prev_marker: bool,
}

impl PaginationInfo {
    fn discover(json: &Value) -> Self {
        let find_u64 = |keys: &[&str]| -> Option<u64> {
            keys.iter().find_map(|k| deep_find(json, k)).and_then(as_u64)
        };
        let find_str = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .find_map(|k| deep_find(json, k))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let find_truthy = |keys: &[&str]| -> bool {
            keys.iter()
                .filter_map(|k| deep_find(json, k))
                .any(is_truthy)
        };

        Self {
            page: find_u64(PAGE_KEYS),
            limit: find_u64(LIMIT_KEYS),
            offset: find_u64(OFFSET_KEYS),
            total: find_u64(TOTAL_KEYS),
            next_cursor: find_str(NEXT_CURSOR_KEYS),
            prev_cursor: find_str(PREV_CURSOR_KEYS),
            has_next_marker: find_truthy(NEXT_KEYS),
            has_prev_marker: find_truthy(PREV_KEYS),
        }
    }

    /// True if a next-marker or next-cursor was found, else computed from
    /// `(page * limit) < total`.
    pub fn has_next(&self) -> bool {
        if self.has_next_marker || self.next_cursor.is_some() {
            return true;
        }
        match (self.page, self.limit, self.total) {
            (Some(page), Some(limit), Some(total)) => page.saturating_mul(limit) < total,
            _ => false,
        }
    }

    pub fn has_prev(&self) -> bool {
        if self.has_prev_marker || self.prev_cursor.is_some() {
            return true;
        }
        matches!(self.page, Some(page) if page > 1)
    }
}

fn as_u64(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        Value::Null => false,
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
