//! Resolved-request invariants: the method is one of the set this runtime
//! understands, and the resolved URL carries a scheme a transport can dial.

use reqwest::Method;

use crate::{Result, error::RuntimeError};

/// HTTP methods this runtime will dispatch. Anything else is rejected before
/// a transport call is attempted.
const ALLOWED_METHODS: &[Method] = &[
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
];

/// Rejects methods this runtime doesn't dispatch (see the component design's
/// Data Model for the allowed set).
pub fn validate_method(method: &Method) -> Result<()> {
    if ALLOWED_METHODS.contains(method) {
        Ok(())
    } else {
        Err(RuntimeError::InvalidMethod {
            method: method.to_string(),
        })
    }
}

/// Rejects a resolved URL with no recognized scheme. `base_url`/`endpoint`
/// resolution happens before the transport request is built, so a typo'd
/// `base_url` fails fast instead of surfacing as an opaque transport error.
pub fn validate_url(url: &str) -> Result<()> {
    match url::Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        _ => Err(RuntimeError::InvalidUrl {
            url: url.to_string(),
        }),
    }
}
