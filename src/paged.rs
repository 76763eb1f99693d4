//! Forward/backward walking over paginated responses.
//!
//! Each step re-issues a clone of the starting `RequestCore` with its query
//! rewritten from the pagination metadata discovered in the previous
//! envelope (page/limit, offset/limit, or a cursor), stopping when the
//! relevant `has_next`/`has_prev` flag goes false or `max` steps have run.
//! See the component design for `Paginator`.

use futures::stream::{BoxStream, unfold};

use crate::{
    Result,
    request::RequestCore,
    response::{PaginationInfo, ResponseEnvelope},
};

/// Which way `walk_paginate` advances from one envelope to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

struct WalkState {
    next: Option<RequestCore>,
    steps: usize,
    max: usize,
    direction: Direction,
}

/// Rewrites `base`'s query for the next step, using whichever pagination
/// style the previous envelope exposed: cursor takes precedence over
/// page/limit, which takes precedence over offset/limit.
fn advance(base: &RequestCore, info: &PaginationInfo, direction: Direction) -> Option<RequestCore> {
    match direction {
        Direction::Forward => {
            if !info.has_next() {
                return None;
            }
            if let Some(cursor) = &info.next_cursor {
                return Some(base.clone().param("cursor", cursor.clone()));
            }
            if let (Some(page), Some(limit)) = (info.page, info.limit) {
                return Some(base.clone().param("page", page + 1).param("limit", limit));
            }
            if let (Some(offset), Some(limit)) = (info.offset, info.limit) {
                return Some(
                    base.clone()
                        .param("offset", offset + limit)
                        .param("limit", limit),
                );
            }
            None
        }
        Direction::Backward => {
            if !info.has_prev() {
                return None;
            }
            if let Some(cursor) = &info.prev_cursor {
                return Some(base.clone().param("cursor", cursor.clone()));
            }
            if let (Some(page), Some(limit)) = (info.page, info.limit) {
                if page <= 1 {
                    return None;
                }
                return Some(base.clone().param("page", page - 1).param("limit", limit));
            }
            if let (Some(offset), Some(limit)) = (info.offset, info.limit) {
                if offset == 0 {
                    return None;
                }
                return Some(
                    base.clone()
                        .param("offset", offset.saturating_sub(limit))
                        .param("limit", limit),
                );
            }
            None
        }
    }
}

/// Walks a paginated endpoint starting from `start`, yielding one envelope
/// per step until pagination metadata says there is nothing more in
/// `direction`, or `max` steps have been taken.
pub struct Paginator;

impl Paginator {
    pub fn walk_paginate(
        start: RequestCore,
        direction: Direction,
        max: usize,
    ) -> BoxStream<'static, Result<ResponseEnvelope>> {
        let state = WalkState {
            next: Some(start),
            steps: 0,
            max,
            direction,
        };

        Box::pin(unfold(state, move |mut state| async move {
            let mut core = state.next.take()?;
            if state.steps >= state.max {
                return None;
            }

            let result = core.execute().await;
            state.steps += 1;

            match result {
                Ok(envelope) => {
                    let info = envelope.pagination();
                    state.next = advance(&core, &info, state.direction);
                    Some((Ok(envelope), state))
                }
                Err(e) => Some((Err(e), state)),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use reqwest::{Method, StatusCode, header::HeaderMap};
    use std::time::Duration;

    fn core() -> RequestCore {
        // Any unreachable host is fine: these tests only exercise `advance`,
        // never a real transport call.
        RequestCore::new(reqwest::Client::new(), "http://example.invalid").max_retries(0)
    }

    fn info(json: &str) -> PaginationInfo {
        let envelope = ResponseEnvelope::from_parts(
            StatusCode::OK,
            "http://x".into(),
            Method::GET,
            &HeaderMap::new(),
            Bytes::from(json.to_string()),
            Duration::ZERO,
            Duration::ZERO,
            true,
        );
        envelope.pagination()
    }

    #[test]
    fn advance_forward_rewrites_page_and_limit() {
        let base = core();
        let meta = info(r#"{"page": 1, "limit": 10, "total": 25}"#);
        let next = advance(&base, &meta, Direction::Forward).unwrap();
        assert_eq!(next.param_snapshot().get("page"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn advance_forward_stops_when_has_next_is_false() {
        let base = core();
        let meta = info(r#"{"page": 3, "limit": 10, "total": 25}"#);
        assert!(advance(&base, &meta, Direction::Forward).is_none());
    }

    #[test]
    fn advance_backward_stops_at_first_page() {
        let base = core();
        let meta = info(r#"{"page": 1, "limit": 10, "total": 25}"#);
        assert!(advance(&base, &meta, Direction::Backward).is_none());
    }

    #[test]
    fn advance_prefers_cursor_over_page_limit() {
        let base = core();
        let meta = info(r#"{"page": 1, "limit": 10, "total": 25, "next_cursor": "abc"}"#);
        let next = advance(&base, &meta, Direction::Forward).unwrap();
        assert_eq!(
            next.param_snapshot().get("cursor"),
            Some(&serde_json::json!("abc"))
        );
    }
}
