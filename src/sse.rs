//! Incremental server-sent-event parser with carry-over partial lines.
//!
//! One [`SseParser`] lives per streaming call. Feed it raw chunks as they
//! arrive off the transport; it returns zero or more complete [`SseEvent`]s
//! per chunk and holds any trailing partial line until the next feed.
//! [`SseHandle`] pairs a parser with the live transport response for
//! `RequestCore::stream`.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    Result,
    error::RuntimeError,
    hooks::{HookBus, HookEvent, HookPayload},
};

/// One parsed SSE event, emitted when a blank line terminates a frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

/// Per-request frame accumulator. See the component design for `SseParser`.
#[derive(Debug, Default)]
pub struct SseParser {
    data: Vec<String>,
    event: Option<String>,
    id: Option<String>,
    retry: Option<u64>,
    partial: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk` as UTF-8 (lossy), prepends any carried-over partial
    /// line, splits on line endings, and returns every event completed by a
    /// blank line. A trailing incomplete line is held over for the next feed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let decoded = String::from_utf8_lossy(chunk);
        let mut text = if self.partial.is_empty() {
            decoded.into_owned()
        } else {
            format!("{}{}", std::mem::take(&mut self.partial), decoded)
        };

        let ends_with_break = text.ends_with('\n') || text.ends_with('\r');
        // normalize line endings before splitting
        text = text.replace("\r\n", "\n").replace('\r', "\n");

        let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();

        if ends_with_break {
            // the split produces a trailing empty string for the final terminator
            if lines.last().is_some_and(String::is_empty) {
                lines.pop();
            }
        } else if let Some(last) = lines.pop() {
            self.partial = last;
        }

        let mut events = Vec::new();
        for line in lines {
            self.consume_line(&line, &mut events);
        }
        events
    }

    fn consume_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                events.push(SseEvent {
                    event: self.event.clone().unwrap_or_else(|| "message".to_string()),
                    data: self.data.join("\n"),
                    id: self.id.clone(),
                    retry: self.retry,
                });
            }
            self.data.clear();
            self.event = None;
            self.id = None;
            self.retry = None;
            return;
        }

        if line.starts_with(':') {
            return;
        }

        let (key, value) = match line.split_once(':') {
            Some((k, v)) => (k.trim(), v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };

        match key {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            "retry" => {
                if let Ok(r) = value.parse() {
                    self.retry = Some(r);
                }
            }
            _ => {}
        }
    }

    /// Clears the carry-over partial line and any in-progress frame. Called
    /// on `stop_stream()`.
    pub fn reset(&mut self) {
        self.data.clear();
        self.event = None;
        self.id = None;
        self.retry = None;
        self.partial.clear();
    }
}

/// A live SSE stream: the transport response, its parser, and a cancellation
/// flag checked at each chunk boundary. One call to
/// [`RequestCore::stream`](crate::request::RequestCore::stream) produces one
/// handle.
pub struct SseHandle {
    response: reqwest::Response,
    parser: SseParser,
    stop: Arc<AtomicBool>,
    hooks: HookBus,
}

impl SseHandle {
    pub(crate) fn new(response: reqwest::Response, hooks: HookBus) -> Self {
        Self {
            response,
            parser: SseParser::new(),
            stop: Arc::new(AtomicBool::new(false)),
            hooks,
        }
    }

    /// A cheap, clonable handle to request cancellation. The flag is
    /// consumed at the next chunk boundary; the carry-over is cleared.
    pub fn stopper(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn stop_stream(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Reads the next chunk and returns the events it completed, or `None`
    /// once the stream ends or `stop_stream()` has been called.
    pub async fn next_events(&mut self) -> Option<Result<Vec<SseEvent>>> {
        if self.stop.load(Ordering::Relaxed) {
            self.parser.reset();
            return None;
        }

        match self.response.chunk().await {
            Ok(Some(bytes)) => {
                self.hooks.dispatch(
                    HookEvent::Stream,
                    HookPayload::Stream {
                        chunk_len: bytes.len(),
                    },
                );
                Some(Ok(self.parser.feed(&bytes)))
            }
            Ok(None) => None,
            Err(source) => Some(Err(RuntimeError::Transport {
                method: "GET".to_string(),
                url: self.response.url().to_string(),
                source,
            })),
        }
    }

    /// Blocking-mode equivalent of [`next_events`](Self::next_events), used
    /// by [`crate::request::BlockingRequestCore`].
    pub fn next_events_blocking(
        &mut self,
        handle: &tokio::runtime::Handle,
    ) -> Option<Result<Vec<SseEvent>>> {
        handle.block_on(self.next_events())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_multiple_data_lines_and_defaults_event() {
        let mut p = SseParser::new();
        let events = p.feed(b"data: a\ndata: b\n\nevent: x\ndata: 1\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "message");
        assert_eq!(events[0].data, "a\nb");
        assert_eq!(events[1].event, "x");
        assert_eq!(events[1].data, "1");
    }

    #[test]
    fn holds_over_partial_line_across_chunks() {
        let mut p = SseParser::new();
        let events = p.feed(b"data: a\ndata: b\n\nevent: x\ndata: 1\n");
        assert!(events.len() == 1);
        let events2 = p.feed(b"\n");
        assert_eq!(events2.len(), 1);
        assert_eq!(events2[0].event, "x");
        assert_eq!(events2[0].data, "1");
    }

    #[test]
    fn ignores_comment_lines() {
        let mut p = SseParser::new();
        let events = p.feed(b": keep-alive\ndata: a\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a");
    }

    #[test]
    fn retry_field_only_set_when_parses_as_integer() {
        let mut p = SseParser::new();
        let events = p.feed(b"retry: not-a-number\ndata: a\n\n");
        assert_eq!(events[0].retry, None);

        let events = p.feed(b"retry: 5000\ndata: b\n\n");
        assert_eq!(events[0].retry, Some(5000));
    }

    #[test]
    fn blank_line_without_data_emits_nothing() {
        let mut p = SseParser::new();
        let events = p.feed(b"event: x\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn reset_clears_carry_over() {
        let mut p = SseParser::new();
        let _ = p.feed(b"data: a");
        p.reset();
        let events = p.feed(b"\n\n");
        assert!(events.is_empty());
    }
}
