//! Incremental decoder for the chat event stream.
//!
//! Decoding is a pure step function: [`decode`] takes the previous
//! [`DecoderState`] and one chunk of bytes and returns the events completed
//! by that chunk plus the next state. Bytes are buffered until a newline, so
//! chunk boundaries (including ones that split a UTF-8 sequence) never
//! change the decoded result.
//!
//! A complete line that does not parse is pushed back onto the buffer and
//! the rest of the chunk is left for later. Whatever is still buffered when
//! the transport ends is drained by [`finish`], which drops lines that never
//! became valid.

use memchr::memchr;
use neonchat_core::stream::{DATA_PREFIX, DONE_SENTINEL};
use neonchat_core::{StreamEvent, ToolLifecycle};
use tracing::{debug, warn};

/// Parser state carried between chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderState {
    buffer: Vec<u8>,
    done: bool,
}

impl DecoderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Bytes waiting for a newline (or for a retry).
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

enum Line {
    Skip,
    Event(StreamEvent),
    Done,
    Malformed,
}

/// Feed one chunk of bytes.
pub fn decode(mut state: DecoderState, chunk: &[u8]) -> (Vec<StreamEvent>, DecoderState) {
    let mut events = Vec::new();
    if state.done {
        return (events, state);
    }
    state.buffer.extend_from_slice(chunk);

    let mut consumed = 0;
    while let Some(offset) = memchr(b'\n', &state.buffer[consumed..]) {
        let end = consumed + offset;
        match classify(&state.buffer[consumed..end]) {
            Line::Skip => {}
            Line::Event(event) => events.push(event),
            Line::Done => {
                events.push(StreamEvent::Done);
                state.done = true;
                state.buffer.clear();
                return (events, state);
            }
            Line::Malformed => {
                debug!(pending = state.buffer.len() - consumed, "Unparsed line pushed back");
                break;
            }
        }
        consumed = end + 1;
    }

    state.buffer.drain(..consumed);
    (events, state)
}

/// Drain everything still buffered once the transport has ended.
///
/// The trailing line does not need a newline. Lines that still fail to
/// parse are dropped.
pub fn finish(state: DecoderState) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    if state.done {
        return events;
    }

    for raw in state.buffer.split(|b| *b == b'\n') {
        match classify(raw) {
            Line::Skip => {}
            Line::Event(event) => events.push(event),
            Line::Done => {
                events.push(StreamEvent::Done);
                break;
            }
            Line::Malformed => {
                warn!(line = %String::from_utf8_lossy(raw), "Dropping malformed stream line");
            }
        }
    }
    events
}

fn classify(raw: &[u8]) -> Line {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let Ok(line) = std::str::from_utf8(raw) else {
        return Line::Malformed;
    };

    if line.trim().is_empty() || line.starts_with(':') {
        return Line::Skip;
    }
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Line::Skip;
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Line::Done;
    }

    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(_) => return Line::Malformed,
    };

    if value.get("type").is_some() {
        return match serde_json::from_value::<ToolLifecycle>(value) {
            Ok(event) => Line::Event(StreamEvent::Tool(event)),
            Err(e) => {
                debug!(error = %e, "Ignoring unknown typed event");
                Line::Skip
            }
        };
    }

    match value.pointer("/choices/0/delta/content").and_then(|c| c.as_str()) {
        Some(text) if !text.is_empty() => Line::Event(StreamEvent::Delta(text.to_string())),
        _ => Line::Skip,
    }
}
