//! Stream Consumer: drives a byte stream through the decoder and reports
//! progress through [`StreamCallbacks`].

use bytes::Bytes;
use futures::{Stream, StreamExt};
use neonchat_core::{StreamEvent, ToolLifecycle};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::decoder::{self, DecoderState};

/// What the assistant is visibly doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Images are attached and being looked at.
    Analyzing,
    Generating,
    /// Text is arriving.
    Streaming,
}

impl Phase {
    /// Phase shown before any text arrives.
    pub fn initial(has_images: bool) -> Self {
        if has_images { Self::Analyzing } else { Self::Generating }
    }
}

/// Receivers for stream progress. Only `on_delta` is required.
///
/// Phase changes come from the caller's initial phase and from the first
/// text delta only. Tool lines are reported through `on_tool_event` and
/// leave the phase as it was.
pub trait StreamCallbacks: Send {
    fn on_phase(&mut self, _phase: Phase) {}

    /// A tool started or finished on the server. Does not change the phase.
    fn on_tool_event(&mut self, _event: &ToolLifecycle) {}

    fn on_delta(&mut self, text: &str);

    /// Called once after a natural end of stream.
    fn on_done(&mut self) {}

    fn on_error(&mut self, _message: &str) {}
}

/// How a consumed stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    /// Cancelled by the caller. Nothing is reported.
    Cancelled,
    /// A transport fault, reported through `on_error`.
    Failed,
}

/// Consume `stream` until it ends, fails or `cancel` fires.
///
/// `phase` is the phase already shown to the user; it becomes
/// [`Phase::Streaming`] with the first text delta.
pub async fn consume<S, E>(
    stream: S,
    phase: Phase,
    callbacks: &mut dyn StreamCallbacks,
    cancel: &CancellationToken,
) -> StreamOutcome
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: std::fmt::Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut state = DecoderState::new();
    let mut dispatcher = Dispatcher { phase };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Stream cancelled");
                return StreamOutcome::Cancelled;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(chunk)) => {
                let (events, next_state) = decoder::decode(state, &chunk);
                state = next_state;
                dispatcher.dispatch(events, callbacks, cancel);
                if cancel.is_cancelled() {
                    return StreamOutcome::Cancelled;
                }
                if state.is_done() {
                    break;
                }
            }
            Some(Err(e)) => {
                if cancel.is_cancelled() {
                    return StreamOutcome::Cancelled;
                }
                callbacks.on_error(&e.to_string());
                return StreamOutcome::Failed;
            }
            None => break,
        }
    }

    dispatcher.dispatch(decoder::finish(state), callbacks, cancel);
    if cancel.is_cancelled() {
        return StreamOutcome::Cancelled;
    }
    callbacks.on_done();
    StreamOutcome::Completed
}

struct Dispatcher {
    phase: Phase,
}

impl Dispatcher {
    /// Deliver `events` in order, stopping as soon as `cancel` fires.
    fn dispatch(&mut self, events: Vec<StreamEvent>, callbacks: &mut dyn StreamCallbacks, cancel: &CancellationToken) {
        for event in events {
            if cancel.is_cancelled() {
                return;
            }
            match event {
                StreamEvent::Tool(tool) => callbacks.on_tool_event(&tool),
                StreamEvent::Delta(text) => {
                    if self.phase != Phase::Streaming {
                        self.phase = Phase::Streaming;
                        callbacks.on_phase(Phase::Streaming);
                    }
                    callbacks.on_delta(&text);
                }
                StreamEvent::Done => {}
            }
        }
    }
}
