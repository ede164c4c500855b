//! One prompt-to-answer round trip over the agent's event stream.
//!
//! A cycle starts streaming with an empty answer, grows it with every token
//! fragment, and ends exactly once: `Completed` on an `end` record, `Failed`
//! on an `error` record, a transport failure, a closed stream or caller
//! cancellation. A failed cycle never shows partial text as its answer.

use crate::stream::{Accumulator, EventRecord, Signal, classify};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use tokio_util::sync::CancellationToken;

pub const ERROR_MESSAGE: &str = "Error during chat invocation";

/// Presentation side of a cycle. Always handed the full text so far, so
/// an implementation can replace what it shows instead of splicing.
pub trait Renderer {
    fn present(&mut self, text: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Connection, status or read failure on the transport.
    Transport,
    /// The agent sent an `error` record.
    Stream,
    /// The stream closed before an `end` record.
    Disconnected,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed(String),
    Failed(FailureReason),
}

impl CycleOutcome {
    /// Text committed as the assistant turn.
    pub fn text(&self) -> &str {
        match self {
            CycleOutcome::Completed(text) => text,
            CycleOutcome::Failed(_) => ERROR_MESSAGE,
        }
    }
}

pub async fn run_cycle<S, E, R>(
    records: S,
    renderer: &mut R,
    cancel: &CancellationToken,
) -> CycleOutcome
where
    S: Stream<Item = Result<EventRecord, E>>,
    E: Display,
    R: Renderer + ?Sized,
{
    tokio::pin!(records);
    let mut answer = Accumulator::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return fail(renderer, FailureReason::Cancelled),
            next = records.next() => next,
        };

        let record = match next {
            Some(Ok(record)) => record,
            Some(Err(err)) => {
                tracing::warn!("chat invocation failed: {}", err);
                return fail(renderer, FailureReason::Transport);
            }
            None => {
                tracing::warn!("event stream closed before the end record");
                return fail(renderer, FailureReason::Disconnected);
            }
        };

        match classify(record) {
            Signal::Fragment(fragment) => renderer.present(answer.append(&fragment)),
            Signal::Ignore => {}
            Signal::End => {
                let text = answer.finish();
                renderer.present(&text);
                return CycleOutcome::Completed(text);
            }
            Signal::Error => return fail(renderer, FailureReason::Stream),
        }
    }
}

fn fail<R: Renderer + ?Sized>(renderer: &mut R, reason: FailureReason) -> CycleOutcome {
    tracing::debug!(?reason, "response cycle failed");
    renderer.present(ERROR_MESSAGE);
    CycleOutcome::Failed(reason)
}
