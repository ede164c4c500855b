use crate::protocol::{ChatDelta, DATA_EVENT, END_EVENT, ERROR_EVENT};
use crate::sse::SseFrame;
use serde_json::Value;

/// One decoded frame of the agent's event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum EventRecord {
    /// A `data` frame. `None` when the payload was not valid JSON.
    Data(Option<Value>),
    End,
    Error,
    Other(String),
}

impl EventRecord {
    pub fn decode(frame: &SseFrame) -> Self {
        match frame.event.as_str() {
            DATA_EVENT => match serde_json::from_str(&frame.data) {
                Ok(payload) => EventRecord::Data(Some(payload)),
                Err(err) => {
                    tracing::warn!("discarding malformed data payload: {}", err);
                    EventRecord::Data(None)
                }
            },
            END_EVENT => EventRecord::End,
            ERROR_EVENT => {
                tracing::debug!("agent reported error: {}", frame.data);
                EventRecord::Error
            }
            other => EventRecord::Other(other.to_string()),
        }
    }
}

/// What a record means for the answer being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Fragment(String),
    Ignore,
    End,
    Error,
}

pub fn classify(record: EventRecord) -> Signal {
    match record {
        EventRecord::Data(Some(payload)) => match serde_json::from_value::<ChatDelta>(payload) {
            Ok(ChatDelta::ChatModelStream { data }) => Signal::Fragment(data.chunk.content),
            Ok(ChatDelta::Unrecognized) => Signal::Ignore,
            Err(err) => {
                tracing::trace!("data payload does not carry a fragment: {}", err);
                Signal::Ignore
            }
        },
        EventRecord::Data(None) | EventRecord::Other(_) => Signal::Ignore,
        EventRecord::End => Signal::End,
        EventRecord::Error => Signal::Error,
    }
}

/// The answer text of a single response cycle. Append-only.
#[derive(Debug, Default)]
pub struct Accumulator {
    text: String,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, fragment: &str) -> &str {
        self.text.push_str(fragment);
        &self.text
    }

    pub fn finish(self) -> String {
        self.text
    }
}
