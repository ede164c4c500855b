use serde::{Deserialize, Serialize};

/// Event label carrying a JSON payload.
pub const DATA_EVENT: &str = "data";
/// Event label closing a successful run.
pub const END_EVENT: &str = "end";
/// Event label closing a failed run.
pub const ERROR_EVENT: &str = "error";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub input: InvokeInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeInput {
    pub question: String,
}

impl InvokeRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            input: InvokeInput {
                question: question.into(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvokeResponse {
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkData {
    pub chunk: Chunk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
}

/// Payload of a `data` frame as the chat client reads it.
///
/// Only model token events carry text; every other tag is auxiliary
/// bookkeeping and lands in `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event")]
pub enum ChatDelta {
    #[serde(rename = "on_chat_model_stream")]
    ChatModelStream { data: ChunkData },
    #[serde(other)]
    Unrecognized,
}

/// Payload of a `data` frame as the agent server writes it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamPayload {
    OnChatModelStream {
        run_id: String,
        data: ChunkData,
    },
    OnToolStart {
        run_id: String,
        name: String,
        data: ToolStartData,
    },
    OnToolEnd {
        run_id: String,
        name: String,
        data: ToolEndData,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStartData {
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolEndData {
    pub output: String,
}

impl StreamPayload {
    pub fn token(run_id: &str, content: impl Into<String>) -> Self {
        Self::OnChatModelStream {
            run_id: run_id.to_string(),
            data: ChunkData {
                chunk: Chunk {
                    content: content.into(),
                },
            },
        }
    }
}

/// Body of an `error` frame.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub status_code: u16,
    pub message: String,
}
