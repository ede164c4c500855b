use crate::ai_sdk::{
    API_VERSION, ContentBlock, MessageParam, MessageRequest, MessageResponse,
    ResponseContentBlock, ToolDefinitionApi,
};
use crate::tools::{TmdbConfig, ToolDefinition, get_all_tools};
use reqwest::{Client, StatusCode};
use std::future::Future;
use thiserror::Error;

pub const DEFAULT_MODEL: &str = "claude-haiku-4-5-20251001";
pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

const MAX_TOKENS: u32 = 4096;
const MAX_TOOL_ROUNDS: usize = 15;

const SYSTEM_PROMPT: &str = "You are a movie recommendation assistant. \
Recommend movies and TV shows based on the user's preferences and answer factual questions about them. \
Only use information returned by your tools; if it does not cover the question, say that you do not have the data. \
If a tool fails, apologize and explain the issue. \
Decline questions unrelated to movies or TV shows. \
Use ratings to support recommendations and keep to three or four suggestions.";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub tmdb: TmdbConfig,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("model API error: {status} - {body}")]
    Api { status: StatusCode, body: String },
    #[error("no final answer after {0} tool rounds")]
    TooManyRounds(usize),
    #[error("event listener disconnected")]
    Cancelled,
}

/// A step of a run, reported while the run is in progress.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Token(String),
    ToolStart {
        name: String,
        input: serde_json::Value,
    },
    ToolEnd {
        name: String,
        output: String,
    },
}

pub struct Agent {
    client: Client,
    config: AgentConfig,
    tools: Vec<ToolDefinition>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        let client = Client::new();
        let tools = get_all_tools(&client, &config.tmdb);
        Self {
            client,
            config,
            tools,
        }
    }

    /// Answers one question, calling tools until the model stops asking for
    /// them. `on_event` returning `false` aborts the run.
    pub async fn run<F, Fut>(&self, question: &str, mut on_event: F) -> Result<String, AgentError>
    where
        F: FnMut(AgentEvent) -> Fut,
        Fut: Future<Output = bool>,
    {
        let mut conversation = vec![MessageParam::user_text(question)];

        for round in 0..MAX_TOOL_ROUNDS {
            let response = self.run_inference(&conversation).await?;
            tracing::debug!(round, stop_reason = ?response.stop_reason, "model responded");

            let mut tool_results = Vec::new();
            for block in &response.content {
                match block {
                    ResponseContentBlock::Text { text } => {
                        emit(&mut on_event, AgentEvent::Token(text.clone())).await?;
                    }
                    ResponseContentBlock::ToolUse { id, name, input } => {
                        emit(
                            &mut on_event,
                            AgentEvent::ToolStart {
                                name: name.clone(),
                                input: input.clone(),
                            },
                        )
                        .await?;

                        let (output, is_error) = self.execute_tool(name, input.clone()).await;
                        emit(
                            &mut on_event,
                            AgentEvent::ToolEnd {
                                name: name.clone(),
                                output: output.clone(),
                            },
                        )
                        .await?;

                        tool_results.push(ContentBlock::tool_result(id.clone(), output, is_error));
                    }
                }
            }

            conversation.push(MessageParam::assistant(&response));
            if tool_results.is_empty() {
                return Ok(response.text());
            }
            conversation.push(MessageParam::tool_results(tool_results));
        }

        Err(AgentError::TooManyRounds(MAX_TOOL_ROUNDS))
    }

    async fn run_inference(&self, conversation: &[MessageParam]) -> Result<MessageResponse, AgentError> {
        let tools = self
            .tools
            .iter()
            .map(|t| ToolDefinitionApi {
                name: t.name.to_string(),
                description: t.description.to_string(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        let request = MessageRequest {
            model: &self.config.model,
            max_tokens: MAX_TOKENS,
            system: SYSTEM_PROMPT,
            messages: conversation,
            tools,
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/messages",
                self.config.api_base.trim_end_matches('/')
            ))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Api { status, body });
        }

        Ok(response.json().await?)
    }

    async fn execute_tool(&self, name: &str, input: serde_json::Value) -> (String, bool) {
        let Some(tool) = self.tools.iter().find(|t| t.name == name) else {
            tracing::warn!(tool = name, "model requested an unknown tool");
            return ("tool not found".to_string(), true);
        };

        match (tool.handler)(input).await {
            Ok(output) => (output, false),
            Err(err) => {
                tracing::warn!(tool = name, "tool failed: {}", err);
                (err.to_string(), true)
            }
        }
    }
}

async fn emit<F, Fut>(on_event: &mut F, event: AgentEvent) -> Result<(), AgentError>
where
    F: FnMut(AgentEvent) -> Fut,
    Fut: Future<Output = bool>,
{
    if on_event(event).await {
        Ok(())
    } else {
        Err(AgentError::Cancelled)
    }
}
