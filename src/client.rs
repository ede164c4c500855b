use crate::cycle::{CycleOutcome, Renderer, run_cycle};
use crate::history::SessionHistory;
use crate::protocol::InvokeRequest;
use crate::sse::FrameBuffer;
use crate::stream::EventRecord;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::Client as HttpClient;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub struct ClientConfig {
    pub api_url: String,
    pub connect_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to reach agent endpoint: {0}")]
    Connect(#[source] reqwest::Error),
    #[error("agent endpoint returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("event stream interrupted: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
}

/// HTTP side of the chat surface. Only the connect phase is bounded; an
/// answer may stream for as long as the agent keeps the response open.
#[derive(Clone)]
pub struct ChatClient {
    base_url: String,
    http: HttpClient,
}

impl ChatClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = HttpClient::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            base_url: normalize_base_url(&config.api_url),
            http,
        })
    }

    pub fn stream_events(&self, question: &str) -> BoxStream<'static, Result<EventRecord, ClientError>> {
        let http = self.http.clone();
        let url = format!("{}/stream_events", self.base_url);
        let request = InvokeRequest::new(question);

        Box::pin(async_stream::try_stream! {
            tracing::debug!("opening event stream at {}", url);
            let response = http
                .post(&url)
                .header(ACCEPT, "text/event-stream")
                .json(&request)
                .send()
                .await
                .map_err(ClientError::Connect)?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                Err::<(), _>(ClientError::Status { status, body })?;
            } else {
                let mut bytes = response.bytes_stream();
                let mut frames = FrameBuffer::default();

                while let Some(chunk) = bytes.next().await {
                    let chunk = chunk.map_err(ClientError::Transport)?;
                    for frame in frames.push(&chunk) {
                        yield EventRecord::decode(&frame);
                    }
                }

                if let Some(frame) = frames.finish() {
                    yield EventRecord::decode(&frame);
                }
            }
        })
    }
}

/// A chat session: the turns so far plus the endpoint they are sent to.
pub struct ChatSession {
    client: ChatClient,
    history: SessionHistory,
}

impl ChatSession {
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            history: SessionHistory::new(),
        }
    }

    pub fn history(&self) -> &SessionHistory {
        &self.history
    }

    pub async fn submit<R>(
        &mut self,
        prompt: &str,
        renderer: &mut R,
        cancel: &CancellationToken,
    ) -> CycleOutcome
    where
        R: Renderer + ?Sized,
    {
        self.history.append_user(prompt);
        let outcome = run_cycle(self.client.stream_events(prompt), renderer, cancel).await;
        self.history.append_assistant(outcome.text());
        outcome
    }
}

fn normalize_base_url(value: &str) -> String {
    value.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::tests::Recorder;
    use crate::cycle::{ERROR_MESSAGE, FailureReason};
    use crate::history::Role;

    fn client_for(url: &str) -> ChatClient {
        ChatClient::new(ClientConfig {
            api_url: format!("{}/", url),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
        .unwrap()
    }

    fn token_frame(content: &str) -> String {
        format!(
            "event: data\ndata: {{\"event\": \"on_chat_model_stream\", \"data\": {{\"chunk\": {{\"content\": \"{}\"}}}}}}\n\n",
            content
        )
    }

    #[test]
    fn trims_trailing_slash_from_api_url() {
        let client = client_for("http://localhost:8000");
        assert_eq!(client.base_url, "http://localhost:8000");
    }

    #[tokio::test]
    async fn streams_answer_and_records_both_turns() {
        let mut server = mockito::Server::new_async().await;
        let body = [
            "event: metadata\ndata: {\"run_id\": \"r\"}\n\n".to_string(),
            token_frame("Try "),
            "event: data\ndata: {\"event\": \"on_tool_start\", \"name\": \"latest_trending_movies\"}\n\n"
                .to_string(),
            "event: data\ndata: {not json\n\n".to_string(),
            token_frame("Dune"),
            "event: end\n\n".to_string(),
        ]
        .concat();

        let mock = server
            .mock("POST", "/stream_events")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"input": {"question": "What should I watch?"}}),
            ))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await;

        let mut session = ChatSession::new(client_for(&server.url()));
        let mut recorder = Recorder::default();
        let outcome = session
            .submit("What should I watch?", &mut recorder, &CancellationToken::new())
            .await;

        mock.assert_async().await;
        assert_eq!(outcome, CycleOutcome::Completed("Try Dune".to_string()));
        assert_eq!(recorder.presented, vec!["Try ", "Try Dune", "Try Dune"]);

        let turns = session.history().turns();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].content, "Try Dune");
    }

    #[tokio::test]
    async fn completes_a_stream_framed_with_bare_carriage_returns() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/stream_events")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body([token_frame("Heat").replace('\n', "\r"), "event: end\r\r".to_string()].concat())
            .create_async()
            .await;

        let mut session = ChatSession::new(client_for(&server.url()));
        let mut recorder = Recorder::default();
        let outcome = session
            .submit("hi", &mut recorder, &CancellationToken::new())
            .await;

        assert_eq!(outcome, CycleOutcome::Completed("Heat".to_string()));
    }

    #[tokio::test]
    async fn non_success_status_fails_before_streaming() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/stream_events")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let mut session = ChatSession::new(client_for(&server.url()));
        let mut recorder = Recorder::default();
        let outcome = session
            .submit("hi", &mut recorder, &CancellationToken::new())
            .await;

        assert_eq!(outcome, CycleOutcome::Failed(FailureReason::Transport));
        assert_eq!(recorder.presented, vec![ERROR_MESSAGE]);
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_the_cycle() {
        let mut session = ChatSession::new(client_for("http://127.0.0.1:1"));
        let mut recorder = Recorder::default();
        let outcome = session
            .submit("hi", &mut recorder, &CancellationToken::new())
            .await;

        assert_eq!(outcome, CycleOutcome::Failed(FailureReason::Transport));
        assert_eq!(session.history().turns()[1].content, ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn success_then_error_leaves_four_turns() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("POST", "/stream_events")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"input": {"question": "first"}}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body([token_frame("Sure."), "event: end\n\n".to_string()].concat())
            .create_async()
            .await;
        let _err = server
            .mock("POST", "/stream_events")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"input": {"question": "second"}}"#.to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(
                [
                    token_frame("Hello"),
                    token_frame(" world"),
                    "event: error\ndata: {\"status_code\": 500, \"message\": \"Internal Server Error\"}\n\n"
                        .to_string(),
                ]
                .concat(),
            )
            .create_async()
            .await;

        let mut session = ChatSession::new(client_for(&server.url()));
        let cancel = CancellationToken::new();
        let mut recorder = Recorder::default();
        session.submit("first", &mut recorder, &cancel).await;
        session.submit("second", &mut recorder, &cancel).await;

        let turns: Vec<(Role, &str)> = session
            .history()
            .turns()
            .iter()
            .map(|t| (t.role, t.content.as_str()))
            .collect();
        assert_eq!(
            turns,
            vec![
                (Role::User, "first"),
                (Role::Assistant, "Sure."),
                (Role::User, "second"),
                (Role::Assistant, ERROR_MESSAGE),
            ]
        );
    }
}
