use crate::agent::{Agent, AgentConfig, AgentError, AgentEvent};
use crate::protocol::{
    DATA_EVENT, END_EVENT, ERROR_EVENT, ErrorPayload, InvokeRequest, InvokeResponse,
    StreamPayload, ToolEndData, ToolStartData,
};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use std::convert::Infallible;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub struct ServerConfig {
    pub listen: String,
    pub agent: AgentConfig,
}

type ServerResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

pub async fn run(config: ServerConfig) -> ServerResult<()> {
    let agent = Arc::new(Agent::new(config.agent));

    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    tracing::info!("reelchat server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app(agent)).await?;

    Ok(())
}

pub fn app(agent: Arc<Agent>) -> Router {
    Router::new()
        .route("/stream_events", post(stream_events))
        .route("/invoke", post(invoke))
        .layer(TraceLayer::new_for_http())
        .with_state(agent)
}

async fn stream_events(
    State(agent): State<Arc<Agent>>,
    Json(payload): Json<InvokeRequest>,
) -> impl IntoResponse {
    let (events, receiver) = mpsc::channel(64);
    tokio::spawn(relay_run(agent, payload.input.question, events));

    let stream = ReceiverStream::new(receiver).map(Ok::<Event, Infallible>);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

async fn invoke(
    State(agent): State<Arc<Agent>>,
    Json(payload): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, StatusCode> {
    match agent
        .run(&payload.input.question, |_| std::future::ready(true))
        .await
    {
        Ok(output) => Ok(Json(InvokeResponse { output })),
        Err(err) => {
            tracing::error!("agent run failed: {}", err);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// Runs the agent and forwards its steps as SSE frames until the client
// hangs up or the run ends with `end` or `error`.
async fn relay_run(agent: Arc<Agent>, question: String, events: mpsc::Sender<Event>) {
    let run_id = Uuid::new_v4().to_string();
    tracing::info!(%run_id, "agent run started");

    let result = agent
        .run(&question, |event| {
            let events = events.clone();
            let frame = data_frame(&run_id, event);
            async move { events.send(frame).await.is_ok() }
        })
        .await;

    let closing = match result {
        Ok(_) => {
            tracing::info!(%run_id, "agent run finished");
            Event::default().event(END_EVENT)
        }
        Err(AgentError::Cancelled) => {
            tracing::info!(%run_id, "client disconnected, agent run abandoned");
            return;
        }
        Err(err) => {
            tracing::error!(%run_id, "agent run failed: {}", err);
            error_frame()
        }
    };

    let _ = events.send(closing).await;
}

fn data_frame(run_id: &str, event: AgentEvent) -> Event {
    let payload = match event {
        AgentEvent::Token(text) => StreamPayload::token(run_id, text),
        AgentEvent::ToolStart { name, input } => StreamPayload::OnToolStart {
            run_id: run_id.to_string(),
            name,
            data: ToolStartData { input },
        },
        AgentEvent::ToolEnd { name, output } => StreamPayload::OnToolEnd {
            run_id: run_id.to_string(),
            name,
            data: ToolEndData { output },
        },
    };

    Event::default()
        .event(DATA_EVENT)
        .data(serde_json::to_string(&payload).unwrap_or_default())
}

fn error_frame() -> Event {
    let payload = ErrorPayload {
        status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        message: "Internal Server Error".to_string(),
    };

    Event::default()
        .event(ERROR_EVENT)
        .data(serde_json::to_string(&payload).unwrap_or_default())
}
