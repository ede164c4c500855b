mod agent;
mod ai_sdk;
mod client;
mod cycle;
mod history;
mod protocol;
mod server;
mod sse;
mod stream;
mod tools;
mod ui;

use agent::AgentConfig;
use clap::{Args, Parser, Subcommand};
use client::{ChatClient, ChatSession, ClientConfig};
use cycle::CycleOutcome;
use server::ServerConfig;
use std::error::Error;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tools::TmdbConfig;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "reelchat", about = "Movie recommendation agent and streaming chat client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the agent over HTTP.
    Serve(ServeArgs),
    /// Open the interactive chat UI.
    Chat(ClientArgs),
    /// Ask one question and stream the answer to stdout.
    Ask {
        #[command(flatten)]
        client: ClientArgs,
        question: String,
    },
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    listen: String,
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: String,
    #[arg(long, env = "MODEL", default_value = agent::DEFAULT_MODEL)]
    model: String,
    #[arg(long, env = "ANTHROPIC_API_BASE", default_value = agent::DEFAULT_API_BASE)]
    anthropic_api_base: String,
    #[arg(long, env = "TMDB_API_KEY", hide_env_values = true)]
    tmdb_api_key: Option<String>,
    #[arg(long, env = "TMDB_API_BASE", default_value = tools::DEFAULT_TMDB_API_BASE)]
    tmdb_api_base: String,
}

impl ServeArgs {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            listen: self.listen,
            agent: AgentConfig {
                api_key: self.anthropic_api_key,
                model: self.model,
                api_base: self.anthropic_api_base,
                tmdb: TmdbConfig {
                    api_key: self.tmdb_api_key,
                    api_base: self.tmdb_api_base,
                },
            },
        }
    }
}

#[derive(Args)]
struct ClientArgs {
    /// Base URL of the agent server.
    #[arg(long, env = "API_URL", default_value = "http://localhost:8000")]
    api_url: String,
    /// Seconds allowed for connecting; streaming itself is not time-limited.
    #[arg(long, default_value_t = client::DEFAULT_CONNECT_TIMEOUT.as_secs())]
    connect_timeout: u64,
}

impl ClientArgs {
    fn session(self) -> Result<ChatSession, client::ClientError> {
        let client = ChatClient::new(ClientConfig {
            api_url: self.api_url,
            connect_timeout: Duration::from_secs(self.connect_timeout),
        })?;
        Ok(ChatSession::new(client))
    }
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "{}={},tower_http={}",
                env!("CARGO_CRATE_NAME"),
                default_level,
                default_level
            )
            .into()
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            init_tracing("info");
            server::run(args.into_config()).await
        }
        Command::Chat(args) => {
            // Log lines would tear the inline viewport unless RUST_LOG asks for them.
            init_tracing("off");
            let session = args.session()?;
            ui::run_tui(session)
        }
        Command::Ask { client, question } => {
            init_tracing("warn");
            let mut session = client.session()?;
            let cancel = CancellationToken::new();

            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let mut renderer = ui::PrintRenderer::new(std::io::stdout());
            let outcome = session.submit(&question, &mut renderer, &cancel).await;
            renderer.finish()?;

            match outcome {
                CycleOutcome::Completed(_) => Ok(()),
                CycleOutcome::Failed(reason) => Err(format!("chat cycle failed: {:?}", reason).into()),
            }
        }
    }
}
