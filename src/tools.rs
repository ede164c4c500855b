use futures::future::BoxFuture;
use reqwest::Client;
use std::sync::Arc;

mod trending_movies;

pub(crate) type ToolResult = Result<String, Box<dyn std::error::Error + Send + Sync>>;

type ToolHandler = Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, ToolResult> + Send + Sync>;

pub(crate) struct ToolDefinition {
    pub(crate) name: &'static str,
    pub(crate) description: &'static str,
    pub(crate) input_schema: serde_json::Value,
    pub(crate) handler: ToolHandler,
}

pub const DEFAULT_TMDB_API_BASE: &str = "https://api.themoviedb.org";

#[derive(Debug, Clone)]
pub struct TmdbConfig {
    pub api_key: Option<String>,
    pub api_base: String,
}

pub(crate) fn get_all_tools(http: &Client, tmdb: &TmdbConfig) -> Vec<ToolDefinition> {
    vec![trending_movies::definition(http.clone(), tmdb.clone())]
}
