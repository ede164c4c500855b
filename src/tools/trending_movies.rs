use futures::FutureExt;
use reqwest::Client;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{TmdbConfig, ToolDefinition, ToolResult};

#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
enum TimePeriod {
    #[default]
    Day,
    Week,
}

impl TimePeriod {
    fn as_str(self) -> &'static str {
        match self {
            TimePeriod::Day => "day",
            TimePeriod::Week => "week",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct TrendingMoviesInput {
    #[schemars(description = "The time period for which to get the trending movies. Defaults to 'day' if not clear.")]
    #[serde(default)]
    time_period: TimePeriod,
}

#[derive(Debug, Deserialize)]
struct TrendingPage {
    results: Vec<TrendingMovie>,
}

#[derive(Debug, Deserialize, Serialize)]
struct TrendingMovie {
    id: u64,
    title: String,
    #[serde(default)]
    overview: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    vote_average: Option<f64>,
}

async fn trending_movies_impl(
    http: Client,
    tmdb: TmdbConfig,
    input: serde_json::Value,
) -> ToolResult {
    let input: TrendingMoviesInput = serde_json::from_value(input)?;
    let api_key = tmdb.api_key.as_deref().ok_or("TMDB_API_KEY is not set")?;
    let url = format!(
        "{}/3/trending/movie/{}",
        tmdb.api_base.trim_end_matches('/'),
        input.time_period.as_str()
    );

    tracing::info!(period = input.time_period.as_str(), "fetching trending movies");
    let response = http.get(&url).bearer_auth(api_key).send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(format!("TMDB error: {} - {}", status, body).into());
    }

    let page: TrendingPage = response.json().await?;
    serde_json::to_string(&page.results).map_err(|e| e.into())
}

pub(crate) fn definition(http: Client, tmdb: TmdbConfig) -> ToolDefinition {
    ToolDefinition {
        name: "latest_trending_movies",
        description: "Returns the current trending movies. Use it for questions about trending movies, latest releases or currently popular movies.",
        input_schema: schema_for!(TrendingMoviesInput).to_value(),
        handler: Arc::new(move |input| {
            trending_movies_impl(http.clone(), tmdb.clone(), input).boxed()
        }),
    }
}
