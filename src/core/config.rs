use std::env;

use crate::errors::PipelineError;

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";
const DEFAULT_SEARCH_QUERY: &str = "@platform-firefighter";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub slack_bot_token: String,
    pub slack_user_token: String,
    pub slack_channel_id: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub redis_url: String,
    pub search_query: String,
    pub search_limit: usize,
    pub lookback_days: i64,
    pub user_cache_ttl_secs: u64,
    pub thread_cache_ttl_secs: u64,
    pub max_threads: usize,
    pub dry_run: bool,
}

impl AppConfig {
    /// Read the whole configuration from the environment once, at startup.
    /// Components receive it by reference; nothing reads env vars later.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Configuration` if a required variable is
    /// missing or a numeric variable does not parse.
    pub fn from_env() -> Result<Self, PipelineError> {
        Ok(Self {
            slack_bot_token: require("SLACK_BOT_TOKEN")?,
            slack_user_token: require("SLACK_USER_TOKEN")?,
            slack_channel_id: require("SLACK_CHANNEL_ID")?,
            openai_api_key: require("OPENAI_API_KEY")?,
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string()),
            search_query: env::var("SEARCH_QUERY")
                .unwrap_or_else(|_| DEFAULT_SEARCH_QUERY.to_string()),
            search_limit: parse_or("SEARCH_LIMIT", 50)?,
            lookback_days: parse_or("LOOKBACK_DAYS", 7)?,
            user_cache_ttl_secs: parse_or("USER_CACHE_TTL", 7200)?,
            thread_cache_ttl_secs: parse_or("THREAD_CACHE_TTL", 3600)?,
            max_threads: parse_or("MAX_THREADS", 10)?,
            dry_run: env::var("DRY_RUN")
                .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
                .unwrap_or(false),
        })
    }
}

fn require(name: &str) -> Result<String, PipelineError> {
    env::var(name).map_err(|_| PipelineError::Configuration(format!("{name} is not set")))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, PipelineError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PipelineError::Configuration(format!("{name} is not a valid number"))),
        Err(_) => Ok(default),
    }
}
