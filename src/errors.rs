use openai_api_rs::v1::error::APIError;
use slack_morphism::errors::SlackClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Summarization failed: {0}")]
    SummarizationFailed(String),

    #[error("Failed to post report: {0}")]
    PostFailed(String),

    #[error("Failed to access Slack API: {0}")]
    ApiError(String),

    #[error("Failed to send HTTP request: {0}")]
    HttpError(String),
}

impl From<SlackClientError> for PipelineError {
    fn from(error: SlackClientError) -> Self {
        PipelineError::ApiError(error.to_string())
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(error: reqwest::Error) -> Self {
        PipelineError::HttpError(error.to_string())
    }
}

impl From<redis::RedisError> for PipelineError {
    fn from(error: redis::RedisError) -> Self {
        PipelineError::CacheUnavailable(error.to_string())
    }
}

impl From<APIError> for PipelineError {
    fn from(error: APIError) -> Self {
        PipelineError::SummarizationFailed(format!("OpenAI API error: {error}"))
    }
}
