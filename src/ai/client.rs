//! LLM (`OpenAI`) API client module
//!
//! Encapsulates the chat-completion call used to generate summaries.

use async_trait::async_trait;
use openai_api_rs::v1::chat_completion::{ChatCompletionMessage, Content, MessageRole};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::info;

use crate::ai::ChatModel;
use crate::errors::PipelineError;

/// Low temperature keeps report wording stable across reruns.
const TEMPERATURE: f64 = 0.2;

const REQUEST_TIMEOUT_SECS: u64 = 120;

pub struct LlmClient {
    api_key: String,
    model_name: String,
}

impl LlmClient {
    #[must_use]
    pub fn new(api_key: String, model_name: String) -> Self {
        Self {
            api_key,
            model_name,
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, prompt: Vec<ChatCompletionMessage>) -> Result<String, PipelineError> {
        info!(
            "Requesting completion from {} with {} prompt messages",
            self.model_name,
            prompt.len()
        );

        let messages: Vec<Value> = prompt
            .iter()
            .map(|msg| {
                let role = match msg.role {
                    MessageRole::system => "system",
                    MessageRole::user => "user",
                    MessageRole::assistant => "assistant",
                    MessageRole::function => "function",
                    MessageRole::tool => "tool",
                };
                let content = match &msg.content {
                    Content::Text(text) => json!(text),
                    other => json!(format!("{other:?}")),
                };
                json!({ "role": role, "content": content })
            })
            .collect();

        let request_body = json!({
            "model": self.model_name,
            "messages": messages,
            "temperature": TEMPERATURE,
        });

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                PipelineError::HttpError(format!("Failed to build OpenAI HTTP client: {e}"))
            })?;

        let response = client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| PipelineError::HttpError(format!("OpenAI API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::SummarizationFailed(format!(
                "OpenAI API error (status {status}): {error_text}"
            )));
        }

        let response_json: Value = response.json().await.map_err(|e| {
            PipelineError::SummarizationFailed(format!("Failed to parse OpenAI response: {e}"))
        })?;

        response_json
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                PipelineError::SummarizationFailed("No text in OpenAI response".to_string())
            })
    }
}
