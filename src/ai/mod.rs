//! Language-model integration: the chat seam, the OpenAI-backed client and
//! the thread summarizer built on top of it.

use async_trait::async_trait;
use openai_api_rs::v1::chat_completion::ChatCompletionMessage;

use crate::errors::PipelineError;

pub mod client;
pub mod summarizer;

pub use client::LlmClient;
pub use summarizer::Summarizer;

/// One chat-completion round trip. Production uses `LlmClient`; tests plug
/// in canned models to drive the summarizer without network access.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: Vec<ChatCompletionMessage>) -> Result<String, PipelineError>;
}
