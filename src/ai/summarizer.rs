//! Builds the summarization prompt, validates the model's structured output
//! and assembles the final `Summary` for a thread.

use openai_api_rs::v1::chat_completion::{ChatCompletionMessage, Content, MessageRole};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::ai::ChatModel;
use crate::core::models::{Link, Summary, Thread};
use crate::errors::PipelineError;
use crate::utils::links::extract_links;

/// One regeneration on malformed output, then give up. Cost and latency
/// bounds take priority over completeness.
const MAX_GENERATION_ATTEMPTS: usize = 2;

const SYSTEM_PROMPT: &str = "You summarize Slack firefighter threads for a weekly incident report. \
A firefighter is the person handling urgent tech requests in the organisation; \
a `<!subteam^...>` mention is the firefighter handle, and \
`Is it ok for <@user-id> to run the following` is a request for permission to run a script.\n\
Respond with ONLY a single JSON object, no code fences and no prose, with exactly these fields:\n\
  \"title\": short, clear incident title\n\
  \"timestamp\": when the incident happened, formatted YYYY-MM-DD HH:mm\n\
  \"problem\": what was wrong; concise but keep the important details\n\
  \"solution\": the actions taken to resolve it\n\
  \"participants\": array of participant names (optional)\n\
  \"links\": array of URLs relevant to the incident (optional)\n\
Keep problem and solution together under 120 words.";

/// What the model is required to return. Missing required fields fail
/// deserialization and count as malformed output.
#[derive(Debug, Deserialize)]
struct ModelSummary {
    title: String,
    timestamp: String,
    problem: String,
    solution: String,
    #[serde(default)]
    participants: Vec<String>,
    #[serde(default)]
    links: Vec<String>,
}

pub struct Summarizer {
    model: Arc<dyn ChatModel>,
}

impl Summarizer {
    #[must_use]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Summarize a fetched thread. `display_names` maps platform user ids to
    /// resolved display names.
    ///
    /// # Errors
    ///
    /// `PipelineError::SummarizationFailed` when the model call fails or its
    /// output is still malformed after the single regeneration attempt.
    pub async fn summarize(
        &self,
        thread: &Thread,
        display_names: &HashMap<String, String>,
    ) -> Result<Summary, PipelineError> {
        let (thread_text, resolved_participants) = build_thread_text(thread, display_names);
        let timestamp = thread.started_at.format("%Y-%m-%d %H:%M").to_string();

        let mut last_reason = String::new();
        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let prompt = build_prompt(&timestamp, &thread_text, &resolved_participants);
            let raw = self.model.complete(prompt).await?;
            match parse_model_summary(&raw) {
                Ok(parsed) => {
                    return Ok(assemble(parsed, &thread_text, &resolved_participants));
                }
                Err(reason) => {
                    warn!(
                        "Malformed summary for thread {} (attempt {attempt}): {reason}",
                        thread.thread_ts
                    );
                    last_reason = reason;
                }
            }
        }

        Err(PipelineError::SummarizationFailed(format!(
            "model output malformed after retry: {last_reason}"
        )))
    }
}

/// Concatenate the thread into one annotated context string and collect the
/// resolved participant names (sorted, deduplicated).
fn build_thread_text(
    thread: &Thread,
    display_names: &HashMap<String, String>,
) -> (String, Vec<String>) {
    let mut lines: Vec<String> = Vec::new();
    let mut participants: Vec<String> = Vec::new();

    for message in &thread.messages {
        let name = message
            .user
            .as_ref()
            .and_then(|id| display_names.get(id))
            .map_or("Unknown", String::as_str);
        if message.user.is_some() && !participants.iter().any(|p| p == name) {
            participants.push(name.to_string());
        }
        lines.push(format!("{name}: {}", message.text));
    }

    participants.sort();
    (lines.join("\nReply:\n"), participants)
}

fn build_prompt(
    timestamp: &str,
    thread_text: &str,
    participants: &[String],
) -> Vec<ChatCompletionMessage> {
    vec![
        ChatCompletionMessage {
            role: MessageRole::system,
            content: Content::Text(SYSTEM_PROMPT.to_string()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        },
        ChatCompletionMessage {
            role: MessageRole::user,
            content: Content::Text(format!(
                "Timestamp: {timestamp}\nThread:\n{thread_text}\n\nParticipants: {}\n",
                participants.join(", ")
            )),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        },
    ]
}

fn strip_code_fences(raw: &str) -> String {
    let text = raw.trim();
    if !text.starts_with("```") {
        return text.to_string();
    }
    let mut lines: Vec<&str> = text.lines().collect();
    if lines.first().is_some_and(|l| l.starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.starts_with("```")) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

/// Validate the model output against the report schema immediately on
/// receipt. A partially populated record is rejected, not propagated.
fn parse_model_summary(raw: &str) -> Result<ModelSummary, String> {
    let text = strip_code_fences(raw);
    let parsed: ModelSummary =
        serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {e}"))?;

    for (field, value) in [
        ("title", &parsed.title),
        ("timestamp", &parsed.timestamp),
        ("problem", &parsed.problem),
        ("solution", &parsed.solution),
    ] {
        if value.trim().is_empty() {
            return Err(format!("empty required field: {field}"));
        }
    }

    Ok(parsed)
}

/// Merge the validated model output with resolver-provided participants and
/// extractor-provided links.
fn assemble(parsed: ModelSummary, thread_text: &str, resolved: &[String]) -> Summary {
    let mut participants: Vec<String> = resolved.to_vec();
    for name in parsed.participants {
        let name = name.trim().to_string();
        if !name.is_empty() && !participants.iter().any(|p| *p == name) {
            participants.push(name);
        }
    }

    let mut links: Vec<Link> = extract_links(thread_text);
    for raw in &parsed.links {
        for link in extract_links(raw) {
            if !links.iter().any(|l| l.url == link.url) {
                links.push(link);
            }
        }
    }

    Summary {
        title: parsed.title.trim().to_string(),
        timestamp: parsed.timestamp.trim().to_string(),
        problem: parsed.problem.trim().to_string(),
        solution: parsed.solution.trim().to_string(),
        participants,
        links,
    }
}
