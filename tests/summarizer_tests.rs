//! Summarizer generation behavior: schema enforcement and the
//! retry-once-then-fail contract.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use openai_api_rs::v1::chat_completion::ChatCompletionMessage;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use firewatch::ai::{ChatModel, Summarizer};
use firewatch::core::models::{Thread, ThreadMessage};
use firewatch::errors::PipelineError;

const VALID_JSON: &str = r#"{
    "title": "Stuck imports queue",
    "timestamp": "2026-08-03 10:15",
    "problem": "Imports were backed up for two hours",
    "solution": "Requeued the failed batch",
    "participants": ["Priya Nair"],
    "links": ["https://x.atlassian.net/browse/MIS-9"]
}"#;

struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, String>>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(responses: Vec<Result<&str, &str>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            calls: AtomicUsize::new(0),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, _prompt: Vec<ChatCompletionMessage>) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(reason)) => Err(PipelineError::SummarizationFailed(reason)),
            None => panic!("model called more often than scripted"),
        }
    }
}

fn sample_thread() -> Thread {
    Thread {
        channel_id: "C0SRC".to_string(),
        thread_ts: "1721609600.000100".to_string(),
        started_at: Utc.with_ymd_and_hms(2026, 8, 3, 10, 15, 0).unwrap(),
        messages: vec![
            ThreadMessage {
                user: Some("U1".to_string()),
                text: "imports are stuck, see https://x.atlassian.net/browse/MIS-9".to_string(),
                ts: "1721609600.000100".to_string(),
            },
            ThreadMessage {
                user: Some("U2".to_string()),
                text: "requeued, watching the dashboard".to_string(),
                ts: "1721609660.000200".to_string(),
            },
        ],
    }
}

fn display_names() -> HashMap<String, String> {
    HashMap::from([
        ("U1".to_string(), "Ana Reyes".to_string()),
        ("U2".to_string(), "Sam Patel".to_string()),
    ])
}

#[tokio::test]
async fn well_formed_output_summarizes_in_one_call() {
    let model = ScriptedModel::new(vec![Ok(VALID_JSON)]);
    let summarizer = Summarizer::new(model.clone());

    let summary = summarizer
        .summarize(&sample_thread(), &display_names())
        .await
        .unwrap();

    assert_eq!(model.call_count(), 1);
    assert_eq!(summary.title, "Stuck imports queue");
    // Resolved participants come first, model extras are appended.
    assert_eq!(summary.participants, vec!["Ana Reyes", "Sam Patel", "Priya Nair"]);
    assert_eq!(summary.links.len(), 1);
    assert_eq!(summary.links[0].label, "JIRA MIS-9");
}

#[tokio::test]
async fn malformed_output_is_regenerated_exactly_once() {
    let model = ScriptedModel::new(vec![Ok("```\nnot json\n```"), Ok(VALID_JSON)]);
    let summarizer = Summarizer::new(model.clone());

    let summary = summarizer
        .summarize(&sample_thread(), &display_names())
        .await
        .unwrap();

    assert_eq!(model.call_count(), 2);
    assert_eq!(summary.problem, "Imports were backed up for two hours");
}

#[tokio::test]
async fn malformed_output_twice_fails_the_summarization() {
    let model = ScriptedModel::new(vec![
        Ok(r#"{"title":"only a title"}"#),
        Ok("still not the schema"),
    ]);
    let summarizer = Summarizer::new(model.clone());

    let result = summarizer.summarize(&sample_thread(), &display_names()).await;

    assert_eq!(model.call_count(), 2);
    assert!(matches!(result, Err(PipelineError::SummarizationFailed(_))));
}

#[tokio::test]
async fn model_errors_propagate_without_a_retry() {
    let model = ScriptedModel::new(vec![Err("rate limited")]);
    let summarizer = Summarizer::new(model.clone());

    let result = summarizer.summarize(&sample_thread(), &display_names()).await;

    assert_eq!(model.call_count(), 1);
    assert!(matches!(result, Err(PipelineError::SummarizationFailed(_))));
}
