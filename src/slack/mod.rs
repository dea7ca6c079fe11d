//! All Slack-specific functionality

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::core::models::{SearchHit, Thread, UserProfile};
use crate::errors::PipelineError;

pub mod blocks;
pub mod client;

// Re-export main types for convenience
pub use client::SlackClient;

/// The messaging platform seam the pipeline runs against.
///
/// `SlackClient` is the production implementation; tests substitute
/// in-process fakes so the runner can be exercised without a workspace.
#[async_trait]
pub trait Messaging: Send + Sync {
    /// Search the workspace, newest first, filtered to hits at or after
    /// `cutoff` and truncated to `limit`.
    async fn search(
        &self,
        query: &str,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SearchHit>, PipelineError>;

    /// Fetch all replies of a thread. `PipelineError::ThreadNotFound` if the
    /// thread was deleted between search and fetch.
    async fn fetch_thread(&self, channel_id: &str, thread_ts: &str)
    -> Result<Thread, PipelineError>;

    /// Resolve a user id to a display name, cache-first. Lookup failures
    /// yield the fallback profile rather than an error.
    async fn resolve_user(&self, user_id: &str) -> UserProfile;

    /// Best-effort permalink for a message.
    async fn get_permalink(&self, channel_id: &str, ts: &str) -> Option<String>;

    /// Post a Block Kit report, optionally as a thread reply. Returns the
    /// posted message timestamp.
    async fn post_report(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        fallback_text: &str,
        blocks: &Value,
    ) -> Result<String, PipelineError>;

    /// Find this week's parent report message, creating it when absent.
    /// Returns its timestamp so reports can thread under it.
    async fn find_or_create_weekly_parent(
        &self,
        channel_id: &str,
        week_start: NaiveDate,
    ) -> Result<String, PipelineError>;
}
