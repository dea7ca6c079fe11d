use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One match returned by workspace search. Consumed once per run.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub channel_id: String,
    /// Timestamp of the matched message.
    pub ts: String,
    /// Root timestamp of the conversation; equals `ts` for top-level messages.
    pub thread_ts: String,
    pub text: String,
    pub permalink: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub user: Option<String>,
    pub text: String,
    pub ts: String,
}

/// A fully fetched conversation, messages in timestamp order.
#[derive(Debug, Clone)]
pub struct Thread {
    pub channel_id: String,
    pub thread_ts: String,
    pub started_at: DateTime<Utc>,
    pub messages: Vec<ThreadMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
}

impl UserProfile {
    /// Profile used when a lookup fails (deactivated or unknown user).
    pub fn unknown(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: "Unknown User".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

/// The canonical per-thread report. Round-trips through the summary cache;
/// the dedup key is the thread timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub title: String,
    pub timestamp: String,
    pub problem: String,
    pub solution: String,
    pub participants: Vec<String>,
    pub links: Vec<Link>,
}
