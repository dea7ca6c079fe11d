//! Slack API client module
//!
//! Encapsulates all Slack API interactions with retry logic and error
//! handling. Search and thread reads use the user token; posting uses the
//! bot token. User resolution goes through the cache layer first.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use slack_morphism::hyper_tokio::{SlackClientHyperConnector, SlackHyperClient};
use slack_morphism::prelude::SlackApiUsersInfoRequest;
use slack_morphism::{SlackApiToken, SlackApiTokenValue, SlackUserId};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio_retry::strategy::jitter;
use tokio_retry::{Retry, strategy::ExponentialBackoff};
use tracing::{info, warn};

use crate::cache::{self, KvCache};
use crate::core::config::AppConfig;
use crate::core::models::{SearchHit, Thread, ThreadMessage, UserProfile};
use crate::errors::PipelineError;
use crate::slack::{Messaging, blocks};

/// Slack API max per search page.
const SEARCH_PAGE_SIZE: u32 = 100;
/// Safety limit so pagination can never loop forever.
const MAX_SEARCH_PAGES: u32 = 20;
/// Reply fetch window; firefighter threads are far shorter in practice.
const THREAD_REPLY_LIMIT: u32 = 200;

const ERROR_THREAD_NOT_FOUND: &str = "thread_not_found";
const ERROR_NOT_IN_CHANNEL: &str = "not_in_channel";

// Build the Slack client connector safely without panicking.
// If connector construction fails, store None and surface an ApiError at call sites.
static SLACK_CLIENT: LazyLock<Option<SlackHyperClient>> =
    LazyLock::new(|| match SlackClientHyperConnector::new() {
        Ok(connector) => Some(SlackHyperClient::new(connector)),
        Err(e) => {
            warn!("Failed to create Slack HTTP connector: {}", e);
            None
        }
    });

static HTTP_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_else(|_| Client::new())
});

#[derive(Debug, Deserialize)]
struct PermalinkResponse {
    ok: bool,
    permalink: Option<String>,
    error: Option<String>,
}

/// Convert a Slack message timestamp (`"1721609600.000100"`) to UTC.
#[must_use]
pub fn ts_to_datetime(ts: &str) -> DateTime<Utc> {
    let secs: f64 = ts.parse().unwrap_or(0.0);
    DateTime::from_timestamp(secs as i64, (secs.fract() * 1e9) as u32)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Extract `(channel_id, message_ts)` from a Slack permalink of the form
/// `https://workspace.slack.com/archives/C12345678/p1234567890123456`.
#[must_use]
pub fn parse_permalink(permalink: &str) -> Option<(String, String)> {
    static PERMALINK_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"/archives/([A-Z0-9]+)/p(\d{10,})")
            .unwrap_or_else(|_| Regex::new(r"$^").expect("fallback regex compiles"))
    });

    let caps = PERMALINK_RE.captures(permalink)?;
    let channel_id = caps.get(1)?.as_str().to_string();
    let raw_ts = caps.get(2)?.as_str();
    let message_ts = format!("{}.{}", &raw_ts[..10], &raw_ts[10..]);
    Some((channel_id, message_ts))
}

/// True when a search match looks authored by a person rather than a bot,
/// app, or Slackbot itself, judged from the match metadata alone.
#[must_use]
pub fn is_human_match(m: &Value) -> bool {
    let subtype = m.get("subtype").and_then(Value::as_str);
    if matches!(
        subtype,
        Some("bot_message" | "slackbot_response" | "app_message")
    ) {
        return false;
    }
    if m.get("bot_id").and_then(Value::as_str).is_some()
        || m.get("app_id").and_then(Value::as_str).is_some()
    {
        return false;
    }
    let user = m.get("user").and_then(Value::as_str);
    if user.is_none() && m.get("username").and_then(Value::as_str).is_some() {
        return false;
    }
    if user.is_some_and(|u| u.eq_ignore_ascii_case("USLACKBOT")) {
        return false;
    }
    true
}

fn match_channel_id(m: &Value) -> Option<String> {
    m.get("channel")
        .and_then(|c| c.get("id"))
        .and_then(Value::as_str)
        .or_else(|| m.get("channel").and_then(Value::as_str))
        .map(str::to_string)
}

/// Slack API client with retry logic and error handling.
pub struct SlackClient {
    bot_token: SlackApiToken,
    user_token: SlackApiToken,
    cache: Arc<dyn KvCache>,
    user_cache_ttl: Duration,
}

impl SlackClient {
    #[must_use]
    pub fn new(config: &AppConfig, cache: Arc<dyn KvCache>) -> Self {
        Self {
            bot_token: SlackApiToken::new(SlackApiTokenValue::new(config.slack_bot_token.clone())),
            user_token: SlackApiToken::new(SlackApiTokenValue::new(
                config.slack_user_token.clone(),
            )),
            cache,
            user_cache_ttl: Duration::from_secs(config.user_cache_ttl_secs),
        }
    }

    async fn with_retry<F, Fut, T>(&self, operation: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T, PipelineError>> + Send,
        T: Send,
    {
        let strategy = ExponentialBackoff::from_millis(100).map(jitter).take(5);

        Retry::spawn(strategy, operation).await
    }

    /// POST a JSON payload to a Slack Web API method and return the parsed
    /// body after checking HTTP status and the `ok` field.
    async fn post_api(
        &self,
        method: &str,
        token: &SlackApiToken,
        payload: &Value,
    ) -> Result<Value, PipelineError> {
        let url = format!("https://slack.com/api/{method}");
        let resp = HTTP_CLIENT
            .post(&url)
            .bearer_auth(&token.token_value.0)
            .json(payload)
            .send()
            .await
            .map_err(|e| PipelineError::HttpError(format!("{method} request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(PipelineError::ApiError(format!(
                "{method} HTTP {}",
                resp.status()
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| PipelineError::HttpError(format!("{method} JSON parse error: {e}")))?;

        if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            return Err(PipelineError::ApiError(format!(
                "{method} error: {}",
                body.get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
            )));
        }

        Ok(body)
    }

    async fn search_page(&self, query: &str, page: u32) -> Result<Value, PipelineError> {
        let count = SEARCH_PAGE_SIZE.to_string();
        let page_param = page.to_string();
        self.with_retry(|| async {
            let resp = HTTP_CLIENT
                .get("https://slack.com/api/search.messages")
                .bearer_auth(&self.user_token.token_value.0)
                .query(&[
                    ("query", query),
                    ("count", count.as_str()),
                    ("page", page_param.as_str()),
                    ("sort", "timestamp"),
                    ("sort_dir", "desc"),
                ])
                .send()
                .await
                .map_err(|e| {
                    PipelineError::HttpError(format!("search.messages request failed: {e}"))
                })?;

            if !resp.status().is_success() {
                return Err(PipelineError::ApiError(format!(
                    "search.messages HTTP {}",
                    resp.status()
                )));
            }

            let body: Value = resp.json().await.map_err(|e| {
                PipelineError::HttpError(format!("search.messages JSON parse error: {e}"))
            })?;

            if !body.get("ok").and_then(Value::as_bool).unwrap_or(false) {
                return Err(PipelineError::ApiError(format!(
                    "search.messages error: {}",
                    body.get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                )));
            }

            Ok(body)
        })
        .await
    }

    /// Join the destination channel, then retry the post once. Only called
    /// after a `not_in_channel` response.
    async fn join_and_repost(
        &self,
        channel_id: &str,
        payload: &Value,
    ) -> Result<Value, PipelineError> {
        self.post_api("conversations.join", &self.bot_token, &json!({ "channel": channel_id }))
            .await
            .map_err(|e| {
                PipelineError::PostFailed(format!(
                    "could not join channel {channel_id}; invite the bot: {e}"
                ))
            })?;
        self.post_api("chat.postMessage", &self.bot_token, payload)
            .await
            .map_err(|e| PipelineError::PostFailed(e.to_string()))
    }
}

#[async_trait]
impl Messaging for SlackClient {
    async fn search(
        &self,
        query: &str,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<SearchHit>, PipelineError> {
        let mut hits: Vec<SearchHit> = Vec::new();
        let mut page = 1;

        while page <= MAX_SEARCH_PAGES && hits.len() < limit {
            let body = self.search_page(query, page).await?;
            let messages = body.get("messages").cloned().unwrap_or_default();
            let matches = messages
                .get("matches")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            for m in &matches {
                if !is_human_match(m) {
                    continue;
                }
                let ts = m.get("ts").and_then(Value::as_str);
                let Some(ts) = ts else { continue };
                let thread_ts = m
                    .get("thread_ts")
                    .and_then(Value::as_str)
                    .unwrap_or(ts)
                    .to_string();
                if ts_to_datetime(&thread_ts) < cutoff {
                    continue;
                }
                let Some(channel_id) = match_channel_id(m) else {
                    continue;
                };
                hits.push(SearchHit {
                    channel_id,
                    ts: ts.to_string(),
                    thread_ts,
                    text: m
                        .get("text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    permalink: m
                        .get("permalink")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
            }

            let total_pages = messages
                .get("paging")
                .and_then(|p| p.get("pages"))
                .and_then(Value::as_u64)
                .unwrap_or(1) as u32;
            if page >= total_pages {
                break;
            }
            page += 1;
        }

        hits.truncate(limit);
        info!("Search returned {} qualifying hits", hits.len());
        Ok(hits)
    }

    async fn fetch_thread(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Thread, PipelineError> {
        let payload = json!({
            "channel": channel_id,
            "ts": thread_ts,
            "limit": THREAD_REPLY_LIMIT,
            "inclusive": true,
        });

        let body = self
            .with_retry(|| async {
                self.post_api("conversations.replies", &self.user_token, &payload)
                    .await
            })
            .await
            .map_err(|e| match e {
                PipelineError::ApiError(ref msg) if msg.contains(ERROR_THREAD_NOT_FOUND) => {
                    PipelineError::ThreadNotFound(format!("{channel_id}/{thread_ts}"))
                }
                other => other,
            })?;

        let mut messages: Vec<ThreadMessage> = body
            .get("messages")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| {
                        let ts = m.get("ts").and_then(Value::as_str)?;
                        Some(ThreadMessage {
                            user: m.get("user").and_then(Value::as_str).map(str::to_string),
                            text: m
                                .get("text")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            ts: ts.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        if messages.is_empty() {
            return Err(PipelineError::ThreadNotFound(format!(
                "{channel_id}/{thread_ts}"
            )));
        }

        messages.sort_by(|a, b| {
            ts_to_datetime(&a.ts)
                .cmp(&ts_to_datetime(&b.ts))
                .then_with(|| a.ts.cmp(&b.ts))
        });

        Ok(Thread {
            channel_id: channel_id.to_string(),
            thread_ts: thread_ts.to_string(),
            started_at: ts_to_datetime(thread_ts),
            messages,
        })
    }

    async fn resolve_user(&self, user_id: &str) -> UserProfile {
        let key = cache::user_key(user_id);
        match self.cache.get_json(&key).await {
            Ok(Some(value)) => {
                if let Ok(profile) = serde_json::from_value::<UserProfile>(value) {
                    return profile;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("User cache read failed, querying Slack directly: {e}"),
        }

        let Some(client) = SLACK_CLIENT.as_ref() else {
            warn!("Slack HTTP connector not initialized; cannot resolve {user_id}");
            return UserProfile::unknown(user_id);
        };
        let session = client.open_session(&self.user_token);
        let request = SlackApiUsersInfoRequest::new(SlackUserId(user_id.to_string()));

        let profile = match session.users_info(&request).await {
            Ok(info) => {
                let name = info
                    .user
                    .profile
                    .as_ref()
                    .and_then(|p| p.real_name.clone())
                    .or_else(|| {
                        info.user
                            .profile
                            .as_ref()
                            .and_then(|p| p.display_name.clone())
                    })
                    .unwrap_or_else(|| user_id.to_string());
                UserProfile {
                    id: user_id.to_string(),
                    name,
                }
            }
            Err(e) => {
                warn!("Failed to fetch user info for {}: {:?}", user_id, e);
                return UserProfile::unknown(user_id);
            }
        };

        if let Ok(value) = serde_json::to_value(&profile)
            && let Err(e) = self.cache.set_json(&key, &value, self.user_cache_ttl).await
        {
            warn!("Skipping user cache write for {user_id}: {e}");
        }

        profile
    }

    async fn get_permalink(&self, channel_id: &str, ts: &str) -> Option<String> {
        let payload = json!({
            "channel": channel_id,
            "message_ts": ts,
        });

        let resp = HTTP_CLIENT
            .post("https://slack.com/api/chat.getPermalink")
            .bearer_auth(&self.user_token.token_value.0)
            .json(&payload)
            .send()
            .await
            .ok()?;

        let perm_resp: PermalinkResponse = resp.json().await.ok()?;
        if !perm_resp.ok {
            warn!(
                "chat.getPermalink failed for {channel_id}/{ts}: {}",
                perm_resp.error.unwrap_or_else(|| "unknown".to_string())
            );
            return None;
        }
        perm_resp.permalink
    }

    async fn post_report(
        &self,
        channel_id: &str,
        thread_ts: Option<&str>,
        fallback_text: &str,
        blocks: &Value,
    ) -> Result<String, PipelineError> {
        let mut payload = json!({
            "channel": channel_id,
            "text": fallback_text,
            "blocks": blocks,
        });
        if let Some(ts) = thread_ts {
            payload["thread_ts"] = Value::String(ts.to_string());
        }

        let body = self
            .with_retry(|| async {
                match self
                    .post_api("chat.postMessage", &self.bot_token, &payload)
                    .await
                {
                    Ok(body) => Ok(body),
                    Err(PipelineError::ApiError(ref msg)) if msg.contains(ERROR_NOT_IN_CHANNEL) => {
                        self.join_and_repost(channel_id, &payload).await
                    }
                    Err(e) => Err(PipelineError::PostFailed(e.to_string())),
                }
            })
            .await?;

        body.get("ts")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::PostFailed("no ts in chat.postMessage response".into()))
    }

    async fn find_or_create_weekly_parent(
        &self,
        channel_id: &str,
        week_start: NaiveDate,
    ) -> Result<String, PipelineError> {
        let title = format!("Firefighter weekly summary {}", week_start.format("%Y-%m-%d"));

        // Reuse this week's parent when one already exists in the channel.
        match self.search_page(&title, 1).await {
            Ok(body) => {
                let matches = body
                    .get("messages")
                    .and_then(|m| m.get("matches"))
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                for m in &matches {
                    let text = m.get("text").and_then(Value::as_str).unwrap_or_default();
                    if text.contains(&title)
                        && match_channel_id(m).as_deref() == Some(channel_id)
                        && let Some(ts) = m.get("ts").and_then(Value::as_str)
                    {
                        return Ok(ts.to_string());
                    }
                }
            }
            Err(e) => warn!("Weekly parent search failed, creating a new one: {e}"),
        }

        info!("Creating weekly parent message: {title}");
        self.post_report(channel_id, None, &title, &blocks::weekly_parent_blocks(&title))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_permalink_into_channel_and_ts() {
        let parsed =
            parse_permalink("https://acme.slack.com/archives/C0AB12CD3/p1721609600000100");
        assert_eq!(
            parsed,
            Some(("C0AB12CD3".to_string(), "1721609600.000100".to_string()))
        );
    }

    #[test]
    fn rejects_malformed_permalinks() {
        assert_eq!(parse_permalink("https://acme.slack.com/archives/C0AB12CD3"), None);
        assert_eq!(parse_permalink("not a url"), None);
    }

    #[test]
    fn ts_conversion_keeps_ordering() {
        let earlier = ts_to_datetime("1721609600.000100");
        let later = ts_to_datetime("1721609601.000100");
        assert!(earlier < later);
    }

    #[test]
    fn human_match_filter_drops_bots_and_slackbot() {
        assert!(is_human_match(&json!({ "user": "U123", "text": "help" })));
        assert!(!is_human_match(&json!({ "user": "U123", "subtype": "bot_message" })));
        assert!(!is_human_match(&json!({ "user": "U123", "bot_id": "B99" })));
        assert!(!is_human_match(&json!({ "username": "webhook", "text": "hi" })));
        assert!(!is_human_match(&json!({ "user": "USLACKBOT", "text": "reminder" })));
    }
}
