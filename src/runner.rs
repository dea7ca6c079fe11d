//! Pipeline orchestration: search → per hit (check cache → fetch → resolve →
//! summarize → post → cache-write) → done.
//!
//! Hits are processed strictly one at a time. Per-hit failures are isolated;
//! only configuration and search connectivity failures abort a run.

use chrono::{Datelike, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::ai::Summarizer;
use crate::cache::{self, KvCache};
use crate::core::config::AppConfig;
use crate::core::models::{SearchHit, Summary};
use crate::errors::PipelineError;
use crate::slack::{Messaging, blocks, client};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub hits: usize,
    pub summarized: usize,
    pub reused: usize,
    pub posted: usize,
    pub rendered: usize,
    pub skipped: usize,
}

pub struct Runner {
    config: AppConfig,
    messaging: Arc<dyn Messaging>,
    summarizer: Summarizer,
    cache: Arc<dyn KvCache>,
}

impl Runner {
    #[must_use]
    pub fn new(
        config: AppConfig,
        messaging: Arc<dyn Messaging>,
        summarizer: Summarizer,
        cache: Arc<dyn KvCache>,
    ) -> Self {
        Self {
            config,
            messaging,
            summarizer,
            cache,
        }
    }

    /// Execute one logical run.
    ///
    /// # Errors
    ///
    /// Fails only before any hit is processed: an invalid `--permalink`
    /// argument or a search connectivity failure. Everything after that is
    /// logged and skipped per hit.
    pub async fn run(
        &self,
        dry_run: bool,
        permalink: Option<&str>,
    ) -> Result<RunStats, PipelineError> {
        let mut stats = RunStats::default();

        let mut hits = if let Some(link) = permalink {
            let (channel_id, ts) = client::parse_permalink(link).ok_or_else(|| {
                PipelineError::Configuration(format!("Invalid permalink format: {link}"))
            })?;
            info!("Single thread mode: {link}");
            vec![SearchHit {
                channel_id,
                ts: ts.clone(),
                thread_ts: ts,
                text: String::new(),
                permalink: Some(link.to_string()),
            }]
        } else {
            let cutoff = Utc::now() - chrono::Duration::days(self.config.lookback_days);
            self.messaging
                .search(&self.config.search_query, cutoff, self.config.search_limit)
                .await?
        };

        // Search matches individual messages, so one thread can surface
        // several times; the first occurrence wins.
        let mut seen_threads: Vec<String> = Vec::new();
        hits.retain(|h| {
            if seen_threads.contains(&h.thread_ts) {
                false
            } else {
                seen_threads.push(h.thread_ts.clone());
                true
            }
        });

        if hits.len() > self.config.max_threads {
            warn!(
                "Dropping {} hits beyond the MAX_THREADS cap of {}",
                hits.len() - self.config.max_threads,
                self.config.max_threads
            );
            hits.truncate(self.config.max_threads);
        }
        stats.hits = hits.len();

        if hits.is_empty() {
            info!("No firefighter threads found in the selected window");
            return Ok(stats);
        }

        let mut parent_ts: Option<String> = None;
        let single_thread_mode = permalink.is_some();

        for hit in &hits {
            self.process_hit(hit, dry_run, single_thread_mode, &mut parent_ts, &mut stats)
                .await;
        }

        info!(
            "Run complete: {} hits, {} summarized, {} reused, {} posted, {} rendered, {} skipped",
            stats.hits, stats.summarized, stats.reused, stats.posted, stats.rendered, stats.skipped
        );
        Ok(stats)
    }

    async fn process_hit(
        &self,
        hit: &SearchHit,
        dry_run: bool,
        single_thread_mode: bool,
        parent_ts: &mut Option<String>,
        stats: &mut RunStats,
    ) {
        let key = cache::summary_key(&hit.thread_ts);
        let cached = self.cached_summary(&key).await;
        let fresh = cached.is_none();

        let summary = if let Some(summary) = cached {
            info!("Reusing cached summary for thread {}", hit.thread_ts);
            stats.reused += 1;
            summary
        } else {
            let thread = match self
                .messaging
                .fetch_thread(&hit.channel_id, &hit.thread_ts)
                .await
            {
                Ok(thread) => thread,
                Err(e) => {
                    warn!("Skipping thread {}: {e}", hit.thread_ts);
                    stats.skipped += 1;
                    return;
                }
            };

            // A lone message with no replies is not a support conversation,
            // unless the operator named it explicitly.
            if !single_thread_mode && thread.messages.len() < 2 {
                info!("Skipping thread {} with no replies", hit.thread_ts);
                stats.skipped += 1;
                return;
            }

            let mut display_names: HashMap<String, String> = HashMap::new();
            for message in &thread.messages {
                if let Some(id) = &message.user
                    && !display_names.contains_key(id)
                {
                    let profile = self.messaging.resolve_user(id).await;
                    display_names.insert(id.clone(), profile.name);
                }
            }

            match self.summarizer.summarize(&thread, &display_names).await {
                Ok(summary) => {
                    stats.summarized += 1;
                    summary
                }
                Err(e) => {
                    warn!("Skipping thread {}: {e}", hit.thread_ts);
                    stats.skipped += 1;
                    return;
                }
            }
        };

        let permalink_url = match &hit.permalink {
            Some(url) => Some(url.clone()),
            None => {
                self.messaging
                    .get_permalink(&hit.channel_id, &hit.thread_ts)
                    .await
            }
        };
        let report = blocks::render_report(&summary, permalink_url.as_deref());

        if dry_run {
            match serde_json::to_string_pretty(&report) {
                Ok(rendered) => println!("{rendered}"),
                Err(_) => println!("{report}"),
            }
            stats.rendered += 1;
            return;
        }

        if parent_ts.is_none() {
            *parent_ts = self.weekly_parent().await;
        }

        match self
            .messaging
            .post_report(
                &self.config.slack_channel_id,
                parent_ts.as_deref(),
                &blocks::fallback_text(&summary),
                &report,
            )
            .await
        {
            Ok(_) => {
                stats.posted += 1;
                // Dedup window opens only after a confirmed post; a failed
                // post leaves the thread eligible for the next run.
                if fresh {
                    self.write_summary(&key, &summary).await;
                }
            }
            Err(e) => {
                warn!(
                    "Post failed for thread {}, leaving it uncached for the next run: {e}",
                    hit.thread_ts
                );
                stats.skipped += 1;
            }
        }
    }

    async fn cached_summary(&self, key: &str) -> Option<Summary> {
        match self.cache.get_json(key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!("Discarding unreadable cached summary {key}: {e}");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {key}, treating as empty: {e}");
                None
            }
        }
    }

    async fn write_summary(&self, key: &str, summary: &Summary) {
        let value = match serde_json::to_value(summary) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not serialize summary for {key}: {e}");
                return;
            }
        };
        let ttl = Duration::from_secs(self.config.thread_cache_ttl_secs);
        if let Err(e) = self.cache.set_json(key, &value, ttl).await {
            warn!("Skipping summary cache write for {key}: {e}");
        }
    }

    /// Parent message for this week's reports; posting proceeds un-threaded
    /// when it cannot be found or created.
    async fn weekly_parent(&self) -> Option<String> {
        let monday = week_start(Utc::now().date_naive());
        match self
            .messaging
            .find_or_create_weekly_parent(&self.config.slack_channel_id, monday)
            .await
        {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!("Weekly parent unavailable, posting directly to channel: {e}");
                None
            }
        }
    }
}

/// Monday of the ISO week containing `date`.
#[must_use]
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - chrono::Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_start_is_monday() {
        // 2026-08-06 is a Thursday.
        let thursday = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        assert_eq!(week_start(thursday), NaiveDate::from_ymd_opt(2026, 8, 3).unwrap());

        let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        assert_eq!(week_start(monday), monday);

        let sunday = NaiveDate::from_ymd_opt(2026, 8, 9).unwrap();
        assert_eq!(week_start(sunday), NaiveDate::from_ymd_opt(2026, 8, 3).unwrap());
    }
}
