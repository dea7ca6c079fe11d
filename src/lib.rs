//! Firewatch - scans a Slack workspace for urgent firefighter threads,
//! summarizes each with a language model and publishes Block Kit reports
//! under a weekly parent message.
//!
//! The pipeline is strictly linear: search → fetch → resolve identities →
//! summarize → cache → post. One hit is processed fully before the next;
//! the Redis-backed cache is the only shared state and the dedup mechanism.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use firewatch::ai::{LlmClient, Summarizer};
//! use firewatch::cache::RedisCache;
//! use firewatch::core::config::AppConfig;
//! use firewatch::runner::Runner;
//! use firewatch::slack::SlackClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     firewatch::setup_logging();
//!
//!     let config = AppConfig::from_env()?;
//!     let cache = Arc::new(RedisCache::connect(&config.redis_url).await?);
//!     let messaging = Arc::new(SlackClient::new(&config, cache.clone()));
//!     let summarizer = Summarizer::new(Arc::new(LlmClient::new(
//!         config.openai_api_key.clone(),
//!         config.openai_model.clone(),
//!     )));
//!
//!     let runner = Runner::new(config, messaging, summarizer, cache);
//!     let stats = runner.run(true, None).await?;
//!     println!("rendered {} reports", stats.rendered);
//!     Ok(())
//! }
//! ```
// Module declarations
pub mod ai;
pub mod cache;
pub mod core;
pub mod errors;
pub mod runner;
pub mod slack;
pub mod utils;

/// Configure structured logging for the batch run. Honors `RUST_LOG`;
/// defaults to `info` for this crate. Call once at process start.
pub fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("firewatch=info")),
        )
        .with_target(true)
        .init();
}
