use std::sync::Arc;

use clap::Parser;
use tracing::warn;

use firewatch::ai::{LlmClient, Summarizer};
use firewatch::cache::{KvCache, RedisCache, UnavailableCache};
use firewatch::core::config::AppConfig;
use firewatch::runner::Runner;
use firewatch::slack::SlackClient;

#[derive(Parser, Debug)]
#[command(name = "firewatch", version, about = "Summarize firefighter threads into weekly reports")]
struct Cli {
    /// Print rendered report blocks instead of posting to Slack
    #[arg(long)]
    dry_run: bool,

    /// Process exactly one thread, bypassing search
    #[arg(long, value_name = "URL")]
    permalink: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    firewatch::setup_logging();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    // The cache is an optimization layer; an unreachable backend degrades
    // the run instead of aborting it.
    let cache: Arc<dyn KvCache> = match RedisCache::connect(&config.redis_url).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            warn!("Cache backend unreachable, running with an empty cache: {e}");
            Arc::new(UnavailableCache)
        }
    };

    let messaging = Arc::new(SlackClient::new(&config, cache.clone()));
    let summarizer = Summarizer::new(Arc::new(LlmClient::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
    )));

    let dry_run = cli.dry_run || config.dry_run;
    let runner = Runner::new(config, messaging, summarizer, cache);
    runner.run(dry_run, cli.permalink.as_deref()).await?;

    Ok(())
}
