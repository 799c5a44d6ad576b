//! Source adapters: where raw job postings come from.
//!
//! This crate provides:
//! - [`SourceAdapter`]: the async fetch capability every source implements
//! - [`JobBoardAdapter`], [`FeedAdapter`], [`RenderedPageAdapter`]: built-in sources
//! - [`RateLimiter`]: per-source request pacing, injected into adapters
//! - [`build_client`] / [`build_adapters`]: construction from [`AppConfig`]

mod feed;
mod http;
mod job_board;
mod rate_limit;
mod rendered;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use jobagent_shared::{AppConfig, FetchContext, RawRecord, Result, read_secret};

pub use feed::FeedAdapter;
pub use http::build_client;
pub use job_board::{JobBoardAdapter, parse_search_page};
pub use rate_limit::RateLimiter;
pub use rendered::RenderedPageAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Fetches raw postings from one external origin.
///
/// Returning `Err` means the whole source was unavailable for this run. The
/// caller treats that exactly like an empty result; partial failures (one
/// page, one feed) are absorbed inside the adapter.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Human-readable source name for logs and run stats.
    fn name(&self) -> &str;

    /// Fetch raw records for the given context.
    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawRecord>>;
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Build the enabled adapters, in config order: job board, feeds, rendered pages.
///
/// All adapters share one HTTP client; each gets its own rate limiter.
pub fn build_adapters(config: &AppConfig) -> Result<Vec<Box<dyn SourceAdapter>>> {
    let client = build_client(&config.http)?;
    let limiter = || Arc::new(RateLimiter::from_millis(config.http.min_interval_ms));
    let sources = &config.sources;

    let mut adapters: Vec<Box<dyn SourceAdapter>> = Vec::new();

    if sources.job_board.enabled {
        adapters.push(Box::new(JobBoardAdapter::new(
            client.clone(),
            limiter(),
            sources.job_board.clone(),
        )));
    }

    if sources.feeds.enabled {
        adapters.push(Box::new(FeedAdapter::new(
            client.clone(),
            limiter(),
            sources.feeds.clone(),
        )));
    }

    if sources.rendered.enabled {
        let api_key = read_secret(&sources.rendered.api_key_env).ok();
        if api_key.is_none() {
            warn!(
                env = %sources.rendered.api_key_env,
                "rendering API key not set, rendered source will fail"
            );
        }
        adapters.push(Box::new(RenderedPageAdapter::new(
            client.clone(),
            limiter(),
            sources.rendered.clone(),
            api_key,
        )));
    }

    info!(
        adapters = adapters.len(),
        names = ?adapters.iter().map(|a| a.name()).collect::<Vec<_>>(),
        "source adapters built"
    );
    Ok(adapters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_board_and_feeds() {
        let adapters = build_adapters(&AppConfig::default()).unwrap();
        let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
        assert_eq!(names, ["givemeoc.com", "rss feeds"]);
    }

    #[test]
    fn disabled_sources_skipped() {
        let mut config = AppConfig::default();
        config.sources.job_board.enabled = false;
        config.sources.feeds.enabled = false;
        config.sources.rendered.enabled = true;
        config.sources.rendered.api_key_env = "JOBAGENT_TEST_UNSET_RENDER_KEY".into();

        let adapters = build_adapters(&config).unwrap();
        assert_eq!(adapters.len(), 1);
        assert_eq!(adapters[0].name(), "rendered listing");
    }
}
