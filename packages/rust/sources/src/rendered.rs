//! JS-heavy listing pages, rendered to Markdown by a scraping API.
//!
//! The request/response shape follows Firecrawl's v1 `/scrape` endpoint.
//! The returned Markdown is carved into postings by [`ListingGrammar`].

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use url::Url;

use jobagent_markdown::{ListingBlock, ListingGrammar};
use jobagent_shared::{FetchContext, JobAgentError, RawRecord, RenderedSourceConfig, Result};

use crate::SourceAdapter;
use crate::rate_limit::RateLimiter;

#[derive(Debug, Deserialize)]
struct RenderResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<RenderData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RenderData {
    #[serde(default)]
    markdown: Option<String>,
}

/// Renders listing pages through the rendering API and parses the result.
pub struct RenderedPageAdapter {
    client: Client,
    limiter: Arc<RateLimiter>,
    config: RenderedSourceConfig,
    api_key: Option<String>,
    grammar: ListingGrammar,
}

impl RenderedPageAdapter {
    /// `api_key` is `None` when the configured env var is unset; fetches then fail.
    pub fn new(
        client: Client,
        limiter: Arc<RateLimiter>,
        config: RenderedSourceConfig,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client,
            limiter,
            config,
            api_key,
            grammar: ListingGrammar::default(),
        }
    }

    /// Ask the rendering API for the Markdown of `page_url`.
    async fn render(&self, api_key: &str, page_url: &str) -> Result<String> {
        self.limiter.acquire().await;

        let body = json!({
            "url": page_url,
            "formats": ["markdown"],
            "onlyMainContent": true,
        });

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| JobAgentError::Network(format!("render {page_url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(JobAgentError::Network(format!(
                "render {page_url}: HTTP {status}"
            )));
        }

        let parsed: RenderResponse = response
            .json()
            .await
            .map_err(|e| JobAgentError::parse(format!("render {page_url}: bad response: {e}")))?;

        if !parsed.success {
            return Err(JobAgentError::Network(format!(
                "render {page_url}: {}",
                parsed.error.as_deref().unwrap_or("rendering failed")
            )));
        }

        parsed
            .data
            .and_then(|d| d.markdown)
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| JobAgentError::parse(format!("render {page_url}: no markdown returned")))
    }

    fn block_record(&self, block: ListingBlock) -> RawRecord {
        let description = match &block.salary {
            Some(salary) if !block.description.is_empty() => {
                format!("{salary}\n{}", block.description)
            }
            Some(salary) => salary.clone(),
            None => block.description,
        };

        let mut record = RawRecord::new()
            .with("title", block.title)
            .with("url", block.url)
            .with("description", description)
            .with("source", self.config.name.as_str());
        if let Some(company) = block.company {
            record = record.with("company", company);
        }
        if let Some(location) = block.location {
            record = record.with("location", location);
        }
        if let Some(salary) = block.salary {
            record = record.with("salary", salary);
        }
        record
    }
}

#[async_trait]
impl SourceAdapter for RenderedPageAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    #[instrument(skip_all, fields(source = %self.config.name))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawRecord>> {
        let pages: Vec<String> = match &ctx.page_url {
            Some(url) => vec![url.clone()],
            None => self.config.page_urls.clone(),
        };
        if pages.is_empty() {
            info!("no pages configured");
            return Ok(Vec::new());
        }

        let api_key = self.api_key.as_deref().ok_or_else(|| {
            JobAgentError::config(format!(
                "rendering API key not found. Set the {} environment variable.",
                self.config.api_key_env
            ))
        })?;

        let mut records: Vec<RawRecord> = Vec::new();
        let mut failed = 0usize;

        for page in &pages {
            match self.render(api_key, page).await {
                Ok(markdown) => {
                    let base = Url::parse(page).ok();
                    let blocks = self.grammar.parse(&markdown, base.as_ref());
                    debug!(%page, blocks = blocks.len(), "page rendered");
                    records.extend(blocks.into_iter().map(|b| self.block_record(b)));
                }
                Err(e) => {
                    warn!(%page, error = %e, "page failed, skipping");
                    failed += 1;
                }
            }
        }

        if failed == pages.len() {
            return Err(JobAgentError::Network(format!("all {failed} pages failed to render")));
        }

        info!(pages = pages.len(), failed, records = records.len(), "rendered fetch complete");
        Ok(records)
    }
}
