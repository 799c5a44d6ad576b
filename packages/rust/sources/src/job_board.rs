//! WordPress-style job board (givemeoc.com and lookalikes).
//!
//! Search results live at `<base>?s=<keyword>&paged=<n>`. Each posting is an
//! `<article class="post ...">` card with the title link in
//! `h2.entry-title a` and a teaser in `.entry-summary`.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use jobagent_shared::{FetchContext, JobAgentError, JobBoardSourceConfig, RawRecord, Result};

use crate::SourceAdapter;
use crate::http::fetch_text;
use crate::rate_limit::RateLimiter;

static CARD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article.post").expect("card selector"));
static TITLE_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2.entry-title a").expect("title selector"));
static SUMMARY_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".entry-summary").expect("summary selector"));

/// Paginated keyword search over a WordPress job board.
pub struct JobBoardAdapter {
    client: Client,
    limiter: Arc<RateLimiter>,
    config: JobBoardSourceConfig,
}

impl JobBoardAdapter {
    pub fn new(client: Client, limiter: Arc<RateLimiter>, config: JobBoardSourceConfig) -> Self {
        Self {
            client,
            limiter,
            config,
        }
    }

    fn search_url(&self, keyword: &str, page: u32) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url).map_err(|e| {
            JobAgentError::config(format!("invalid job board URL '{}': {e}", self.config.base_url))
        })?;
        url.query_pairs_mut()
            .append_pair("s", keyword)
            .append_pair("paged", &page.to_string());
        Ok(url)
    }
}

#[async_trait]
impl SourceAdapter for JobBoardAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    #[instrument(skip_all, fields(source = %self.config.name))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawRecord>> {
        let keyword = ctx
            .keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| JobAgentError::validation("job board search needs a keyword"))?;

        let mut records: Vec<RawRecord> = Vec::new();

        for page in 1..=self.config.max_pages.max(1) {
            let url = self.search_url(keyword, page)?;
            self.limiter.acquire().await;

            let html = match fetch_text(&self.client, url.as_str()).await {
                Ok(html) => html,
                // Nothing fetched yet: the whole source is unavailable.
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!(page, error = %e, "page fetch failed, stopping pagination");
                    break;
                }
            };

            let cards = parse_search_page(&html, &url, &self.config.name);
            if cards.is_empty() {
                debug!(page, "no cards on page, stopping pagination");
                break;
            }

            debug!(page, cards = cards.len(), "page parsed");
            records.extend(cards);
        }

        info!(records = records.len(), "job board fetch complete");
        Ok(records)
    }
}

/// Extract posting cards from one search-results page.
pub fn parse_search_page(html: &str, page_url: &Url, source: &str) -> Vec<RawRecord> {
    let doc = Html::parse_document(html);

    doc.select(&CARD_SEL)
        .filter_map(|card| {
            let link = card.select(&TITLE_LINK_SEL).next()?;
            let href = link.value().attr("href")?;
            let url = page_url.join(href).ok()?;

            let title = collapse_text(link.text());
            if title.is_empty() {
                return None;
            }

            let mut record = RawRecord::new()
                .with("title", title)
                .with("url", url.as_str())
                .with("source", source);

            if let Some(summary) = card.select(&SUMMARY_SEL).next() {
                record = record.with("description", collapse_text(summary.text()));
            }

            Some(record)
        })
        .collect()
}

fn collapse_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
