//! RSS/Atom feeds (typically WeChat official accounts bridged by WeWe RSS).
//!
//! Feed URLs come from the fetch context or an OPML subscription list. Only
//! entries whose title mentions hiring are kept; each one's article page is
//! fetched and reduced to text.

use std::sync::Arc;

use async_trait::async_trait;
use feed_rs::model::Entry;
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use jobagent_discovery::{FeedEntry, discover_feeds};
use jobagent_markdown::{extract_article_text, html_to_text};
use jobagent_shared::{FeedSourceConfig, FetchContext, JobAgentError, RawRecord, Result};

use crate::SourceAdapter;
use crate::http::{fetch_bytes, fetch_text};
use crate::rate_limit::RateLimiter;

/// Adapter name reported to the aggregator.
const NAME: &str = "rss feeds";

/// Fetches hiring posts from a list of feeds.
pub struct FeedAdapter {
    client: Client,
    limiter: Arc<RateLimiter>,
    config: FeedSourceConfig,
}

impl FeedAdapter {
    pub fn new(client: Client, limiter: Arc<RateLimiter>, config: FeedSourceConfig) -> Self {
        Self {
            client,
            limiter,
            config,
        }
    }

    async fn resolve_feeds(&self, ctx: &FetchContext) -> Result<Vec<FeedEntry>> {
        match ctx.feed_url.as_deref() {
            Some(url) => Ok(vec![FeedEntry {
                name: url.to_string(),
                url: url.to_string(),
            }]),
            None => {
                let location = self.config.opml_path.as_str();
                if location.starts_with("http://") || location.starts_with("https://") {
                    self.limiter.acquire().await;
                }
                discover_feeds(&self.client, location).await
            }
        }
    }

    fn title_matches(&self, title: &str) -> bool {
        self.config.title_keywords.is_empty()
            || self
                .config
                .title_keywords
                .iter()
                .any(|k| title.contains(k.as_str()))
    }

    /// Fetch one feed and turn its relevant entries into records.
    #[instrument(skip_all, fields(feed = %feed.name))]
    async fn fetch_feed(&self, feed: &FeedEntry) -> Result<Vec<RawRecord>> {
        self.limiter.acquire().await;
        let bytes = fetch_bytes(&self.client, &feed.url).await?;
        let parsed = feed_rs::parser::parse(bytes.as_slice())
            .map_err(|e| JobAgentError::parse(format!("{}: invalid feed: {e}", feed.url)))?;

        let feed_title = parsed
            .title
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| feed.name.clone());

        let relevant: Vec<&Entry> = parsed
            .entries
            .iter()
            .filter(|e| {
                e.title
                    .as_ref()
                    .is_some_and(|t| self.title_matches(&t.content))
            })
            .take(self.config.max_items_per_feed)
            .collect();

        debug!(
            entries = parsed.entries.len(),
            relevant = relevant.len(),
            "feed parsed"
        );

        let mut records = Vec::with_capacity(relevant.len());
        for entry in relevant {
            records.push(self.entry_record(entry, &feed_title).await);
        }
        Ok(records)
    }

    async fn entry_record(&self, entry: &Entry, feed_title: &str) -> RawRecord {
        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.trim().to_string())
            .unwrap_or_default();
        let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
        let company = entry
            .authors
            .first()
            .map(|p| p.name.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| feed_title.to_string());

        let mut description = None;
        if !link.is_empty() {
            description = self.article_text(&link).await;
        }
        let description = description
            .or_else(|| entry_summary_text(entry))
            .unwrap_or_default();

        RawRecord::new()
            .with("title", title)
            .with("company", company)
            .with("description", description)
            .with("url", link)
            .with("source", format!("RSS: {feed_title}"))
    }

    /// Article body as text, or `None` when it cannot be fetched or selected.
    async fn article_text(&self, url: &str) -> Option<String> {
        self.limiter.acquire().await;
        let html = match fetch_text(&self.client, url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(%url, error = %e, "article fetch failed, using entry summary");
                return None;
            }
        };

        let base = Url::parse(url).ok();
        match extract_article_text(&html, &self.config.article_selector, base.as_ref()) {
            Ok(text) => text,
            Err(e) => {
                warn!(%url, error = %e, "article extraction failed, using entry summary");
                None
            }
        }
    }
}

fn entry_summary_text(entry: &Entry) -> Option<String> {
    let html = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))?;
    html_to_text(&html, None).ok().filter(|t| !t.is_empty())
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn name(&self) -> &str {
        NAME
    }

    #[instrument(skip_all, fields(source = NAME))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<RawRecord>> {
        let feeds = self.resolve_feeds(ctx).await?;
        if feeds.is_empty() {
            info!("no feeds configured");
            return Ok(Vec::new());
        }

        let mut records: Vec<RawRecord> = Vec::new();
        let mut failed = 0usize;

        for feed in &feeds {
            match self.fetch_feed(feed).await {
                Ok(found) => {
                    debug!(feed = %feed.name, records = found.len(), "feed done");
                    records.extend(found);
                }
                Err(e) => {
                    warn!(feed = %feed.name, error = %e, "feed failed, skipping");
                    failed += 1;
                }
            }
        }

        if failed == feeds.len() {
            return Err(JobAgentError::Network(format!(
                "all {failed} feeds failed"
            )));
        }

        info!(feeds = feeds.len(), failed, records = records.len(), "feed fetch complete");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rss(base: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>校招日报</title>
  <item>
    <title>【招聘】Rust 后端工程师</title>
    <link>{base}/article/1</link>
    <description>&lt;p&gt;摘要：30K&lt;/p&gt;</description>
  </item>
  <item>
    <title>今日新闻</title>
    <link>{base}/article/2</link>
  </item>
  <item>
    <title>内推：算法岗</title>
    <link>{base}/article/3</link>
    <description>&lt;p&gt;算法岗摘要&lt;/p&gt;</description>
  </item>
</channel></rss>"#
        )
    }

    fn adapter(opml_path: String) -> FeedAdapter {
        FeedAdapter::new(
            Client::new(),
            Arc::new(RateLimiter::disabled()),
            FeedSourceConfig {
                opml_path,
                ..FeedSourceConfig::default()
            },
        )
    }

    async fn mount_feed(server: &wiremock::MockServer) {
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/feed.xml"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(rss(&server.uri())))
            .mount(server)
            .await;

        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/article/1"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(
                r#"<html><body><div id="js_content"><p>负责存储引擎开发</p></div></body></html>"#,
            ))
            .mount(server)
            .await;

        // Article 3 has no #js_content, so the entry summary is used.
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/article/3"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_string("<html><body>gone</body></html>"),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn fetches_relevant_entries_from_feed_url() {
        let server = wiremock::MockServer::start().await;
        mount_feed(&server).await;

        let ctx = FetchContext {
            feed_url: Some(format!("{}/feed.xml", server.uri())),
            ..Default::default()
        };
        let records = adapter("unused.opml".into()).fetch(&ctx).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text("title").as_deref(), Some("【招聘】Rust 后端工程师"));
        assert_eq!(records[0].text("description").as_deref(), Some("负责存储引擎开发"));
        assert_eq!(records[0].text("company").as_deref(), Some("校招日报"));
        assert_eq!(records[0].text("source").as_deref(), Some("RSS: 校招日报"));
        assert_eq!(records[1].text("description").as_deref(), Some("算法岗摘要"));
    }

    #[tokio::test]
    async fn reads_feeds_from_opml_and_skips_failures() {
        let server = wiremock::MockServer::start().await;
        mount_feed(&server).await;

        let dir = std::env::temp_dir().join(format!("jobagent-feed-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let opml = dir.join("feeds.opml");
        std::fs::write(
            &opml,
            format!(
                r#"<opml version="2.0"><body>
                     <outline text="broken" xmlUrl="{0}/missing.xml"/>
                     <outline text="daily" xmlUrl="{0}/feed.xml"/>
                   </body></opml>"#,
                server.uri()
            ),
        )
        .unwrap();

        let records = adapter(opml.display().to_string())
            .fetch(&FetchContext::default())
            .await
            .unwrap();
        assert_eq!(records.len(), 2);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn remote_opml_fetch_is_paced() {
        let server = wiremock::MockServer::start().await;
        mount_feed(&server).await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/feeds.opml"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string(format!(
                r#"<opml version="2.0"><body><outline text="daily" xmlUrl="{}/feed.xml"/></body></opml>"#,
                server.uri()
            )))
            .mount(&server)
            .await;

        let adapter = FeedAdapter::new(
            Client::new(),
            Arc::new(RateLimiter::from_millis(150)),
            FeedSourceConfig {
                opml_path: format!("{}/feeds.opml", server.uri()),
                ..FeedSourceConfig::default()
            },
        );
        let start = std::time::Instant::now();
        let records = adapter.fetch(&FetchContext::default()).await.unwrap();

        // OPML, feed and two articles: three gaps between four requests.
        assert_eq!(records.len(), 2);
        assert!(start.elapsed() >= std::time::Duration::from_millis(450));
    }

    #[tokio::test]
    async fn all_feeds_failing_is_error() {
        let server = wiremock::MockServer::start().await;

        let ctx = FetchContext {
            feed_url: Some(format!("{}/nothing.xml", server.uri())),
            ..Default::default()
        };
        assert!(adapter("unused.opml".into()).fetch(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn missing_opml_is_error() {
        let err = adapter("/nonexistent/jobagent.opml".into())
            .fetch(&FetchContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, JobAgentError::Io { .. }));
    }

    #[test]
    fn empty_keyword_list_keeps_everything() {
        let mut a = adapter("x".into());
        a.config.title_keywords.clear();
        assert!(a.title_matches("anything"));
    }
}
