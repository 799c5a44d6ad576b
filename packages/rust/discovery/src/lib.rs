//! Feed-list discovery from OPML subscription files.
//!
//! The feed source does not hard-code its feeds. It reads them from an OPML
//! export (as produced by WeWe RSS and most feed readers), either a local
//! file or a URL serving one.

mod parser;

use std::path::Path;

use jobagent_shared::{JobAgentError, Result};
use reqwest::Client;
use tracing::{debug, info, instrument};

pub use parser::{FeedEntry, parse_opml};

/// Maximum OPML response size we accept (2 MB).
const MAX_RESPONSE_SIZE: u64 = 2 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Main entry points
// ---------------------------------------------------------------------------

/// Resolve a feed list from `location`, which is either an `http(s)` URL or a
/// filesystem path.
#[instrument(skip_all, fields(location = %location))]
pub async fn discover_feeds(client: &Client, location: &str) -> Result<Vec<FeedEntry>> {
    let feeds = if location.starts_with("http://") || location.starts_with("https://") {
        fetch_opml(client, location).await?
    } else {
        load_opml(Path::new(location))?
    };

    info!(feeds = feeds.len(), "feed list discovered");
    Ok(feeds)
}

/// Read and parse an OPML file from disk.
pub fn load_opml(path: &Path) -> Result<Vec<FeedEntry>> {
    let content = std::fs::read_to_string(path).map_err(|e| JobAgentError::io(path, e))?;
    debug!(path = %path.display(), bytes = content.len(), "read OPML file");
    parse_opml(&content)
}

/// Fetch and parse an OPML document served over HTTP.
pub async fn fetch_opml(client: &Client, url: &str) -> Result<Vec<FeedEntry>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| JobAgentError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(JobAgentError::Network(format!("{url}: HTTP {status}")));
    }

    if let Some(len) = response.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(JobAgentError::validation(format!(
                "{url}: OPML too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
            )));
        }
    }

    let body = response
        .text()
        .await
        .map_err(|e| JobAgentError::Network(format!("{url}: failed to read body: {e}")))?;

    parse_opml(&body)
}
