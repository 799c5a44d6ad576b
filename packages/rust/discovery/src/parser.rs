//! OPML subscription-list parser.
//!
//! Reads the subset of OPML 2.0 that feed readers export:
//! - `<opml><body>` containing (possibly nested) `<outline>` elements
//! - Feed outlines carry `xmlUrl`, plus a display name in `text` or `title`
//! - Folder outlines have no `xmlUrl` and only group their children

use jobagent_shared::{JobAgentError, Result};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single feed subscription from an OPML file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// Display name of the feed (falls back to the URL).
    pub name: String,
    /// The feed's `xmlUrl`.
    pub url: String,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse OPML text into the list of feeds it subscribes to, in document order.
///
/// Outlines without an `http(s)` `xmlUrl` are skipped. Duplicate URLs are
/// kept only once.
pub fn parse_opml(content: &str) -> Result<Vec<FeedEntry>> {
    let doc = roxmltree::Document::parse(content)
        .map_err(|e| JobAgentError::parse(format!("invalid OPML: {e}")))?;

    let root = doc.root_element();
    if !root.has_tag_name("opml") {
        return Err(JobAgentError::parse(format!(
            "expected <opml> root element, found <{}>",
            root.tag_name().name()
        )));
    }

    let mut feeds: Vec<FeedEntry> = Vec::new();

    for node in root.descendants().filter(|n| n.has_tag_name("outline")) {
        let Some(url) = node.attribute("xmlUrl").map(str::trim) else {
            continue;
        };
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            continue;
        }
        if feeds.iter().any(|f| f.url == url) {
            continue;
        }

        let name = node
            .attribute("text")
            .or_else(|| node.attribute("title"))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(url);

        feeds.push(FeedEntry {
            name: name.to_string(),
            url: url.to_string(),
        });
    }

    Ok(feeds)
}
