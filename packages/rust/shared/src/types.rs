//! Core domain types: raw records, canonical postings, match results, reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// RawRecord
// ---------------------------------------------------------------------------

/// A loosely-structured record as returned by a source adapter.
///
/// No key is guaranteed to exist. Read it through [`RawRecord::text`] and
/// convert it into a [`Posting`] via the normalizer, which is the only place
/// allowed to look inside.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert of a string field.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), Value::String(value.into()));
        self
    }

    /// Insert an arbitrary JSON value.
    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    /// Read a field as text. Strings, numbers and booleans are coerced;
    /// null, arrays and objects count as absent.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for RawRecord {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ---------------------------------------------------------------------------
// FetchContext
// ---------------------------------------------------------------------------

/// What a source adapter is asked to fetch. Each adapter reads only the
/// fields relevant to it and falls back to its own configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchContext {
    /// Search keyword for job boards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    /// A single feed URL, bypassing the OPML list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_url: Option<String>,
    /// A single page URL for the rendering adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
}

impl FetchContext {
    /// Context carrying only a search keyword.
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            ..Default::default()
        }
    }

    /// Stable hash of the context, used as the raw-cache key.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.keyword, &self.feed_url, &self.page_url] {
            hasher.update(part.as_deref().unwrap_or("").as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

// ---------------------------------------------------------------------------
// Posting
// ---------------------------------------------------------------------------

/// The canonical, normalized job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub title: String,
    pub company: String,
    pub location: String,
    /// Description as received.
    pub description: String,
    /// Description with whitespace runs collapsed.
    pub clean_description: String,
    pub url: String,
    /// Tag identifying the adapter the record came from.
    pub source: String,
    /// Estimated monthly salary; `None` when no pattern matched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_salary: Option<f64>,
}

impl Posting {
    /// Title and cleaned description joined, as fed to text matching.
    pub fn matching_text(&self) -> String {
        format!("{} {}", self.title, self.clean_description)
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Which list a classified posting lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Core fit for the profile.
    Matched,
    /// Peripheral but noteworthy.
    Other,
}

impl MatchKind {
    /// JSON key used for this kind in both the model response and the report.
    pub fn list_key(&self) -> &'static str {
        match self {
            Self::Matched => "matched_jobs",
            Self::Other => "other_jobs",
        }
    }
}

/// A classified posting: a copy of its identifying fields plus the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub reason: String,
}

impl MatchResult {
    /// Build a result from a posting and a justification.
    pub fn from_posting(posting: &Posting, reason: impl Into<String>) -> Self {
        Self {
            title: posting.title.clone(),
            company: posting.company.clone(),
            source: posting.source.clone(),
            url: posting.url.clone(),
            reason: reason.into(),
        }
    }
}

/// Classified postings, split by kind, in merge order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub matched: Vec<MatchResult>,
    pub other: Vec<MatchResult>,
}

impl MatchOutcome {
    /// Append another outcome after this one, preserving order.
    pub fn extend(&mut self, next: MatchOutcome) {
        self.matched.extend(next.matched);
        self.other.extend(next.other);
    }

    pub fn push(&mut self, kind: MatchKind, result: MatchResult) {
        match kind {
            MatchKind::Matched => self.matched.push(result),
            MatchKind::Other => self.other.push(result),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty() && self.other.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// The persisted per-run artifact consumed by the email renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    #[serde(default)]
    pub matched_jobs: Vec<MatchResult>,
    #[serde(default)]
    pub other_jobs: Vec<MatchResult>,
}

impl Report {
    pub fn new(timestamp: DateTime<Utc>, summary: String, outcome: MatchOutcome) -> Self {
        Self {
            timestamp,
            summary,
            matched_jobs: outcome.matched,
            other_jobs: outcome.other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_record_text_coerces_scalars() {
        let value = json!({
            "title": "Backend Engineer",
            "salary": 30000,
            "remote": true,
            "location": null,
            "tags": ["rust"],
        });
        let record: RawRecord = serde_json::from_value(value).expect("deserialize");

        assert_eq!(record.text("title").as_deref(), Some("Backend Engineer"));
        assert_eq!(record.text("salary").as_deref(), Some("30000"));
        assert_eq!(record.text("remote").as_deref(), Some("true"));
        assert_eq!(record.text("location"), None);
        assert_eq!(record.text("tags"), None);
        assert_eq!(record.text("missing"), None);
    }

    #[test]
    fn cache_key_distinguishes_fields() {
        let a = FetchContext::keyword("rust");
        let b = FetchContext {
            feed_url: Some("rust".into()),
            ..Default::default()
        };
        assert_ne!(a.cache_key(), b.cache_key());
        assert_eq!(a.cache_key(), FetchContext::keyword("rust").cache_key());
    }

    #[test]
    fn report_serializes_expected_shape() {
        let report = Report::new(
            Utc::now(),
            "Steady demand for backend roles.".into(),
            MatchOutcome {
                matched: vec![MatchResult {
                    title: "Rust Engineer".into(),
                    company: "Acme".into(),
                    source: "givemeoc.com".into(),
                    url: "https://example.com/1".into(),
                    reason: "Systems focus".into(),
                }],
                other: vec![],
            },
        );

        let value = serde_json::to_value(&report).expect("serialize");
        assert!(value["timestamp"].is_string());
        assert_eq!(value["matched_jobs"][0]["reason"], "Systems focus");
        assert_eq!(value["other_jobs"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn report_without_other_jobs_still_reads() {
        let json = r#"{"timestamp":"2025-01-01T08:00:00Z","summary":"s","matched_jobs":[]}"#;
        let report: Report = serde_json::from_str(json).expect("deserialize");
        assert!(report.other_jobs.is_empty());
    }

    #[test]
    fn outcome_extend_keeps_order() {
        let job = |t: &str| MatchResult {
            title: t.into(),
            company: String::new(),
            source: String::new(),
            url: String::new(),
            reason: String::new(),
        };
        let mut first = MatchOutcome::default();
        first.push(MatchKind::Matched, job("a"));
        let mut second = MatchOutcome::default();
        second.push(MatchKind::Matched, job("b"));
        second.push(MatchKind::Other, job("c"));

        first.extend(second);
        let titles: Vec<_> = first.matched.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, ["a", "b"]);
        assert_eq!(first.other.len(), 1);
    }
}
