//! Raw record → [`Posting`] normalization.
//!
//! This is the only place that reads [`RawRecord`] keys. Everything after it
//! can rely on every Posting field being present.

use std::sync::LazyLock;

use regex::Regex;

use jobagent_shared::{Posting, RawRecord};

pub const DEFAULT_LOCATION: &str = "N/A";
pub const DEFAULT_SOURCE: &str = "unknown source";

/// Salary patterns in priority order; the first that matches wins.
static SALARY_RULES: LazyLock<[(Regex, SalaryScale); 4]> = LazyLock::new(|| {
    [
        (
            Regex::new(r"(?i)(\d+)\s*[-–—]\s*(\d+)\s*k").expect("valid regex"),
            SalaryScale::Monthly(1000.0),
        ),
        (
            Regex::new(r"(?i)(\d+)\s*k").expect("valid regex"),
            SalaryScale::Monthly(1000.0),
        ),
        (
            Regex::new(r"(\d+)\s*[-–—]\s*(\d+)\s*万\s*/\s*年").expect("valid regex"),
            SalaryScale::Annual(10000.0),
        ),
        (
            Regex::new(r"(\d+)\s*万\s*/\s*年").expect("valid regex"),
            SalaryScale::Annual(10000.0),
        ),
    ]
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

#[derive(Debug, Clone, Copy)]
enum SalaryScale {
    /// Figures are monthly, in units of the given multiplier.
    Monthly(f64),
    /// Figures are yearly, in units of the given multiplier.
    Annual(f64),
}

impl SalaryScale {
    fn monthly(self, value: f64) -> f64 {
        match self {
            Self::Monthly(unit) => value * unit,
            Self::Annual(unit) => value * unit / 12.0,
        }
    }
}

/// Normalize a batch of raw records, preserving order.
pub fn normalize(records: &[RawRecord]) -> Vec<Posting> {
    records.iter().map(normalize_record).collect()
}

/// Normalize a single record, filling defaults for anything missing.
pub fn normalize_record(record: &RawRecord) -> Posting {
    let description = record.text("description").unwrap_or_default();

    Posting {
        title: field(record, "title").unwrap_or_default(),
        company: field(record, "company").unwrap_or_default(),
        location: field(record, "location").unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
        clean_description: clean_text(&description),
        estimated_salary: estimate_salary(&description),
        url: field(record, "url").unwrap_or_default(),
        source: field(record, "source").unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
        description,
    }
}

/// Trimmed, non-empty text value for `key`.
fn field(record: &RawRecord, key: &str) -> Option<String> {
    record
        .text(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Collapse whitespace runs to single spaces and trim.
pub fn clean_text(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

/// Estimated monthly salary from free text, or `None` when nothing matches.
pub fn estimate_salary(text: &str) -> Option<f64> {
    for (re, scale) in SALARY_RULES.iter() {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let low: f64 = caps.get(1)?.as_str().parse().ok()?;
        let value = match caps.get(2) {
            Some(high) => {
                let high: f64 = high.as_str().parse().ok()?;
                (low + high) / 2.0
            }
            None => low,
        };
        return Some(scale.monthly(value));
    }
    None
}
