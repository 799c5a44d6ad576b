//! Report → HTML email body, rendered through an askama template.

use askama::Template;
use chrono::{Local, NaiveDate};

use jobagent_shared::{JobAgentError, MatchResult, Report, Result};

#[derive(Template)]
#[template(path = "report_email.html")]
struct ReportEmail<'a> {
    generated: String,
    summary_lines: Vec<&'a str>,
    sections: [Section<'a>; 2],
}

struct Section<'a> {
    heading: &'static str,
    header_bg: &'static str,
    empty_note: &'static str,
    jobs: Vec<JobRow<'a>>,
}

struct JobRow<'a> {
    href: &'a str,
    title: &'a str,
    company: &'a str,
    source: &'a str,
    reason_lines: Vec<&'a str>,
}

impl<'a> JobRow<'a> {
    fn new(job: &'a MatchResult) -> Self {
        Self {
            href: if job.url.is_empty() { "#" } else { job.url.as_str() },
            title: or_na(&job.title),
            company: or_na(&job.company),
            source: or_na(&job.source),
            reason_lines: or_na(&job.reason).lines().collect(),
        }
    }
}

/// Subject line for the report sent on `date`.
pub fn render_subject(date: NaiveDate) -> String {
    format!("您的每日职位匹配报告 - {}", date.format("%Y-%m-%d"))
}

/// Render the full HTML body for a report.
pub fn render_html(report: &Report) -> Result<String> {
    let email = ReportEmail {
        generated: report
            .timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        summary_lines: report.summary.lines().collect(),
        sections: [
            Section {
                heading: "核心匹配职位",
                header_bg: "#e6f7ff",
                empty_note: "今日暂无核心匹配的职位。",
                jobs: report.matched_jobs.iter().map(JobRow::new).collect(),
            },
            Section {
                heading: "其他值得关注职位",
                header_bg: "#f0f0f0",
                empty_note: "今日暂无其他特别值得关注的职位。",
                jobs: report.other_jobs.iter().map(JobRow::new).collect(),
            },
        ],
    };
    email
        .render()
        .map_err(|e| JobAgentError::Email(format!("failed to render report email: {e}")))
}

fn or_na(s: &str) -> &str {
    if s.trim().is_empty() { "N/A" } else { s }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jobagent_shared::MatchOutcome;

    fn job(title: &str, reason: &str) -> MatchResult {
        MatchResult {
            title: title.into(),
            company: "Acme".into(),
            source: "givemeoc.com".into(),
            url: "https://x.com/1?a=1&b=2".into(),
            reason: reason.into(),
        }
    }

    #[test]
    fn subject_has_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(render_subject(date), "您的每日职位匹配报告 - 2025-03-09");
    }

    #[test]
    fn renders_both_tables() {
        let report = Report::new(
            Utc::now(),
            "Line one\nLine two".into(),
            MatchOutcome {
                matched: vec![job("Rust <Engineer>", "Strong fit\nsystems")],
                other: vec![job("Go Engineer", "")],
            },
        );
        let html = render_html(&report).unwrap();

        assert!(html.contains("Line one<br>Line two"));
        assert!(html.contains("Rust &lt;Engineer&gt;"));
        assert!(html.contains("Strong fit<br>systems"));
        assert!(html.contains("a=1&amp;b=2"));
        assert!(html.contains("#e6f7ff"));
        assert!(html.contains("#f0f0f0"));
        // Empty reason shown as N/A.
        assert!(html.contains(">N/A</td>"));
        assert!(!html.contains("今日暂无"));
    }

    #[test]
    fn empty_lists_show_notes() {
        let report = Report::new(Utc::now(), "summary".into(), MatchOutcome::default());
        let html = render_html(&report).unwrap();
        assert!(html.contains("今日暂无核心匹配的职位。"));
        assert!(html.contains("今日暂无其他特别值得关注的职位。"));
        assert!(!html.contains("<table"));
    }

    #[test]
    fn model_text_cannot_inject_markup() {
        let report = Report::new(
            Utc::now(),
            "<script>alert(1)</script>".into(),
            MatchOutcome {
                matched: vec![job("a\"b", "<b>bold</b>")],
                other: Vec::new(),
            },
        );
        let html = render_html(&report).unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("a&quot;b"));
        assert!(!html.contains("<b>bold</b>"));
    }
}
