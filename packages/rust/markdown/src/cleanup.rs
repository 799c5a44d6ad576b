//! Post-conversion cleanup pipeline for article text.
//!
//! Each cleanup pass is a function `&str -> String` applied in sequence.
//! The output is meant to be read by a language model, not rendered, so the
//! passes drop images and decoration rather than preserving them.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Run the full cleanup pipeline on converted Markdown text.
pub(crate) fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let mut result = md.to_string();

    result = strip_images(&result);
    result = strip_leftover_html(&result);
    result = resolve_links(&result, base_url);
    result = drop_decoration_lines(&result);
    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);

    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Drop images
// ---------------------------------------------------------------------------

/// Remove `![alt](src)` images. WeChat articles are full of them and the alt
/// text is almost always empty or a file name.
fn strip_images(md: &str) -> String {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));

    IMAGE_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Strip leftover HTML tags
// ---------------------------------------------------------------------------

/// Remove stray HTML tags that survived the conversion, keeping inner text.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</?(?:div|span|section|article|p|font|strong|em|b|i|u|mpvoice|mp-style-type|figure|figcaption|br)(?:\s[^>]*)?/?>")
            .expect("valid regex")
    });

    HTML_TAG_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Resolve relative links
// ---------------------------------------------------------------------------

/// Resolve relative URLs in Markdown links against a base URL.
pub(crate) fn resolve_links(md: &str, base_url: Option<&Url>) -> String {
    let Some(base) = base_url else {
        return md.to_string();
    };

    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

    LINK_RE
        .replace_all(md, |caps: &regex::Captures| {
            let text = &caps[1];
            let href = &caps[2];
            format!("[{text}]({})", resolve_href(href, base))
        })
        .to_string()
}

/// Resolve one href against `base`; absolute URLs, anchors and `mailto:` pass through.
pub(crate) fn resolve_href(href: &str, base: &Url) -> String {
    if href.starts_with("http://")
        || href.starts_with("https://")
        || href.starts_with('#')
        || href.starts_with("mailto:")
    {
        return href.to_string();
    }

    match base.join(href) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => href.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Pass 4: Drop decoration
// ---------------------------------------------------------------------------

/// Drop lines made only of markup punctuation (rules, lone bullets, emphasis markers).
fn drop_decoration_lines(md: &str) -> String {
    static DECORATION_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^[\s\-*_=>#|`~]*$").expect("valid regex"));

    md.lines()
        .map(|line| if DECORATION_RE.is_match(line) { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 5: Normalize whitespace
// ---------------------------------------------------------------------------

/// Trim trailing whitespace and non-breaking spaces on every line.
fn normalize_whitespace(md: &str) -> String {
    md.lines()
        .map(|line| line.replace('\u{a0}', " ").trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 6: Collapse blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 2+ blank lines into exactly 1.
fn clean_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_images_removes_all() {
        let input = "Before ![](https://mmbiz.qpic.cn/a.png) after ![logo](x.jpg)";
        assert_eq!(strip_images(input), "Before  after ");
    }

    #[test]
    fn strip_leftover_html_keeps_text() {
        let input = "<section><span style=\"color:red\">急招</span></section>";
        assert_eq!(strip_leftover_html(input), "急招");
    }

    #[test]
    fn resolve_links_relative_resolved() {
        let base = Url::parse("https://jobs.example.com/list?page=1").unwrap();
        let result = resolve_links("[Apply](/job/42)", Some(&base));
        assert_eq!(result, "[Apply](https://jobs.example.com/job/42)");
    }

    #[test]
    fn resolve_links_absolute_untouched() {
        let base = Url::parse("https://jobs.example.com/").unwrap();
        let input = "[Other](https://other.com/page)";
        assert_eq!(resolve_links(input, Some(&base)), input);
    }

    #[test]
    fn resolve_href_keeps_anchor() {
        let base = Url::parse("https://jobs.example.com/").unwrap();
        assert_eq!(resolve_href("#top", &base), "#top");
    }

    #[test]
    fn decoration_lines_dropped() {
        let input = "Title\n---\n* * *\n> \nBody";
        assert_eq!(drop_decoration_lines(input), "Title\n\n\n\nBody");
    }

    #[test]
    fn clean_blank_lines_collapses_excess() {
        assert_eq!(clean_blank_lines("a\n\n\n\nb"), "a\n\nb");
        assert_eq!(clean_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn full_pipeline_produces_readable_text() {
        let input = "![](a.png)\n\n<section>岗位职责</section>\n\n\n\n---\n\n负责后端开发\u{a0}  \n\n[投递](/apply)";
        let base = Url::parse("https://mp.example.com/s/abc").unwrap();
        let result = run_pipeline(input, Some(&base));

        assert_eq!(
            result,
            "岗位职责\n\n负责后端开发\n\n[投递](https://mp.example.com/apply)"
        );
    }
}
