//! Text helpers for source adapters.
//!
//! Two concerns live here, both kept out of the core pipeline:
//! - Reducing article HTML (feed entries, WeChat posts) to readable text using
//!   `scraper` for selection and `htmd` for conversion, then a cleanup pipeline.
//! - Carving rendered-page Markdown into job listings via [`ListingGrammar`].

mod cleanup;
mod listing;

use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use jobagent_shared::{JobAgentError, Result};

pub use listing::{ListingBlock, ListingField, ListingGrammar};

/// Tags never worth converting.
const SKIP_TAGS: [&str; 7] = ["script", "style", "nav", "iframe", "noscript", "svg", "img"];

// ---------------------------------------------------------------------------
// HTML selection
// ---------------------------------------------------------------------------

/// Return the inner HTML of the first element matching `selector`, or `None`
/// when nothing matches. An unparseable selector is an error.
pub fn select_html(html: &str, selector: &str) -> Result<Option<String>> {
    let selector = Selector::parse(selector)
        .map_err(|e| JobAgentError::parse(format!("invalid CSS selector '{selector}': {e}")))?;

    let doc = Html::parse_document(html);
    Ok(doc.select(&selector).next().map(|el| el.inner_html()))
}

// ---------------------------------------------------------------------------
// HTML → text
// ---------------------------------------------------------------------------

/// Convert an HTML fragment to cleaned, Markdown-flavoured text.
///
/// Links are kept (resolved against `base_url` when given); images, scripts
/// and layout tags are dropped.
#[instrument(skip_all, fields(html_len = html.len()))]
pub fn html_to_text(html: &str, base_url: Option<&Url>) -> Result<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let raw = converter
        .convert(html)
        .map_err(|e| JobAgentError::parse(format!("htmd conversion failed: {e}")))?;

    let text = cleanup::run_pipeline(&raw, base_url);
    debug!(raw_len = raw.len(), text_len = text.len(), "html converted to text");
    Ok(text)
}

/// Select the article body with `selector` and convert it to text.
///
/// Returns `Ok(None)` when the selector matches nothing or the body is empty
/// after cleanup, so callers can fall back to another source of text.
pub fn extract_article_text(
    html: &str,
    selector: &str,
    base_url: Option<&Url>,
) -> Result<Option<String>> {
    let Some(fragment) = select_html(html, selector)? else {
        return Ok(None);
    };
    let text = html_to_text(&fragment, base_url)?;
    Ok((!text.is_empty()).then_some(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    const WECHAT_PAGE: &str = r#"<html><head><title>x</title><script>var a=1;</script></head>
<body>
  <div id="meta">公众号 · 校招日报</div>
  <div id="js_content" class="rich_media_content">
    <section><p><strong>岗位：</strong>后端开发工程师</p></section>
    <p><img src="https://mmbiz.qpic.cn/banner.png"></p>
    <p>地点：深圳</p>
    <p><a href="/apply?id=7">点击投递</a></p>
  </div>
</body></html>"#;

    #[test]
    fn select_html_finds_first_match() {
        let inner = select_html(WECHAT_PAGE, "#js_content").unwrap().unwrap();
        assert!(inner.contains("后端开发工程师"));
        assert!(!inner.contains("校招日报"));
    }

    #[test]
    fn select_html_no_match_is_none() {
        assert!(select_html(WECHAT_PAGE, "#missing").unwrap().is_none());
    }

    #[test]
    fn select_html_bad_selector_is_error() {
        assert!(select_html(WECHAT_PAGE, "##").is_err());
    }

    #[test]
    fn extract_article_text_cleans_body() {
        let base = Url::parse("https://mp.weixin.qq.com/s/abc").unwrap();
        let text = extract_article_text(WECHAT_PAGE, "#js_content", Some(&base))
            .unwrap()
            .unwrap();

        assert!(text.contains("后端开发工程师"));
        assert!(text.contains("地点：深圳"));
        assert!(text.contains("https://mp.weixin.qq.com/apply?id=7"));
        assert!(!text.contains("banner.png"));
        assert!(!text.contains("<section>"));
    }

    #[test]
    fn extract_article_text_empty_body_is_none() {
        let html = r#"<div id="js_content"><p><img src="a.png"></p></div>"#;
        assert!(extract_article_text(html, "#js_content", None).unwrap().is_none());
    }

    #[test]
    fn html_to_text_plain_summary() {
        let text = html_to_text("<p>招聘 Rust 工程师</p><p>15-25K</p>", None).unwrap();
        assert!(text.contains("招聘 Rust 工程师"));
        assert!(text.contains("15-25K"));
    }
}
