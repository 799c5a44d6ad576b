//! Block grammar for job listings in rendered-page Markdown.
//!
//! A rendering service turns a JS-heavy listing page into Markdown where
//! each posting is a loose run of lines. The grammar:
//!
//! ```text
//! listing    = block { delimiter block }
//! delimiter  = horizontal rule line ("---", "***", "___")
//!            | title line, when the current block already has a title
//! title line = [heading | bullet | ordinal] "[" text "](" url ")" ...
//! field line = [bullet] label (":" | "：") value      (label from the field table)
//! other line = description text
//! ```
//!
//! The first title line of a block supplies title and URL. Field lines fill
//! company, location and salary (first occurrence wins). Other lines after the
//! title are description. Blocks without a title line are dropped.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::cleanup::resolve_href;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which structured field a labelled line fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingField {
    Company,
    Location,
    Salary,
}

/// One posting carved out of rendered Markdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingBlock {
    pub title: String,
    pub url: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub description: String,
}

impl ListingBlock {
    fn set(&mut self, field: ListingField, value: String) {
        let slot = match field {
            ListingField::Company => &mut self.company,
            ListingField::Location => &mut self.location,
            ListingField::Salary => &mut self.salary,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }
}

/// Field table entry: a label alternation mapped to a field.
#[derive(Debug, Clone)]
struct FieldRule {
    field: ListingField,
    pattern: Regex,
}

/// The listing grammar with its field table.
#[derive(Debug, Clone)]
pub struct ListingGrammar {
    rules: Vec<FieldRule>,
}

// ---------------------------------------------------------------------------
// Line patterns
// ---------------------------------------------------------------------------

/// `---`, `***`, `___` with optional interior spaces.
static RULE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:-\s*){3,}|(?:\*\s*){3,}|(?:_\s*){3,})$").expect("rule regex")
});

/// A line whose content starts with a (non-image) Markdown link, after an
/// optional heading, bullet or ordinal prefix and optional bold marker.
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:#{1,6}\s+|[-*+]\s+|\d+[.)]\s+)?(?:\*\*|__)?\[([^\]]+)\]\(([^)\s]+)(?:\s+"[^"]*")?\)"#)
        .expect("title regex")
});

/// Emphasis and stray brackets left in link text.
static EMPHASIS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*|__|\\").expect("emphasis regex"));

fn field_rule(field: ListingField, labels: &str) -> FieldRule {
    let pattern = Regex::new(&format!(
        r"(?i)^\s*(?:[-*+]\s+)?(?:\*\*)?(?:{labels})(?:\*\*)?\s*[:：]\s*(?:\*\*)?\s*(.+?)\s*$"
    ))
    .expect("field regex");
    FieldRule { field, pattern }
}

impl Default for ListingGrammar {
    fn default() -> Self {
        Self {
            rules: vec![
                field_rule(ListingField::Company, "公司名称|公司|企业|company|employer"),
                field_rule(ListingField::Location, "工作地点|地点|城市|location|city"),
                field_rule(ListingField::Salary, "薪资|薪酬|月薪|salary|pay"),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

impl ListingGrammar {
    /// Split rendered Markdown into listing blocks. Relative URLs are resolved
    /// against `base_url` when given.
    pub fn parse(&self, markdown: &str, base_url: Option<&Url>) -> Vec<ListingBlock> {
        let mut blocks: Vec<ListingBlock> = Vec::new();
        let mut current = ListingBlock::default();
        let mut description: Vec<&str> = Vec::new();

        for line in markdown.lines() {
            if RULE_RE.is_match(line) {
                finish_block(std::mem::take(&mut current), &mut description, &mut blocks);
                continue;
            }

            if let Some(caps) = TITLE_RE.captures(line) {
                if current.title.is_empty() {
                    // Text above a block's title is page chrome, not description.
                    description.clear();
                } else {
                    finish_block(std::mem::take(&mut current), &mut description, &mut blocks);
                }
                current.title = clean_link_text(&caps[1]);
                current.url = match base_url {
                    Some(base) => resolve_href(&caps[2], base),
                    None => caps[2].to_string(),
                };
                continue;
            }

            if let Some((field, value)) = self.match_field(line) {
                current.set(field, value);
                continue;
            }

            if !line.trim().is_empty() {
                description.push(line.trim());
            }
        }
        finish_block(current, &mut description, &mut blocks);

        blocks
    }

    fn match_field(&self, line: &str) -> Option<(ListingField, String)> {
        self.rules.iter().find_map(|rule| {
            let caps = rule.pattern.captures(line)?;
            let value = EMPHASIS_RE.replace_all(&caps[1], "").trim().to_string();
            (!value.is_empty()).then_some((rule.field, value))
        })
    }
}

/// Push `block` if it has a title; the pending description is consumed either way.
fn finish_block(mut block: ListingBlock, description: &mut Vec<&str>, blocks: &mut Vec<ListingBlock>) {
    if !block.title.is_empty() {
        block.description = description.join("\n").trim().to_string();
        blocks.push(block);
    }
    description.clear();
}

fn clean_link_text(text: &str) -> String {
    EMPHASIS_RE.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "\
# 搜索结果

[登录](/login) 后查看更多

---

## [Java开发工程师](/job/1001.htm)

公司：星河科技
地点: 上海
薪资：15-25K
负责核心交易系统开发

---

## [前端工程师](https://jobs.example.com/job/1002.htm)

- **Company**: Acme
- **Location**: Remote
React / TypeScript
";

    #[test]
    fn parses_blocks_between_rules() {
        let base = Url::parse("https://jobs.example.com/sou/p1").unwrap();
        let blocks = ListingGrammar::default().parse(PAGE, Some(&base));

        // The login link in the page header forms its own block.
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].title, "登录");
        assert_eq!(blocks[0].description, "");

        let java = &blocks[1];
        assert_eq!(java.title, "Java开发工程师");
        assert_eq!(java.url, "https://jobs.example.com/job/1001.htm");
        assert_eq!(java.company.as_deref(), Some("星河科技"));
        assert_eq!(java.location.as_deref(), Some("上海"));
        assert_eq!(java.salary.as_deref(), Some("15-25K"));
        assert_eq!(java.description, "负责核心交易系统开发");

        let fe = &blocks[2];
        assert_eq!(fe.company.as_deref(), Some("Acme"));
        assert_eq!(fe.location.as_deref(), Some("Remote"));
        assert_eq!(fe.description, "React / TypeScript");
    }

    #[test]
    fn new_title_starts_new_block_without_rule() {
        let md = "1. [Rust Engineer](https://x.com/1)\n公司：A\n2. [Go Engineer](https://x.com/2)\n公司：B\n";
        let blocks = ListingGrammar::default().parse(md, None);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].company.as_deref(), Some("A"));
        assert_eq!(blocks[1].title, "Go Engineer");
        assert_eq!(blocks[1].company.as_deref(), Some("B"));
    }

    #[test]
    fn blocks_without_title_dropped() {
        let md = "Just some text\n公司：Nobody\n\n---\n\nMore text\n";
        assert!(ListingGrammar::default().parse(md, None).is_empty());
    }

    #[test]
    fn text_above_title_is_not_description() {
        let md = "Sponsored\n\n[Rust Engineer](https://x.com/1)\nBuild services\n---\nintro\n[Go Engineer](https://x.com/2)\n";
        let blocks = ListingGrammar::default().parse(md, None);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].description, "Build services");
        assert_eq!(blocks[1].description, "");
    }

    #[test]
    fn inline_links_stay_in_description() {
        let md = "[Backend](https://x.com/1)\nSee [company site](https://acme.com) for details\n";
        let blocks = ListingGrammar::default().parse(md, None);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].description.contains("company site"));
    }

    #[test]
    fn first_field_occurrence_wins() {
        let md = "[A](https://x.com/1)\n城市：北京\n地点：上海\n";
        let blocks = ListingGrammar::default().parse(md, None);
        assert_eq!(blocks[0].location.as_deref(), Some("北京"));
    }

    #[test]
    fn image_lines_are_not_titles() {
        let md = "![logo](https://x.com/logo.png)\n[Real Title](https://x.com/job)\n";
        let blocks = ListingGrammar::default().parse(md, None);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].title, "Real Title");
    }
}
