//! Prompt builders for matching and market summaries.

use serde_json::json;

use jobagent_shared::Posting;

/// Longest description excerpt sent per posting, in characters.
const DESCRIPTION_EXCERPT_CHARS: usize = 300;

pub const MATCH_SYSTEM: &str = "You are a career assistant who screens job postings \
against a candidate profile. You answer only with a single JSON object, no prose.";

pub const SUMMARY_SYSTEM: &str = "You are a job market analyst who writes short, \
concrete trend summaries for a job seeker.";

/// Per-chunk limits on how many postings each list may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchCaps {
    pub matched: usize,
    pub other: usize,
}

/// User prompt classifying one chunk. Postings are numbered from 0 within the chunk.
pub fn match_prompt(profile: &str, chunk: &[Posting], caps: MatchCaps) -> String {
    let postings: Vec<_> = chunk
        .iter()
        .enumerate()
        .map(|(id, p)| {
            json!({
                "id": id,
                "title": p.title,
                "company": p.company,
                "location": p.location,
                "source": p.source,
                "description": excerpt(&p.clean_description, DESCRIPTION_EXCERPT_CHARS),
            })
        })
        .collect();
    let postings = serde_json::to_string_pretty(&postings).unwrap_or_else(|_| "[]".into());

    format!(
        "Candidate profile:\n{profile}\n\n\
         Job postings:\n{postings}\n\n\
         Classify the postings against the profile.\n\
         - \"matched_jobs\": strong fits for the profile, at most {matched}.\n\
         - \"other_jobs\": not a core fit but still worth a look, at most {other}.\n\
         - Leave out everything else. Never list a posting twice.\n\
         Give each entry the posting \"id\" and a one or two sentence \"reason\", \
         written in the language of the postings.\n\n\
         Respond with exactly this JSON shape:\n\
         {{\"matched_jobs\": [{{\"id\": 0, \"reason\": \"...\"}}], \
         \"other_jobs\": [{{\"id\": 3, \"reason\": \"...\"}}]}}",
        matched = caps.matched,
        other = caps.other,
    )
}

/// User prompt for the holistic market summary over `sample`.
pub fn summary_prompt(sample: &[Posting]) -> String {
    let lines: Vec<String> = sample
        .iter()
        .map(|p| format!("- {} ({})", p.title, p.source))
        .collect();

    format!(
        "Here are {count} recent job postings as title (source):\n{list}\n\n\
         Write a market summary of about 150 to 200 words: which roles and skills \
         are in demand, which kinds of companies are hiring, and any notable trend. \
         Write it in the language of the postings, as plain text without headings.",
        count = sample.len(),
        list = lines.join("\n"),
    )
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(title: &str, description: &str) -> Posting {
        Posting {
            title: title.into(),
            company: "Acme".into(),
            location: "N/A".into(),
            description: description.into(),
            clean_description: description.into(),
            url: String::new(),
            source: "board".into(),
            estimated_salary: None,
        }
    }

    #[test]
    fn match_prompt_numbers_postings_and_states_caps() {
        let chunk = vec![posting("Rust Dev", "systems"), posting("Go Dev", "cloud")];
        let prompt = match_prompt(
            "5 years of Rust",
            &chunk,
            MatchCaps {
                matched: 4,
                other: 2,
            },
        );
        assert!(prompt.contains("5 years of Rust"));
        assert!(prompt.contains("\"id\": 0"));
        assert!(prompt.contains("\"id\": 1"));
        assert!(prompt.contains("Go Dev"));
        assert!(prompt.contains("at most 4"));
        assert!(prompt.contains("at most 2"));
        assert!(prompt.contains("\"matched_jobs\""));
    }

    #[test]
    fn long_descriptions_are_cut_on_char_boundary() {
        let long = "职".repeat(DESCRIPTION_EXCERPT_CHARS + 50);
        let cut = excerpt(&long, DESCRIPTION_EXCERPT_CHARS);
        assert_eq!(cut.chars().count(), DESCRIPTION_EXCERPT_CHARS + 1);
        assert!(cut.ends_with('…'));
        assert_eq!(excerpt("short", 10), "short");
    }

    #[test]
    fn summary_prompt_lists_title_and_source() {
        let prompt = summary_prompt(&[posting("Rust Dev", ""), posting("SRE", "")]);
        assert!(prompt.contains("2 recent job postings"));
        assert!(prompt.contains("- Rust Dev (board)"));
        assert!(prompt.contains("- SRE (board)"));
    }
}
