//! Chunked matching of postings against a profile.
//!
//! Postings are split positionally into fixed-size chunks. Each chunk gets one
//! classification request; a chunk whose request or response fails
//! contributes nothing. Results are merged strictly in chunk order, whether
//! chunks are dispatched one at a time or in bounded parallel batches.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use jobagent_shared::{
    JobAgentError, MatchKind, MatchOutcome, MatchResult, MatchingConfig, Posting, Result,
};

use crate::llm::{GenerationRequest, TextGenerator, strip_json_fences};
use crate::progress::{CancelFlag, ProgressReporter};
use crate::prompts::{self, MatchCaps};

/// Matcher settings, usually taken from `[matching]` and `[llm]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatcherConfig {
    pub chunk_size: usize,
    pub caps: MatchCaps,
    /// Chunks in flight at once; 1 means strictly sequential.
    pub concurrency: usize,
    pub temperature: f32,
}

impl MatcherConfig {
    pub fn new(matching: &MatchingConfig, temperature: f32) -> Self {
        Self {
            chunk_size: matching.chunk_size,
            caps: MatchCaps {
                matched: matching.max_matched_per_chunk,
                other: matching.max_other_per_chunk,
            },
            concurrency: matching.concurrency,
            temperature,
        }
    }
}

/// Outcome of matching a full posting set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchRun {
    pub outcome: MatchOutcome,
    /// Chunks the postings were split into.
    pub chunks: usize,
    /// Chunks whose request or response failed.
    pub failed_chunks: usize,
    /// Stopped early at a chunk boundary.
    pub cancelled: bool,
}

/// Split postings into contiguous chunks of `size`; the last may be shorter.
pub fn chunk_postings(postings: &[Posting], size: usize) -> Vec<&[Posting]> {
    postings.chunks(size.max(1)).collect()
}

/// Classifies postings chunk by chunk through a [`TextGenerator`].
pub struct ChunkedMatcher {
    generator: Arc<dyn TextGenerator>,
    config: MatcherConfig,
}

impl ChunkedMatcher {
    pub fn new(generator: Arc<dyn TextGenerator>, config: MatcherConfig) -> Self {
        Self { generator, config }
    }

    /// Match `postings` against `profile`, checking `cancel` before each chunk
    /// (or each parallel batch).
    #[instrument(skip_all, fields(postings = postings.len(), chunk_size = self.config.chunk_size))]
    pub async fn match_postings(
        &self,
        postings: &[Posting],
        profile: &str,
        cancel: &CancelFlag,
        progress: &dyn ProgressReporter,
    ) -> MatchRun {
        let chunks: Vec<&[Posting]> = chunk_postings(postings, self.config.chunk_size)
            .into_iter()
            .filter(|c| !c.is_empty())
            .collect();
        let total = chunks.len();

        let mut run = MatchRun {
            chunks: total,
            ..Default::default()
        };
        let profile: Arc<str> = Arc::from(profile);
        let batch_size = self.config.concurrency.max(1);

        info!(chunks = total, concurrency = batch_size, "starting chunked matching");

        let mut done = 0usize;
        for batch in chunks.chunks(batch_size) {
            if cancel.is_cancelled() {
                info!(done, total, "matching cancelled at chunk boundary");
                run.cancelled = true;
                break;
            }

            let mut handles = Vec::with_capacity(batch.len());
            for chunk in batch {
                let generator = self.generator.clone();
                let profile = profile.clone();
                let chunk = chunk.to_vec();
                let config = self.config;
                handles.push(tokio::spawn(async move {
                    classify_chunk(generator.as_ref(), &profile, &chunk, config).await
                }));
            }

            // Await in dispatch order so the merge stays in chunk order.
            for handle in handles {
                let index = done;
                done += 1;
                match handle.await {
                    Ok(Ok(outcome)) => {
                        debug!(
                            chunk = index,
                            matched = outcome.matched.len(),
                            other = outcome.other.len(),
                            "chunk classified"
                        );
                        run.outcome.extend(outcome);
                    }
                    Ok(Err(e)) => {
                        warn!(chunk = index, error = %e, "chunk failed, skipping its postings");
                        run.failed_chunks += 1;
                    }
                    Err(e) => {
                        warn!(chunk = index, error = %e, "chunk task panicked");
                        run.failed_chunks += 1;
                    }
                }
                progress.chunk_done(done, total);
            }
        }

        info!(
            matched = run.outcome.matched.len(),
            other = run.outcome.other.len(),
            failed_chunks = run.failed_chunks,
            cancelled = run.cancelled,
            "matching complete"
        );
        run
    }
}

/// One request/response round for a single chunk.
async fn classify_chunk(
    generator: &dyn TextGenerator,
    profile: &str,
    chunk: &[Posting],
    config: MatcherConfig,
) -> Result<MatchOutcome> {
    let request = GenerationRequest {
        system: prompts::MATCH_SYSTEM.to_string(),
        user: prompts::match_prompt(profile, chunk, config.caps),
        json: true,
        temperature: config.temperature,
    };
    let text = generator.generate(&request).await?;
    parse_chunk_response(&text, chunk, config.caps)
}

/// Parse a classification response for `chunk`.
///
/// A missing or non-array list key counts as an empty list. Entries refer to
/// postings by chunk-local `id`; their fields are copied from the posting.
/// An entry without a usable id whose `title` names a posting of the chunk
/// stands for that posting; any other titled entry is taken as given. A
/// posting is classified at most once, loose entries are deduplicated on
/// title, company and url, and each list is capped.
pub fn parse_chunk_response(text: &str, chunk: &[Posting], caps: MatchCaps) -> Result<MatchOutcome> {
    let value: Value = serde_json::from_str(strip_json_fences(text))
        .map_err(|e| JobAgentError::parse(format!("match response is not JSON: {e}")))?;
    let Value::Object(map) = value else {
        return Err(JobAgentError::parse("match response is not a JSON object"));
    };

    let mut outcome = MatchOutcome::default();
    let mut seen_ids: HashSet<usize> = HashSet::new();
    let mut seen_loose: HashSet<(String, String, String)> = HashSet::new();

    for (kind, cap) in [(MatchKind::Matched, caps.matched), (MatchKind::Other, caps.other)] {
        let Some(Value::Array(entries)) = map.get(kind.list_key()) else {
            continue;
        };

        let mut taken = 0usize;
        for entry in entries {
            if taken >= cap {
                debug!(list = kind.list_key(), cap, "cap reached, dropping extra entries");
                break;
            }
            let Value::Object(entry) = entry else {
                continue;
            };
            let reason = entry
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim();

            let id = entry_id(entry.get("id"))
                .filter(|id| *id < chunk.len())
                .or_else(|| id_by_title(entry, chunk, &seen_ids));

            let result = match id {
                Some(id) => {
                    if !seen_ids.insert(id) {
                        continue;
                    }
                    MatchResult::from_posting(&chunk[id], reason)
                }
                None => {
                    let Some(result) = loose_entry(entry, reason) else {
                        continue;
                    };
                    if names_posting(&result.title, chunk) {
                        debug!(title = %result.title, "posting already classified, dropping entry");
                        continue;
                    }
                    let key = (result.title.clone(), result.company.clone(), result.url.clone());
                    if !seen_loose.insert(key) {
                        continue;
                    }
                    result
                }
            };

            outcome.push(kind, result);
            taken += 1;
        }
    }

    Ok(outcome)
}

/// First not-yet-classified posting whose title equals the entry's title.
fn id_by_title(
    entry: &serde_json::Map<String, Value>,
    chunk: &[Posting],
    seen: &HashSet<usize>,
) -> Option<usize> {
    let title = entry.get("title").and_then(Value::as_str)?.trim();
    if title.is_empty() {
        return None;
    }
    chunk
        .iter()
        .enumerate()
        .find(|(id, p)| !seen.contains(id) && p.title.trim() == title)
        .map(|(id, _)| id)
}

fn names_posting(title: &str, chunk: &[Posting]) -> bool {
    chunk.iter().any(|p| p.title.trim() == title)
}

/// Accept integer ids and numeric strings.
fn entry_id(value: Option<&Value>) -> Option<usize> {
    match value? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loose_entry(entry: &serde_json::Map<String, Value>, reason: &str) -> Option<MatchResult> {
    let text = |key: &str| {
        entry
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };
    let title = text("title");
    if title.is_empty() {
        return None;
    }
    Some(MatchResult {
        title,
        company: text("company"),
        source: text("source"),
        url: text("url"),
        reason: reason.to_string(),
    })
}
