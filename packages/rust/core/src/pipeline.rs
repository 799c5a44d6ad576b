//! End-to-end run: sources → normalize → match → summarize → report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, instrument, warn};

use jobagent_shared::{AppConfig, FetchContext, MatchingConfig, Report, Result};
use jobagent_sources::SourceAdapter;
use jobagent_storage::{RunStatus, Storage};

use crate::aggregator::{self, AggregateResult, RawCache, SourceStat};
use crate::assembler;
use crate::llm::TextGenerator;
use crate::matcher::{ChunkedMatcher, MatcherConfig};
use crate::normalizer;
use crate::progress::{CancelFlag, ProgressReporter};
use crate::summarizer;

/// Settings for one run, resolved from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub context: FetchContext,
    pub profile: String,
    pub report_path: PathBuf,
    pub matching: MatchingConfig,
    pub temperature: f32,
    /// Raw-cache lifetime; `None` disables the cache.
    pub cache_ttl: Option<Duration>,
}

impl RunConfig {
    /// Resolve run settings. `keyword` overrides `[defaults] keyword`.
    pub fn from_app(config: &AppConfig, keyword: Option<String>) -> Result<Self> {
        let profile = config.profile.resolve()?;
        if profile.is_empty() {
            warn!("profile is empty; matching will have nothing to compare against");
        }

        Ok(Self {
            context: FetchContext::keyword(keyword.unwrap_or_else(|| config.defaults.keyword.clone())),
            profile,
            report_path: PathBuf::from(&config.defaults.report_path),
            matching: config.matching.clone(),
            temperature: config.llm.temperature,
            cache_ttl: config
                .cache
                .enabled
                .then(|| Duration::from_secs(config.cache.ttl_hours * 3600)),
        })
    }
}

/// Collaborators a run needs.
pub struct PipelineDeps<'a> {
    pub adapters: &'a [Box<dyn SourceAdapter>],
    pub generator: Arc<dyn TextGenerator>,
    /// Enables the raw cache and run history when present.
    pub storage: Option<&'a Storage>,
}

/// Statistics for a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub sources: Vec<SourceStat>,
    pub raw_records: usize,
    pub postings: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub matched: usize,
    pub other: usize,
    pub summary_available: bool,
    pub report_path: PathBuf,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Every source was empty; no report was written.
    NoData { sources: Vec<SourceStat> },
    /// Stopped at a chunk boundary; no report was written.
    Cancelled,
    /// A new report was written.
    Completed(RunSummary),
}

/// Run the pipeline once.
///
/// Source, chunk and run-history failures degrade the run; only a report
/// write failure is returned as `Err`.
#[instrument(skip_all, fields(keyword = ?config.context.keyword))]
pub async fn run_pipeline(
    config: &RunConfig,
    deps: &PipelineDeps<'_>,
    progress: &dyn ProgressReporter,
    cancel: &CancelFlag,
) -> Result<RunOutcome> {
    let start = Instant::now();

    let run_id = match deps.storage {
        Some(storage) => {
            let keyword = config.context.keyword.as_deref().unwrap_or_default();
            match storage.insert_run(keyword).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(error = %e, "failed to record run start, continuing without history");
                    None
                }
            }
        }
        None => None,
    };
    info!(run_id = ?run_id, "starting run");

    let result = execute(config, deps, progress, cancel, run_id.clone(), start).await;

    if let (Some(storage), Some(id)) = (deps.storage, run_id.as_deref()) {
        let (status, stats) = match &result {
            Ok(RunOutcome::Completed(summary)) => (RunStatus::Completed, serde_json::to_string(summary)),
            Ok(RunOutcome::NoData { sources }) => (
                RunStatus::NoData,
                serde_json::to_string(&serde_json::json!({ "sources": sources })),
            ),
            Ok(RunOutcome::Cancelled) => (RunStatus::Cancelled, Ok("{}".to_string())),
            Err(e) => (
                RunStatus::Failed,
                serde_json::to_string(&serde_json::json!({ "error": e.to_string() })),
            ),
        };
        let stats = stats.unwrap_or_else(|_| "{}".to_string());
        if let Err(e) = storage.finish_run(id, status, &stats).await {
            warn!(run_id = %id, error = %e, "failed to record run result");
        }
    }

    result
}

async fn execute(
    config: &RunConfig,
    deps: &PipelineDeps<'_>,
    progress: &dyn ProgressReporter,
    cancel: &CancelFlag,
    run_id: Option<String>,
    start: Instant,
) -> Result<RunOutcome> {
    // --- Phase 1: Sources ---
    progress.phase("Fetching postings");
    let cache = match (deps.storage, config.cache_ttl) {
        (Some(storage), Some(ttl)) => Some(RawCache { storage, ttl }),
        _ => None,
    };
    let (records, sources) =
        match aggregator::aggregate(deps.adapters, &config.context, cache, progress).await {
            AggregateResult::Collected { records, sources } => (records, sources),
            AggregateResult::NoData { sources } => {
                warn!("no data from any source, leaving previous report untouched");
                return Ok(RunOutcome::NoData { sources });
            }
        };

    // --- Phase 2: Normalize ---
    progress.phase("Normalizing postings");
    let postings = normalizer::normalize(&records);
    info!(raw = records.len(), postings = postings.len(), "normalized");

    if cancel.is_cancelled() {
        return Ok(RunOutcome::Cancelled);
    }

    // --- Phase 3: Match ---
    progress.phase("Matching postings");
    let matcher = ChunkedMatcher::new(
        deps.generator.clone(),
        MatcherConfig::new(&config.matching, config.temperature),
    );
    let run = matcher
        .match_postings(&postings, &config.profile, cancel, progress)
        .await;
    if run.cancelled {
        return Ok(RunOutcome::Cancelled);
    }

    // --- Phase 4: Summarize ---
    progress.phase("Summarizing market");
    let summary = summarizer::summarize(
        deps.generator.as_ref(),
        &postings,
        config.matching.summary_sample_size,
        config.temperature,
    )
    .await;

    // --- Phase 5: Report ---
    progress.phase("Writing report");
    let summary_available = summary != summarizer::SUMMARY_UNAVAILABLE;
    let report = Report::new(Utc::now(), summary, run.outcome);
    assembler::write_report(&config.report_path, &report)?;

    let result = RunSummary {
        run_id,
        sources,
        raw_records: records.len(),
        postings: postings.len(),
        chunks: run.chunks,
        failed_chunks: run.failed_chunks,
        matched: report.matched_jobs.len(),
        other: report.other_jobs.len(),
        summary_available,
        report_path: config.report_path.clone(),
        elapsed: start.elapsed(),
    };

    progress.done(&result);
    info!(
        postings = result.postings,
        matched = result.matched,
        other = result.other,
        failed_chunks = result.failed_chunks,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "run complete"
    );

    Ok(RunOutcome::Completed(result))
}
