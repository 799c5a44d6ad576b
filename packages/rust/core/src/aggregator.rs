//! Fan-in over source adapters with per-source failure isolation.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use jobagent_shared::{FetchContext, RawRecord};
use jobagent_sources::SourceAdapter;
use jobagent_storage::Storage;

use crate::progress::ProgressReporter;

/// What one source contributed to a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStat {
    pub name: String,
    pub records: usize,
    /// Set when the adapter failed; the source then contributed nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Records were served from the raw cache.
    pub cached: bool,
}

/// Result of one aggregation pass.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateResult {
    /// At least one source returned records, concatenated in adapter order.
    Collected {
        records: Vec<RawRecord>,
        sources: Vec<SourceStat>,
    },
    /// Every source was empty or failed.
    NoData { sources: Vec<SourceStat> },
}

impl AggregateResult {
    pub fn sources(&self) -> &[SourceStat] {
        match self {
            Self::Collected { sources, .. } | Self::NoData { sources } => sources,
        }
    }
}

/// Optional raw-record cache in front of the adapters.
#[derive(Clone, Copy)]
pub struct RawCache<'a> {
    pub storage: &'a Storage,
    pub ttl: Duration,
}

/// Invoke every adapter in order and concatenate what they return.
///
/// A failing adapter is logged and counted as zero records. Cache errors are
/// logged and otherwise ignored.
#[instrument(skip_all, fields(adapters = adapters.len(), cached = cache.is_some()))]
pub async fn aggregate(
    adapters: &[Box<dyn SourceAdapter>],
    ctx: &FetchContext,
    cache: Option<RawCache<'_>>,
    progress: &dyn ProgressReporter,
) -> AggregateResult {
    let cache_key = ctx.cache_key();
    if let Some(cache) = cache {
        match cache.storage.prune_raw_cache(cache.ttl).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "pruned expired raw cache entries"),
            Err(e) => warn!(error = %e, "raw cache prune failed"),
        }
    }

    let mut records: Vec<RawRecord> = Vec::new();
    let mut sources: Vec<SourceStat> = Vec::with_capacity(adapters.len());

    for adapter in adapters {
        let name = adapter.name().to_string();

        let stat = match cached_records(cache, &name, &cache_key).await {
            Some(hit) => {
                debug!(source = %name, records = hit.len(), "raw cache hit");
                let stat = SourceStat {
                    name,
                    records: hit.len(),
                    error: None,
                    cached: true,
                };
                records.extend(hit);
                stat
            }
            None => match adapter.fetch(ctx).await {
                Ok(fetched) => {
                    if let Some(cache) = cache.filter(|_| !fetched.is_empty()) {
                        if let Err(e) =
                            cache.storage.put_raw_cache(&name, &cache_key, &fetched).await
                        {
                            warn!(source = %name, error = %e, "failed to store raw cache");
                        }
                    }
                    info!(source = %name, records = fetched.len(), "source fetched");
                    let stat = SourceStat {
                        name,
                        records: fetched.len(),
                        error: None,
                        cached: false,
                    };
                    records.extend(fetched);
                    stat
                }
                Err(e) => {
                    warn!(source = %name, error = %e, "source failed, continuing without it");
                    SourceStat {
                        name,
                        records: 0,
                        error: Some(e.to_string()),
                        cached: false,
                    }
                }
            },
        };

        progress.source_done(&stat);
        sources.push(stat);
    }

    if records.is_empty() {
        warn!("no source returned any records");
        AggregateResult::NoData { sources }
    } else {
        info!(records = records.len(), "aggregation complete");
        AggregateResult::Collected { records, sources }
    }
}

async fn cached_records(
    cache: Option<RawCache<'_>>,
    source: &str,
    cache_key: &str,
) -> Option<Vec<RawRecord>> {
    let cache = cache?;
    match cache.storage.get_raw_cache(source, cache_key, cache.ttl).await {
        Ok(Some(records)) if !records.is_empty() => Some(records),
        Ok(_) => None,
        Err(e) => {
            warn!(source, error = %e, "raw cache read failed");
            None
        }
    }
}
