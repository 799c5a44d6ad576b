//! Core pipeline for the job agent.
//!
//! This crate ties the source adapters, normalization, chunked LLM matching,
//! market summarization and report persistence into one run
//! ([`pipeline::run_pipeline`]).

pub mod aggregator;
pub mod assembler;
pub mod llm;
pub mod matcher;
pub mod normalizer;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod summarizer;

pub use aggregator::{AggregateResult, SourceStat};
pub use assembler::{load_report, write_report};
pub use llm::{ChatCompletionsClient, GenerationRequest, TextGenerator};
pub use pipeline::{PipelineDeps, RunConfig, RunOutcome, RunSummary, run_pipeline};
pub use progress::{CancelFlag, ProgressReporter, SilentProgress};
