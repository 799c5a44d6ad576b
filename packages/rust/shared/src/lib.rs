//! Shared types, error model, and configuration for the job agent.
//!
//! This crate is the foundation depended on by all other jobagent crates.
//! It provides:
//! - [`JobAgentError`]: the unified error type
//! - Domain types ([`RawRecord`], [`Posting`], [`MatchResult`], [`Report`])
//! - Configuration ([`AppConfig`] and its sections, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, DefaultsConfig, EmailConfig, FeedSourceConfig, HttpConfig,
    JobBoardSourceConfig, LlmConfig, MatchingConfig, ProfileConfig, RenderedSourceConfig,
    ScheduleConfig, SourcesConfig, config_dir, config_file_path, init_config, init_config_at,
    load_config, load_config_from, read_secret, validate_api_key,
};
pub use error::{JobAgentError, Result};
pub use types::{
    FetchContext, MatchKind, MatchOutcome, MatchResult, Posting, RawRecord, Report,
};
