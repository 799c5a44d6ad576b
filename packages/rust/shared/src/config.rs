//! Application configuration for the job agent.
//!
//! User config lives at `~/.jobagent/jobagent.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file, only the names of the env vars
//! that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{JobAgentError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "jobagent.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".jobagent";

// ---------------------------------------------------------------------------
// Config structs (matching jobagent.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Search keyword handed to keyword-driven sources.
    #[serde(default = "default_keyword")]
    pub keyword: String,

    /// Where the run report is written.
    #[serde(default = "default_report_path")]
    pub report_path: String,

    /// Directory for the cache/history database.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            keyword: default_keyword(),
            report_path: default_report_path(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_keyword() -> String {
    "工程师".into()
}
fn default_report_path() -> String {
    "data/matched_jobs_summary.json".into()
}
fn default_data_dir() -> String {
    "data".into()
}

/// `[http]` section, shared by all source adapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Minimum ms between consecutive requests to the same source.
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
            min_interval_ms: default_min_interval(),
        }
    }
}

fn default_http_timeout() -> u64 {
    20
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".into()
}
fn default_min_interval() -> u64 {
    1000
}

/// `[llm]` section: an OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "deepseek/deepseek-chat".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_llm_timeout() -> u64 {
    60
}
fn default_temperature() -> f32 {
    0.3
}

/// `[matching]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Postings per matching request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_per_chunk_cap")]
    pub max_matched_per_chunk: usize,

    #[serde(default = "default_per_chunk_cap")]
    pub max_other_per_chunk: usize,

    /// How many postings the market summary sees.
    #[serde(default = "default_summary_sample")]
    pub summary_sample_size: usize,

    /// Chunks in flight at once. 1 keeps dispatch sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            max_matched_per_chunk: default_per_chunk_cap(),
            max_other_per_chunk: default_per_chunk_cap(),
            summary_sample_size: default_summary_sample(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_chunk_size() -> usize {
    20
}
fn default_per_chunk_cap() -> usize {
    5
}
fn default_summary_sample() -> usize {
    100
}
fn default_concurrency() -> usize {
    1
}

/// `[profile]` section: who the postings are matched against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Inline profile text.
    #[serde(default)]
    pub summary: String,

    /// Optional file whose contents replace `summary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ProfileConfig {
    /// Resolve the profile text, preferring the file when configured.
    pub fn resolve(&self) -> Result<String> {
        match &self.path {
            Some(path) => std::fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .map_err(|e| JobAgentError::io(path, e)),
            None => Ok(self.summary.trim().to_string()),
        }
    }
}

/// `[sources]` section with one sub-table per adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub job_board: JobBoardSourceConfig,
    #[serde(default)]
    pub feeds: FeedSourceConfig,
    #[serde(default)]
    pub rendered: RenderedSourceConfig,
}

/// `[sources.job_board]`: a WordPress-style job listing site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobBoardSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_job_board_url")]
    pub base_url: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Tag written into each record's `source` field.
    #[serde(default = "default_job_board_name")]
    pub name: String,
}

impl Default for JobBoardSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_job_board_url(),
            max_pages: default_max_pages(),
            name: default_job_board_name(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_job_board_url() -> String {
    "https://www.givemeoc.com/".into()
}
fn default_max_pages() -> u32 {
    1
}
fn default_job_board_name() -> String {
    "givemeoc.com".into()
}

/// `[sources.feeds]`: RSS/Atom feeds listed in an OPML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_opml_path")]
    pub opml_path: String,
    #[serde(default = "default_max_items")]
    pub max_items_per_feed: usize,
    /// Entries are kept only if their title contains one of these.
    /// Empty keeps everything.
    #[serde(default = "default_title_keywords")]
    pub title_keywords: Vec<String>,
    /// CSS selector for the article body on the linked page.
    #[serde(default = "default_article_selector")]
    pub article_selector: String,
}

impl Default for FeedSourceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            opml_path: default_opml_path(),
            max_items_per_feed: default_max_items(),
            title_keywords: default_title_keywords(),
            article_selector: default_article_selector(),
        }
    }
}

fn default_opml_path() -> String {
    "feeds.opml".into()
}
fn default_max_items() -> usize {
    10
}
fn default_title_keywords() -> Vec<String> {
    vec!["招聘".into(), "求职".into(), "内推".into()]
}
fn default_article_selector() -> String {
    "#js_content".into()
}

/// `[sources.rendered]`: JS-heavy listing pages fetched through a rendering API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedSourceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_render_api_url")]
    pub api_url: String,
    #[serde(default = "default_render_key_env")]
    pub api_key_env: String,
    /// Listing pages to render when the fetch context names none.
    #[serde(default)]
    pub page_urls: Vec<String>,
    #[serde(default = "default_rendered_name")]
    pub name: String,
}

impl Default for RenderedSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_url: default_render_api_url(),
            api_key_env: default_render_key_env(),
            page_urls: Vec::new(),
            name: default_rendered_name(),
        }
    }
}

fn default_render_api_url() -> String {
    "https://api.firecrawl.dev/v1/scrape".into()
}
fn default_render_key_env() -> String {
    "FIRECRAWL_API_KEY".into()
}
fn default_rendered_name() -> String {
    "rendered listing".into()
}

/// `[cache]` section: raw records cached per source and query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_hours: default_ttl_hours(),
        }
    }
}

fn default_ttl_hours() -> u64 {
    12
}

/// `[email]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    /// Name of the env var holding the SMTP password.
    #[serde(default = "default_smtp_password_env")]
    pub password_env: String,
    #[serde(default)]
    pub recipient: String,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: String::new(),
            smtp_port: default_smtp_port(),
            username: String::new(),
            password_env: default_smtp_password_env(),
            recipient: String::new(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_port() -> u16 {
    465
}
fn default_smtp_password_env() -> String {
    "SMTP_PASSWORD".into()
}
fn default_smtp_timeout() -> u64 {
    10
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local time of day, `HH:MM`.
    #[serde(default = "default_send_time")]
    pub send_time: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            send_time: default_send_time(),
        }
    }
}

fn default_send_time() -> String {
    "09:00".into()
}

impl ScheduleConfig {
    /// Convert `send_time` into a six-field cron expression (seconds first).
    pub fn cron_expression(&self) -> Result<String> {
        let invalid = || {
            JobAgentError::config(format!(
                "invalid schedule.send_time '{}': expected HH:MM",
                self.send_time
            ))
        };
        let (hour, minute) = self.send_time.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok(format!("0 {minute} {hour} * * *"))
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.jobagent/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| JobAgentError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.jobagent/jobagent.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| JobAgentError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| JobAgentError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    init_config_at(&config_file_path()?)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<PathBuf> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| JobAgentError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| JobAgentError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| JobAgentError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}

/// Read a secret from the named environment variable.
pub fn read_secret(var_name: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(JobAgentError::config(format!(
            "secret not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that the LLM API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.llm.api_key_env;
    read_secret(var_name).map(|_| ()).map_err(|_| {
        JobAgentError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable."
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("report_path"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("chunk_size"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.matching.chunk_size, 20);
        assert_eq!(parsed.matching.summary_sample_size, 100);
        assert_eq!(parsed.http.min_interval_ms, 1000);
        assert_eq!(parsed.sources.feeds.title_keywords.len(), 3);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[matching]
chunk_size = 10

[sources.rendered]
enabled = true
page_urls = ["https://jobs.example.com/list"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.matching.chunk_size, 10);
        assert_eq!(config.matching.max_matched_per_chunk, 5);
        assert!(config.sources.rendered.enabled);
        assert_eq!(config.sources.rendered.page_urls.len(), 1);
        assert!(config.sources.job_board.enabled);
        assert_eq!(config.email.smtp_port, 465);
    }

    #[test]
    fn cron_expression_from_send_time() {
        let schedule = ScheduleConfig {
            send_time: "08:30".into(),
        };
        assert_eq!(schedule.cron_expression().unwrap(), "0 30 8 * * *");

        let bad = ScheduleConfig {
            send_time: "25:00".into(),
        };
        assert!(bad.cron_expression().is_err());

        let garbage = ScheduleConfig {
            send_time: "noon".into(),
        };
        assert!(garbage.cron_expression().is_err());
    }

    #[test]
    fn profile_prefers_inline_when_no_path() {
        let profile = ProfileConfig {
            summary: "  Rust backend developer  ".into(),
            path: None,
        };
        assert_eq!(profile.resolve().unwrap(), "Rust backend developer");
    }

    #[test]
    fn init_config_writes_loadable_file() {
        let dir =
            std::env::temp_dir().join(format!("jobagent-config-test-{}", uuid::Uuid::now_v7()));
        let path = dir.join("nested").join("jobagent.toml");
        let written = init_config_at(&path).expect("init");
        let loaded = load_config_from(&written).expect("load");
        assert_eq!(loaded.defaults.keyword, "工程师");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "JOBAGENT_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
