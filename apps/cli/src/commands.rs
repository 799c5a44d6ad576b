//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use jobagent_core::{
    CancelFlag, ChatCompletionsClient, PipelineDeps, RunConfig, RunOutcome, RunSummary,
    SilentProgress, SourceStat, TextGenerator, load_report, run_pipeline,
};
use jobagent_mailer::Mailer;
use jobagent_shared::{
    AppConfig, MatchResult, Report, init_config, init_config_at, load_config, load_config_from,
    validate_api_key,
};
use jobagent_sources::{SourceAdapter, build_adapters};
use jobagent_storage::{DB_FILE_NAME, Storage};

use crate::progress::CliProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// jobagent: gather job postings, match them to your profile, email the result.
#[derive(Parser)]
#[command(
    name = "jobagent",
    version,
    about = "Aggregate job postings, match them against a profile with an LLM, and email a daily report.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.jobagent/jobagent.toml).
    #[arg(long, env = "JOBAGENT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline once and write the report.
    Run {
        /// Search keyword (overrides `[defaults] keyword`).
        #[arg(short, long)]
        keyword: Option<String>,

        /// Email the report after a completed run.
        #[arg(long)]
        send: bool,
    },

    /// Run daily at `[schedule] send_time` and email each report. Stops on Ctrl-C.
    Schedule,

    /// Email the current report file.
    Send,

    /// Print the current report file.
    Report,

    /// List recent runs.
    History {
        /// Number of runs to show.
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "jobagent=info",
        1 => "jobagent=debug",
        _ => "jobagent=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run { keyword, send } => cmd_run(config_path, keyword, send).await,
        Command::Schedule => cmd_schedule(config_path).await,
        Command::Send => cmd_send(config_path).await,
        Command::Report => cmd_report(config_path),
        Command::History { limit } => cmd_history(config_path, limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    Ok(match config_path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

fn db_path(config: &AppConfig) -> PathBuf {
    Path::new(&config.defaults.data_dir).join(DB_FILE_NAME)
}

/// Open run storage; a failure only disables caching and history.
async fn open_storage(config: &AppConfig) -> Option<Storage> {
    let path = db_path(config);
    match Storage::open(&path).await {
        Ok(storage) => Some(storage),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "storage unavailable, running without cache and history");
            None
        }
    }
}

/// Everything a run needs, built once per process.
struct Runner {
    config: AppConfig,
    adapters: Vec<Box<dyn SourceAdapter>>,
    generator: Arc<dyn TextGenerator>,
    storage: Option<Storage>,
}

impl Runner {
    async fn new(config: AppConfig) -> Result<Self> {
        validate_api_key(&config)?;
        let adapters = build_adapters(&config)?;
        let generator: Arc<dyn TextGenerator> =
            Arc::new(ChatCompletionsClient::from_config(&config.llm)?);
        let storage = open_storage(&config).await;
        Ok(Self {
            config,
            adapters,
            generator,
            storage,
        })
    }

    async fn run(
        &self,
        keyword: Option<String>,
        progress: &dyn jobagent_core::ProgressReporter,
        cancel: &CancelFlag,
    ) -> Result<RunOutcome> {
        let run_config = RunConfig::from_app(&self.config, keyword)?;
        let deps = PipelineDeps {
            adapters: &self.adapters,
            generator: self.generator.clone(),
            storage: self.storage.as_ref(),
        };
        Ok(run_pipeline(&run_config, &deps, progress, cancel).await?)
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn cmd_run(config_path: Option<&Path>, keyword: Option<String>, send: bool) -> Result<()> {
    let config = load(config_path)?;
    let mailer = if send {
        Some(Mailer::from_config(&config.email)?)
    } else {
        None
    };
    let runner = Runner::new(config).await?;

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next chunk boundary");
            on_interrupt.cancel();
        }
    });

    info!(keyword = ?keyword, send, "starting run");
    let reporter = CliProgress::new();
    let outcome = runner.run(keyword, &reporter, &cancel).await;
    reporter.finish();

    match outcome? {
        RunOutcome::Completed(summary) => {
            print_summary(&summary);
            if let Some(mailer) = mailer {
                let report = load_report(&summary.report_path)?;
                mailer.send(&report).await?;
                println!("  Report emailed to {}.", runner.config.email.recipient);
            }
        }
        RunOutcome::NoData { sources } => {
            print_sources(&sources);
            println!("\n  No source returned any postings. The previous report was left as is.");
        }
        RunOutcome::Cancelled => {
            println!("\n  Run cancelled. No report was written.");
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    print_sources(&summary.sources);
    println!();
    println!("  Run complete!");
    if let Some(id) = &summary.run_id {
        println!("  Run:      {id}");
    }
    println!("  Postings: {}", summary.postings);
    println!(
        "  Chunks:   {} ({} failed)",
        summary.chunks, summary.failed_chunks
    );
    println!("  Matched:  {}", summary.matched);
    println!("  Other:    {}", summary.other);
    if !summary.summary_available {
        println!("  Summary:  unavailable (fallback text used)");
    }
    println!("  Report:   {}", summary.report_path.display());
    println!("  Time:     {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

fn print_sources(sources: &[SourceStat]) {
    println!();
    println!("  Sources:");
    for stat in sources {
        match &stat.error {
            Some(e) => println!("    {:<20} failed: {e}", stat.name),
            None if stat.cached => println!("    {:<20} {} (cached)", stat.name, stat.records),
            None => println!("    {:<20} {}", stat.name, stat.records),
        }
    }
}

// ---------------------------------------------------------------------------
// schedule
// ---------------------------------------------------------------------------

async fn cmd_schedule(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let cron = config.schedule.cron_expression()?;
    let send_time = config.schedule.send_time.clone();
    let mailer = Mailer::from_config(&config.email)?;
    let runner = Arc::new(Runner::new(config).await?);

    let mut scheduler = JobScheduler::new().await?;
    let job = Job::new_async_tz(cron.as_str(), chrono::Local, move |_uuid, _lock| {
        let runner = runner.clone();
        let mailer = mailer.clone();
        Box::pin(async move {
            scheduled_run(&runner, &mailer).await;
        })
    })?;
    scheduler.add(job).await?;
    scheduler.start().await?;

    info!(%cron, "scheduler started");
    println!("  Scheduled daily at {send_time} (local time). Press Ctrl-C to stop.");

    tokio::signal::ctrl_c().await?;
    info!("shutting down scheduler");
    scheduler.shutdown().await?;
    Ok(())
}

/// One scheduled tick: run, then email only when a report was written.
async fn scheduled_run(runner: &Runner, mailer: &Mailer) {
    info!("scheduled run triggered");
    match runner.run(None, &SilentProgress, &CancelFlag::new()).await {
        Ok(RunOutcome::Completed(summary)) => {
            let sent = match load_report(&summary.report_path) {
                Ok(report) => mailer.send(&report).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match sent {
                Ok(()) => info!(matched = summary.matched, "scheduled run complete, report emailed"),
                Err(e) => error!(error = %e, "scheduled run complete but email failed"),
            }
        }
        Ok(RunOutcome::NoData { .. }) => warn!("scheduled run found no data, email skipped"),
        Ok(RunOutcome::Cancelled) => warn!("scheduled run cancelled, email skipped"),
        Err(e) => error!(error = %e, "scheduled run failed, email skipped"),
    }
}

// ---------------------------------------------------------------------------
// send / report / history
// ---------------------------------------------------------------------------

async fn cmd_send(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let mailer = Mailer::from_config(&config.email)?;
    let path = PathBuf::from(&config.defaults.report_path);
    let report = load_report(&path)
        .map_err(|e| eyre!("cannot read report at {}: {e}. Run `jobagent run` first.", path.display()))?;

    mailer.send(&report).await?;
    println!("Report emailed to {}.", config.email.recipient);
    Ok(())
}

fn cmd_report(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let path = PathBuf::from(&config.defaults.report_path);
    let report = load_report(&path)
        .map_err(|e| eyre!("cannot read report at {}: {e}. Run `jobagent run` first.", path.display()))?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &Report) {
    let generated = report.timestamp.with_timezone(&chrono::Local);
    println!();
    println!("  Report generated {}", generated.format("%Y-%m-%d %H:%M:%S"));
    println!();
    println!("  Summary:");
    for line in report.summary.lines() {
        println!("    {line}");
    }
    print_jobs("Matched", &report.matched_jobs);
    print_jobs("Other", &report.other_jobs);
    println!();
}

fn print_jobs(label: &str, jobs: &[MatchResult]) {
    println!();
    println!("  {label} ({}):", jobs.len());
    for (i, job) in jobs.iter().enumerate() {
        println!("    {}. {} | {} [{}]", i + 1, job.title, job.company, job.source);
        if !job.url.is_empty() {
            println!("       {}", job.url);
        }
        if !job.reason.is_empty() {
            println!("       {}", job.reason);
        }
    }
}

async fn cmd_history(config_path: Option<&Path>, limit: usize) -> Result<()> {
    let config = load(config_path)?;
    let path = db_path(&config);
    if !path.exists() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    let storage = Storage::open_readonly(&path).await?;
    let runs = storage.list_runs(limit).await?;
    if runs.is_empty() {
        println!("No runs recorded yet.");
        return Ok(());
    }

    println!("{:<28} {:<10} {:>8} {:>6}  {}", "STARTED", "STATUS", "MATCHED", "OTHER", "KEYWORD");
    for run in runs {
        let stats: Option<serde_json::Value> = run
            .stats_json
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok());
        let count = |key: &str| {
            stats
                .as_ref()
                .and_then(|v| v.get(key))
                .and_then(serde_json::Value::as_u64)
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".into())
        };
        println!(
            "{:<28} {:<10} {:>8} {:>6}  {}",
            run.started_at,
            run.status.as_deref().unwrap_or("running"),
            count("matched"),
            count("other"),
            run.keyword,
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(path) if path.exists() => {
            return Err(eyre!("config file already exists at {}", path.display()));
        }
        Some(path) => init_config_at(path)?,
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from(["jobagent", "run", "--keyword", "后端", "--send", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Run { keyword, send } => {
                assert_eq!(keyword.as_deref(), Some("后端"));
                assert!(send);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn parses_global_config_after_subcommand() {
        let cli = Cli::try_parse_from(["jobagent", "history", "--limit", "3", "--config", "/tmp/j.toml"])
            .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/j.toml")));
        assert!(matches!(cli.command, Command::History { limit: 3 }));
    }

    #[test]
    fn config_init_refuses_to_overwrite() {
        let dir = std::env::temp_dir().join(format!("jobagent-cli-test-{}", uuid::Uuid::now_v7()));
        let path = dir.join("jobagent.toml");
        cmd_config_init(Some(&path)).unwrap();
        assert!(cmd_config_init(Some(&path)).is_err());
        assert!(load_config_from(&path).is_ok());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
