//! Terminal progress reporting.

use indicatif::{ProgressBar, ProgressStyle};

use jobagent_core::{ProgressReporter, RunSummary, SourceStat};

/// CLI progress reporter using an indicatif spinner.
pub(crate) struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    /// Clear the spinner whether or not the run completed.
    pub(crate) fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn source_done(&self, stat: &SourceStat) {
        let status = match (&stat.error, stat.cached) {
            (Some(_), _) => "failed".to_string(),
            (None, true) => format!("{} records (cached)", stat.records),
            (None, false) => format!("{} records", stat.records),
        };
        self.spinner.println(format!("  {:<20} {status}", stat.name));
    }

    fn chunk_done(&self, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Matching postings [{current}/{total}]"));
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
