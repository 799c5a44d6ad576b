//! Report persistence.
//!
//! The report is written to a temp file beside the target and renamed over
//! it, so a reader sees either the previous report or the complete new one.

use std::path::Path;

use tracing::{debug, info, instrument};

use jobagent_shared::{JobAgentError, Report, Result};

/// Write `report` to `path` atomically, creating the parent directory.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn write_report(path: &Path, report: &Report) -> Result<()> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| JobAgentError::validation(format!("JSON serialization failed: {e}")))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(|e| JobAgentError::io(dir, e))?;

    let file_name = path
        .file_name()
        .ok_or_else(|| JobAgentError::validation(format!("not a file path: {}", path.display())))?
        .to_string_lossy();
    let temp = dir.join(format!(".{file_name}.{}.tmp", uuid::Uuid::now_v7()));

    if let Err(e) = std::fs::write(&temp, &json) {
        let _ = std::fs::remove_file(&temp);
        return Err(JobAgentError::io(&temp, e));
    }
    if let Err(e) = std::fs::rename(&temp, path) {
        let _ = std::fs::remove_file(&temp);
        return Err(JobAgentError::io(path, e));
    }

    debug!(bytes = json.len(), "wrote report");
    info!(
        matched = report.matched_jobs.len(),
        other = report.other_jobs.len(),
        "report saved"
    );
    Ok(())
}

/// Read a previously written report.
pub fn load_report(path: &Path) -> Result<Report> {
    let content = std::fs::read_to_string(path).map_err(|e| JobAgentError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| JobAgentError::validation(format!("invalid report {}: {e}", path.display())))
}
