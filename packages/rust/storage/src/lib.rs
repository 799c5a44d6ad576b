//! libSQL storage layer (local file, offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding the optional raw
//! source cache and the pipeline run history. Individual postings and reports
//! are never stored here; the report file is the only cross-run artifact the
//! pipeline guarantees.

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use jobagent_shared::{JobAgentError, RawRecord, Result};
use libsql::{Connection, Database, params};
use serde::Serialize;
use uuid::Uuid;

/// File name of the database inside the data directory.
pub const DB_FILE_NAME: &str = "jobagent.db";

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    NoData,
    Cancelled,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NoData => "no_data",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of run history.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub keyword: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    /// `None` while the run is in progress (or if the process died mid-run).
    pub status: Option<String>,
    pub stats_json: Option<String>,
}

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JobAgentError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| JobAgentError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| JobAgentError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for reading only (`history`, `report`).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(JobAgentError::Storage(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| JobAgentError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| JobAgentError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    JobAgentError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(JobAgentError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Raw cache
    // -----------------------------------------------------------------------

    /// Cached records for `(source, cache_key)` if fetched within `max_age`.
    pub async fn get_raw_cache(
        &self,
        source: &str,
        cache_key: &str,
        max_age: Duration,
    ) -> Result<Option<Vec<RawRecord>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT payload_json, fetched_at FROM raw_cache
                 WHERE source = ?1 AND cache_key = ?2",
                params![source, cache_key],
            )
            .await
            .map_err(|e| JobAgentError::Storage(e.to_string()))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(JobAgentError::Storage(e.to_string())),
        };

        let payload: String = row
            .get(0)
            .map_err(|e| JobAgentError::Storage(e.to_string()))?;
        let fetched_at: String = row
            .get(1)
            .map_err(|e| JobAgentError::Storage(e.to_string()))?;

        if !is_fresh(&fetched_at, max_age) {
            tracing::debug!(source, "raw cache entry expired");
            return Ok(None);
        }

        let records: Vec<RawRecord> = serde_json::from_str(&payload)
            .map_err(|e| JobAgentError::Storage(format!("corrupt raw cache payload: {e}")))?;
        Ok(Some(records))
    }

    /// Store records for `(source, cache_key)`, replacing any previous entry.
    pub async fn put_raw_cache(
        &self,
        source: &str,
        cache_key: &str,
        records: &[RawRecord],
    ) -> Result<()> {
        self.check_writable()?;
        let payload = serde_json::to_string(records)
            .map_err(|e| JobAgentError::Storage(e.to_string()))?;
        let now = timestamp(Utc::now());
        self.conn
            .execute(
                "INSERT INTO raw_cache (source, cache_key, payload_json, record_count, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(source, cache_key) DO UPDATE SET
                   payload_json = excluded.payload_json,
                   record_count = excluded.record_count,
                   fetched_at = excluded.fetched_at",
                params![source, cache_key, payload.as_str(), records.len() as i64, now.as_str()],
            )
            .await
            .map_err(|e| JobAgentError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete cache entries older than `max_age`. Returns the number removed.
    pub async fn prune_raw_cache(&self, max_age: Duration) -> Result<u64> {
        self.check_writable()?;
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let cutoff = timestamp(cutoff);
        self.conn
            .execute(
                "DELETE FROM raw_cache WHERE fetched_at < ?1",
                params![cutoff.as_str()],
            )
            .await
            .map_err(|e| JobAgentError::Storage(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Run history
    // -----------------------------------------------------------------------

    /// Record the start of a run. Returns the generated run ID.
    pub async fn insert_run(&self, keyword: &str) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = timestamp(Utc::now());
        self.conn
            .execute(
                "INSERT INTO runs (id, keyword, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), keyword, now.as_str()],
            )
            .await
            .map_err(|e| JobAgentError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Mark a run finished with its final status and stats.
    pub async fn finish_run(&self, run_id: &str, status: RunStatus, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = timestamp(Utc::now());
        self.conn
            .execute(
                "UPDATE runs SET finished_at = ?1, status = ?2, stats_json = ?3 WHERE id = ?4",
                params![now.as_str(), status.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| JobAgentError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, keyword, started_at, finished_at, status, stats_json
                 FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| JobAgentError::Storage(e.to_string()))?;

        let mut runs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            runs.push(row_to_run(&row)?);
        }
        Ok(runs)
    }
}

fn row_to_run(row: &libsql::Row) -> Result<RunRecord> {
    let storage_err = |e: libsql::Error| JobAgentError::Storage(e.to_string());
    Ok(RunRecord {
        id: row.get(0).map_err(storage_err)?,
        keyword: row.get(1).map_err(storage_err)?,
        started_at: row.get(2).map_err(storage_err)?,
        finished_at: row.get(3).map_err(storage_err)?,
        status: row.get(4).map_err(storage_err)?,
        stats_json: row.get(5).map_err(storage_err)?,
    })
}

/// Fixed-width UTC timestamps so stored values compare correctly as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn is_fresh(fetched_at: &str, max_age: Duration) -> bool {
    let Ok(fetched) = DateTime::parse_from_rfc3339(fetched_at) else {
        return false;
    };
    let age = Utc::now().signed_duration_since(fetched.with_timezone(&Utc));
    match age.to_std() {
        Ok(age) => age <= max_age,
        // Timestamp in the future: clock skew, treat as fresh.
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("jobagent_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn records() -> Vec<RawRecord> {
        vec![
            RawRecord::new().with("title", "Rust Engineer").with("url", "https://x.com/1"),
            serde_json::from_value(json!({"title": "Go Engineer", "salary": 30000})).unwrap(),
        ]
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("jobagent_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn raw_cache_roundtrip() {
        let storage = test_storage().await;

        let miss = storage
            .get_raw_cache("givemeoc.com", "k1", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(miss.is_none());

        storage.put_raw_cache("givemeoc.com", "k1", &records()).await.unwrap();

        let hit = storage
            .get_raw_cache("givemeoc.com", "k1", Duration::from_secs(3600))
            .await
            .unwrap()
            .expect("cache hit");
        assert_eq!(hit, records());

        // Different source, same key: miss.
        let other = storage
            .get_raw_cache("rss feeds", "k1", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn raw_cache_put_replaces() {
        let storage = test_storage().await;
        storage.put_raw_cache("s", "k", &records()).await.unwrap();
        storage.put_raw_cache("s", "k", &records()[..1]).await.unwrap();

        let hit = storage
            .get_raw_cache("s", "k", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.len(), 1);
    }

    #[tokio::test]
    async fn raw_cache_expires() {
        let storage = test_storage().await;
        storage.put_raw_cache("s", "k", &records()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let expired = storage
            .get_raw_cache("s", "k", Duration::from_millis(1))
            .await
            .unwrap();
        assert!(expired.is_none());

        let removed = storage.prune_raw_cache(Duration::from_millis(1)).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn run_lifecycle() {
        let storage = test_storage().await;

        let first = storage.insert_run("工程师").await.expect("insert run");
        storage
            .finish_run(&first, RunStatus::Completed, r#"{"postings": 15}"#)
            .await
            .expect("finish run");

        let second = storage.insert_run("rust").await.unwrap();

        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second);
        assert!(runs[0].status.is_none());
        assert_eq!(runs[1].keyword, "工程师");
        assert_eq!(runs[1].status.as_deref(), Some("completed"));
        assert!(runs[1].finished_at.is_some());

        let limited = storage.list_runs(1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("jobagent_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_run("kw").await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_runs(5).await.unwrap().len(), 1);
        let result = ro.insert_run("kw2").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }

    #[tokio::test]
    async fn readonly_missing_file_fails() {
        let tmp = std::env::temp_dir().join(format!("jobagent_missing_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }

    #[test]
    fn status_strings() {
        assert_eq!(RunStatus::NoData.to_string(), "no_data");
        assert_eq!(RunStatus::Cancelled.as_str(), "cancelled");
    }
}
