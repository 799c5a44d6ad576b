//! SQL migration definitions for the job agent database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: raw_cache, runs",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Raw adapter output, keyed by source and query hash
CREATE TABLE IF NOT EXISTS raw_cache (
    source       TEXT NOT NULL,
    cache_key    TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    record_count INTEGER NOT NULL,
    fetched_at   TEXT NOT NULL,
    PRIMARY KEY (source, cache_key)
);

-- Pipeline run history
CREATE TABLE IF NOT EXISTS runs (
    id          TEXT PRIMARY KEY,
    keyword     TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    status      TEXT,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Index raw_cache by age for pruning",
            sql: r#"
CREATE INDEX IF NOT EXISTS idx_raw_cache_fetched_at ON raw_cache(fetched_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
