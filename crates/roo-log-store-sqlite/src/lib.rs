use std::path::Path;

use anyhow::{anyhow, Context, Result};
use roo_log_core::{ChainRecord, LogSnapshot};
use rusqlite::{params, Connection, DatabaseName, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS good_roos (
  position INTEGER PRIMARY KEY,
  thread_id TEXT NOT NULL,
  comment_id TEXT NOT NULL,
  comment_url TEXT NOT NULL,
  submission_url TEXT NOT NULL,
  submission_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS raw_roos (
  position INTEGER PRIMARY KEY,
  submission_url TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS log_meta (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  saved_at TEXT NOT NULL
);
";

/// SQLite-backed persistence for one current log snapshot. Position 0 in each
/// table is the newest entry of the corresponding lane.
pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

impl SqliteStore {
    /// Open a SQLite-backed log store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas cannot
    /// be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported schema version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any migration step
    /// fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version == 0 {
            self.conn
                .execute_batch(MIGRATION_001_SQL)
                .context("failed to apply migration version 1")?;
            record_schema_version(&self.conn, 1)?;
            version = 1;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Replace the stored snapshot with `snapshot` and stamp `saved_at`.
    ///
    /// # Errors
    /// Returns an error when any write in the transaction fails.
    pub fn save_log(&mut self, snapshot: &LogSnapshot) -> Result<()> {
        let tx = self.conn.transaction().context("failed to start save transaction")?;

        tx.execute("DELETE FROM good_roos", [])
            .context("failed to clear good_roos")?;
        tx.execute("DELETE FROM raw_roos", []).context("failed to clear raw_roos")?;

        for (position, record) in snapshot.good.iter().enumerate() {
            tx.execute(
                "INSERT INTO good_roos(
                    position, thread_id, comment_id, comment_url, submission_url, submission_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    position_param(position)?,
                    record.thread_id,
                    record.comment_id,
                    record.comment_url,
                    record.submission_url,
                    record.submission_id,
                ],
            )
            .context("failed to insert good lane row")?;
        }

        for (position, url) in snapshot.raw.iter().enumerate() {
            tx.execute(
                "INSERT INTO raw_roos(position, submission_url) VALUES (?1, ?2)",
                params![position_param(position)?, url],
            )
            .context("failed to insert raw lane row")?;
        }

        tx.execute(
            "INSERT INTO log_meta(id, saved_at) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET saved_at = excluded.saved_at",
            params![now_rfc3339()?],
        )
        .context("failed to stamp saved_at")?;

        tx.commit().context("failed to commit save transaction")?;
        Ok(())
    }

    /// Load the stored snapshot, or `None` when nothing was ever saved.
    ///
    /// # Errors
    /// Returns an error when rows cannot be read from `SQLite`.
    pub fn load_log(&self) -> Result<Option<LogSnapshot>> {
        if self.last_saved_at()?.is_none() {
            return Ok(None);
        }

        let mut stmt = self.conn.prepare(
            "SELECT thread_id, comment_id, comment_url, submission_url, submission_id
             FROM good_roos
             ORDER BY position ASC",
        )?;
        let good = stmt
            .query_map([], |row| {
                Ok(ChainRecord::new(
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to read good lane rows")?;

        let mut stmt = self
            .conn
            .prepare("SELECT submission_url FROM raw_roos ORDER BY position ASC")?;
        let raw = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to read raw lane rows")?;

        Ok(Some(LogSnapshot { good, raw }))
    }

    /// RFC 3339 timestamp of the last successful save, if any.
    ///
    /// # Errors
    /// Returns an error when the metadata row cannot be read.
    pub fn last_saved_at(&self) -> Result<Option<String>> {
        let value = self
            .conn
            .prepare("SELECT saved_at FROM log_meta WHERE id = 1")?
            .query_row([], |row| row.get::<_, String>(0))
            .optional()
            .context("failed to read saved_at")?;
        Ok(value)
    }

    /// Create a `SQLite` backup file of the current main database.
    ///
    /// # Errors
    /// Returns an error when backup directories cannot be created or backup
    /// fails.
    pub fn backup_database(&self, out_file: &Path) -> Result<()> {
        if let Some(parent) = out_file.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory for backup file {}", out_file.display())
            })?;
        }

        self.conn
            .backup(DatabaseName::Main, out_file, None)
            .with_context(|| format!("failed to create sqlite backup at {}", out_file.display()))
    }

    /// Restore this database from a `SQLite` backup file, then migrate to
    /// latest.
    ///
    /// # Errors
    /// Returns an error when the backup file is missing, restore fails, or
    /// migrations fail.
    pub fn restore_database(&mut self, in_file: &Path) -> Result<()> {
        if !in_file.exists() {
            return Err(anyhow!("backup file does not exist: {}", in_file.display()));
        }

        self.conn
            .restore(DatabaseName::Main, in_file, None::<fn(rusqlite::backup::Progress)>)
            .with_context(|| {
                format!("failed to restore sqlite backup from {}", in_file.display())
            })?;
        self.migrate()
    }
}

fn position_param(position: usize) -> Result<i64> {
    i64::try_from(position).context("lane position does not fit in an sqlite integer")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .prepare("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")?
        .query_row([], |row| row.get::<_, i64>(0))
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now_rfc3339()?],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).context("failed to format current timestamp")
}
