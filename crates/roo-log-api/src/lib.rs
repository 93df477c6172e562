use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use roo_log_core::{ChainRecord, ContentAuthority, LogSnapshot, PruneReport, VerifiedLog};
use roo_log_store_sqlite::{SchemaStatus, SqliteStore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const API_CONTRACT_VERSION: &str = "api.v1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrateResult {
    pub dry_run: bool,
    pub current_version: i64,
    pub target_version: i64,
    pub would_apply_versions: Vec<i64>,
    pub after_version: Option<i64>,
    pub up_to_date: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddGoodRequest {
    pub thread_id: String,
    pub comment_id: String,
    pub comment_url: String,
    pub submission_url: String,
    pub submission_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShowResult {
    pub index: usize,
    pub good: Option<ChainRecord>,
    pub submitted: Option<String>,
    pub good_len: usize,
    pub raw_len: usize,
    pub saved_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerifyResult {
    pub report: PruneReport,
    pub good_len: usize,
    pub raw_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportResult {
    pub path: String,
    pub digest: String,
    pub good: usize,
    pub raw: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportResult {
    pub good: usize,
    pub raw: usize,
    pub evicted: usize,
}

/// Process-facing facade over the log core and its store. Every operation
/// opens the store, migrates, applies one change, and persists the result;
/// the surrounding bot drives these sequentially from a single caller.
#[derive(Debug, Clone)]
pub struct RooLogApi {
    db_path: PathBuf,
}

impl RooLogApi {
    #[must_use]
    pub fn new(db_path: PathBuf) -> Self {
        Self { db_path }
    }

    fn open_store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.db_path)
    }

    fn open_migrated(&self) -> Result<SqliteStore> {
        let mut store = self.open_store()?;
        store.migrate()?;
        Ok(store)
    }

    /// Inspect schema status without mutating data.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or queried.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        let store = self.open_store()?;
        store.schema_status()
    }

    /// Apply pending migrations, or return planned versions for dry-run mode.
    ///
    /// # Errors
    /// Returns an error when migration planning or execution fails.
    pub fn migrate(&self, dry_run: bool) -> Result<MigrateResult> {
        let mut store = self.open_store()?;
        let before = store.schema_status()?;
        if dry_run {
            return Ok(MigrateResult {
                dry_run: true,
                current_version: before.current_version,
                target_version: before.target_version,
                would_apply_versions: before.pending_versions,
                after_version: None,
                up_to_date: None,
            });
        }

        let planned_versions = before.pending_versions;
        store.migrate()?;
        let after = store.schema_status()?;
        Ok(MigrateResult {
            dry_run: false,
            current_version: before.current_version,
            target_version: before.target_version,
            would_apply_versions: planned_versions,
            after_version: Some(after.current_version),
            up_to_date: Some(after.pending_versions.is_empty()),
        })
    }

    /// Record one verified chain step at the head of the `good` lane.
    ///
    /// # Errors
    /// Returns an error when persistence fails.
    pub fn add_good(&self, input: AddGoodRequest) -> Result<ChainRecord> {
        let mut store = self.open_migrated()?;
        let mut log = load_or_empty(&store)?;

        let record = ChainRecord::new(
            input.thread_id,
            input.comment_id,
            input.comment_url,
            input.submission_url,
            input.submission_id,
        );
        log.add_good(record.clone());
        store.save_log(&log.save())?;
        Ok(record)
    }

    /// Record one observed submission URL at the head of the `raw` lane.
    ///
    /// # Errors
    /// Returns an error when persistence fails.
    pub fn add_last(&self, submission_url: String) -> Result<String> {
        let mut store = self.open_migrated()?;
        let mut log = load_or_empty(&store)?;

        log.add_last(submission_url.clone());
        store.save_log(&log.save())?;
        Ok(submission_url)
    }

    /// Read both lane heads (or a deeper position) without mutating the log.
    ///
    /// # Errors
    /// Returns an error when `index` is out of range on a non-empty lane, or
    /// when the store cannot be read.
    pub fn show(&self, index: usize) -> Result<ShowResult> {
        let store = self.open_migrated()?;
        let log = load_or_empty(&store)?;

        let good = log.last_good(index)?.cloned();
        let submitted = log.last_submitted(index)?.map(str::to_string);

        Ok(ShowResult {
            index,
            good,
            submitted,
            good_len: log.len_good(),
            raw_len: log.len_raw(),
            saved_at: store.last_saved_at()?,
        })
    }

    /// Run the head-freshness pass against `authority` and persist the
    /// pruned log. Lookup failures are swallowed into pruning decisions and
    /// never fail the surrounding bot loop.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read or written.
    pub fn verify_head(&self, authority: &dyn ContentAuthority) -> Result<VerifyResult> {
        let mut store = self.open_migrated()?;
        let mut log = load_or_empty(&store)?;

        let report = log.verify(authority);
        store.save_log(&log.save())?;

        if report.total() > 0 {
            tracing::info!(
                good_removed = report.good_removed,
                raw_removed = report.raw_removed,
                "head verification pruned stale entries"
            );
        }

        Ok(VerifyResult { report, good_len: log.len_good(), raw_len: log.len_raw() })
    }

    /// Run the tail-anchor pass against `authority` and persist the pruned
    /// log. A lookup failure aborts the pass without persisting anything,
    /// since it means the fallback anchor could not be confirmed.
    ///
    /// # Errors
    /// Returns an error when a lookup fails mid-pass or the store cannot be
    /// read or written.
    pub fn verify_settled(&self, authority: &dyn ContentAuthority) -> Result<VerifyResult> {
        let mut store = self.open_migrated()?;
        let mut log = load_or_empty(&store)?;

        match log.verify_settled(authority) {
            Ok(report) => {
                store.save_log(&log.save())?;
                if report.total() > 0 {
                    tracing::info!(
                        good_removed = report.good_removed,
                        raw_removed = report.raw_removed,
                        "tail anchor verification pruned unsettled entries"
                    );
                }
                Ok(VerifyResult { report, good_len: log.len_good(), raw_len: log.len_raw() })
            }
            Err(err) => {
                tracing::warn!(error = %err, "tail anchor could not be confirmed");
                Err(err.into())
            }
        }
    }

    /// Write the current snapshot to `out` as JSON and report its digest.
    ///
    /// # Errors
    /// Returns an error when the store cannot be read or the file cannot be
    /// written.
    pub fn export_snapshot(&self, out: &Path) -> Result<ExportResult> {
        let store = self.open_migrated()?;
        let log = load_or_empty(&store)?;
        let snapshot = log.save();

        let body = serde_json::to_string_pretty(&snapshot)
            .context("failed to serialize snapshot")?;
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create parent directory for {}", out.display())
            })?;
        }
        fs::write(out, &body)
            .with_context(|| format!("failed to write snapshot to {}", out.display()))?;

        Ok(ExportResult {
            path: out.display().to_string(),
            digest: sha256_digest(body.as_bytes()),
            good: snapshot.good.len(),
            raw: snapshot.raw.len(),
        })
    }

    /// Replace the stored log with the snapshot read from `input`. With
    /// `enforce_limit`, oversized lanes in externally-edited snapshots are
    /// evicted back down to the bound before saving.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read or parsed, or when
    /// persistence fails.
    pub fn import_snapshot(&self, input: &Path, enforce_limit: bool) -> Result<ImportResult> {
        let body = fs::read_to_string(input)
            .with_context(|| format!("failed to read snapshot from {}", input.display()))?;
        let snapshot: LogSnapshot = serde_json::from_str(&body)
            .with_context(|| format!("failed to parse snapshot from {}", input.display()))?;

        let imported = snapshot.good.len() + snapshot.raw.len();
        let mut log = VerifiedLog::restore(snapshot);
        if enforce_limit {
            log.evict_excess();
        }
        let evicted = imported - (log.len_good() + log.len_raw());

        let mut store = self.open_migrated()?;
        store.save_log(&log.save())?;

        Ok(ImportResult { good: log.len_good(), raw: log.len_raw(), evicted })
    }
}

fn load_or_empty(store: &SqliteStore) -> Result<VerifiedLog> {
    Ok(store.load_log()?.map(VerifiedLog::restore).unwrap_or_default())
}

fn sha256_digest(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    let digest = hasher.finalize();
    format!("sha256:{digest:x}")
}
