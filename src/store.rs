//! File-backed run records and append-only audit log
//!
//! The run store is a single JSON array rewritten wholesale on every
//! mutation. It is deliberately not transactional: this process is the only
//! writer, and the coordinator serializes writers per run (one monitor task
//! xor one start/stop handler at a time).

use std::io::ErrorKind;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::Result;
use crate::types::{AuditEvent, RunRecord, RunStatus};

/// Partial field set merged into a stored run record
#[derive(Debug, Clone, Default)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub closed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub auto_closed: Option<bool>,
}

impl RunUpdate {
    fn apply(&self, record: &mut RunRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(closed_at) = self.closed_at {
            record.closed_at = Some(closed_at);
        }
        if let Some(completed_at) = self.completed_at {
            record.completed_at = Some(completed_at);
        }
        if let Some(auto_closed) = self.auto_closed {
            record.auto_closed = Some(auto_closed);
        }
    }
}

/// Durable log of run records, keyed by run_id
pub struct RunStore {
    path: PathBuf,
}

impl RunStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Full read. A missing file is an empty collection, never an error.
    pub async fn load_runs(&self) -> Result<Vec<RunRecord>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        Ok(self
            .load_runs()
            .await?
            .into_iter()
            .find(|record| record.run_id == run_id))
    }

    pub async fn append_run(&self, record: &RunRecord) -> Result<()> {
        let mut runs = self.load_runs().await?;
        runs.push(record.clone());
        self.write_runs(&runs).await
    }

    /// Merge `update` into the matching record. Returns `false` (and writes
    /// nothing) when the run_id is unknown.
    pub async fn update_run(&self, run_id: &str, update: RunUpdate) -> Result<bool> {
        let mut runs = self.load_runs().await?;
        let Some(record) = runs.iter_mut().find(|record| record.run_id == run_id) else {
            debug!(run_id, "update for unknown run ignored");
            return Ok(false);
        };
        update.apply(record);
        self.write_runs(&runs).await?;
        Ok(true)
    }

    async fn write_runs(&self, runs: &[RunRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(runs)?).await?;
        Ok(())
    }
}

/// Append-only newline-delimited JSON audit log
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub async fn append(&self, event: &AuditEvent) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        Ok(())
    }

    /// Read every parseable entry; malformed lines are skipped.
    pub async fn read_all(&self) -> Result<Vec<AuditEvent>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    fn record(run_id: &str) -> RunRecord {
        RunRecord {
            run_id: run_id.to_string(),
            market: "BTC-PERP".to_string(),
            usd_notional: Decimal::new(100, 0),
            leverage: 2,
            wallet_address: "0xwallet".to_string(),
            agent_address: "0xagent".to_string(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            duration_minutes: 10.0,
            closed_at: None,
            completed_at: None,
            auto_closed: None,
        }
    }

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let store = RunStore::new(dir.path().join("runs.json"));
        assert!(store.load_runs().await.unwrap().is_empty());
        assert!(store.get_run("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn append_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = RunStore::new(dir.path().join("runs.json"));

        store.append_run(&record("run-1")).await.unwrap();
        store.append_run(&record("run-2")).await.unwrap();

        let loaded = store.get_run("run-2").await.unwrap().unwrap();
        assert_eq!(loaded.market, "BTC-PERP");
        assert_eq!(store.load_runs().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_merges_fields_in_place() {
        let dir = tempdir().unwrap();
        let store = RunStore::new(dir.path().join("runs.json"));
        store.append_run(&record("run-1")).await.unwrap();

        let closed_at = Utc::now();
        let changed = store
            .update_run(
                "run-1",
                RunUpdate {
                    status: Some(RunStatus::Closed),
                    closed_at: Some(closed_at),
                    auto_closed: Some(true),
                    ..RunUpdate::default()
                },
            )
            .await
            .unwrap();
        assert!(changed);

        let updated = store.get_run("run-1").await.unwrap().unwrap();
        assert_eq!(updated.status, RunStatus::Closed);
        assert_eq!(updated.closed_at, Some(closed_at));
        assert_eq!(updated.auto_closed, Some(true));
        // untouched fields survive the merge
        assert_eq!(updated.leverage, 2);
    }

    #[tokio::test]
    async fn update_unknown_run_is_a_noop() {
        let dir = tempdir().unwrap();
        let store = RunStore::new(dir.path().join("runs.json"));
        store.append_run(&record("run-1")).await.unwrap();

        let changed = store
            .update_run("missing", RunUpdate::default())
            .await
            .unwrap();
        assert!(!changed);
        assert_eq!(store.load_runs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn audit_log_appends_and_reads_back() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit_log.jsonl"));
        assert!(log.read_all().await.unwrap().is_empty());

        let mut event = AuditEvent::new("bot_started");
        event.run_id = Some("run-1".to_string());
        log.append(&event).await.unwrap();
        log.append(&AuditEvent::new("bot_stopped")).await.unwrap();

        let entries = log.read_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "bot_started");
        assert_eq!(entries[0].run_id.as_deref(), Some("run-1"));
    }
}
