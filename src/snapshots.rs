//! Snapshot service - copy-on-write snapshot revisions per run

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rust_decimal::Decimal;

use crate::error::{Result, RunnerError};
use crate::hub::SnapshotHub;
use crate::types::{RunRecord, RunStatus, Snapshot, SnapshotUpdate};

/// Owns per-run snapshot state and republishes every revision through the hub
///
/// The internal lock is released before the hub publish so the two locks are
/// never held together.
pub struct SnapshotService {
    hub: Arc<SnapshotHub>,
    contexts: Mutex<HashMap<String, Snapshot>>,
}

impl SnapshotService {
    pub fn new(hub: Arc<SnapshotHub>) -> Self {
        Self {
            hub,
            contexts: Mutex::new(HashMap::new()),
        }
    }

    pub fn hub(&self) -> &Arc<SnapshotHub> {
        &self.hub
    }

    /// Build and publish the initial snapshot for a freshly started run.
    /// Position notional starts at the ordered notional; prices and PnL are
    /// zero until the first poll comes back.
    pub fn register_run(&self, record: &RunRecord) -> Snapshot {
        let snapshot = Snapshot {
            run_id: record.run_id.clone(),
            timestamp: Utc::now(),
            market: record.market.clone(),
            status: record.status,
            position_notional: record.usd_notional,
            entry_price: Decimal::ZERO,
            mark_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        };
        self.contexts
            .lock()
            .expect("snapshot lock poisoned")
            .insert(record.run_id.clone(), snapshot.clone());
        self.hub.publish(snapshot.clone());
        snapshot
    }

    /// Apply the supplied fields over the previous revision, stamp a fresh
    /// timestamp, store and publish the result.
    pub fn update_snapshot(&self, run_id: &str, update: SnapshotUpdate) -> Result<Snapshot> {
        let snapshot = {
            let mut contexts = self.contexts.lock().expect("snapshot lock poisoned");
            let current =
                contexts
                    .get_mut(run_id)
                    .ok_or_else(|| RunnerError::SnapshotNotRegistered {
                        run_id: run_id.to_string(),
                    })?;
            let mut next = current.clone();
            update.apply(&mut next);
            next.timestamp = Utc::now();
            *current = next.clone();
            next
        };
        self.hub.publish(snapshot.clone());
        Ok(snapshot)
    }

    /// Shorthand for a status-only revision.
    pub fn mark_status(&self, run_id: &str, status: RunStatus) -> Result<Snapshot> {
        self.update_snapshot(run_id, SnapshotUpdate::status(status))
    }

    pub fn get_snapshot(&self, run_id: &str) -> Option<Snapshot> {
        self.contexts
            .lock()
            .expect("snapshot lock poisoned")
            .get(run_id)
            .cloned()
    }

    pub fn list_snapshots(&self) -> Vec<Snapshot> {
        self.contexts
            .lock()
            .expect("snapshot lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(run_id: &str) -> RunRecord {
        RunRecord {
            run_id: run_id.to_string(),
            market: "ETH-PERP".to_string(),
            usd_notional: Decimal::new(150, 0),
            leverage: 3,
            wallet_address: "0xwallet".to_string(),
            agent_address: "0xagent".to_string(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            duration_minutes: 15.0,
            closed_at: None,
            completed_at: None,
            auto_closed: None,
        }
    }

    fn service() -> SnapshotService {
        SnapshotService::new(Arc::new(SnapshotHub::new()))
    }

    #[tokio::test]
    async fn register_publishes_initial_snapshot() {
        let service = service();
        let snapshot = service.register_run(&record("run-1"));

        assert_eq!(snapshot.status, RunStatus::Running);
        assert_eq!(snapshot.position_notional, Decimal::new(150, 0));
        assert_eq!(snapshot.entry_price, Decimal::ZERO);
        assert_eq!(
            service.hub().latest("run-1").unwrap().run_id,
            snapshot.run_id
        );
    }

    #[tokio::test]
    async fn update_is_partial_and_recomputes_total_pnl() {
        let service = service();
        service.register_run(&record("run-1"));

        service
            .update_snapshot(
                "run-1",
                SnapshotUpdate {
                    realized_pnl: Some(Decimal::new(3, 0)),
                    unrealized_pnl: Some(Decimal::new(4, 0)),
                    ..SnapshotUpdate::default()
                },
            )
            .unwrap();

        let updated = service
            .update_snapshot(
                "run-1",
                SnapshotUpdate {
                    mark_price: Some(Decimal::new(3_000, 0)),
                    ..SnapshotUpdate::default()
                },
            )
            .unwrap();

        // Fields outside the update survive the revision.
        assert_eq!(updated.realized_pnl, Decimal::new(3, 0));
        assert_eq!(updated.unrealized_pnl, Decimal::new(4, 0));
        assert_eq!(updated.total_pnl(), Decimal::new(7, 0));
        assert_eq!(updated.mark_price, Decimal::new(3_000, 0));
    }

    #[tokio::test]
    async fn update_unknown_run_is_an_error() {
        let service = service();
        let err = service
            .update_snapshot("missing", SnapshotUpdate::default())
            .unwrap_err();
        assert!(matches!(err, RunnerError::SnapshotNotRegistered { .. }));
    }

    #[tokio::test]
    async fn mark_status_publishes_new_revision() {
        let service = service();
        service.register_run(&record("run-1"));
        let mut stream = service.hub().listen(Some("run-1"));
        // catch-up burst first
        assert_eq!(stream.recv().await.unwrap().status, RunStatus::Running);

        service.mark_status("run-1", RunStatus::Closed).unwrap();
        assert_eq!(stream.recv().await.unwrap().status, RunStatus::Closed);
        assert_eq!(
            service.get_snapshot("run-1").unwrap().status,
            RunStatus::Closed
        );
    }
}
