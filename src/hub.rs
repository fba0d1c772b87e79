//! Snapshot hub - in-memory fan-out of run snapshots to subscribers

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::types::Snapshot;

struct Subscriber {
    /// `None` listens to every run
    run_id: Option<String>,
    tx: UnboundedSender<Snapshot>,
}

impl Subscriber {
    fn accepts(&self, snapshot: &Snapshot) -> bool {
        match &self.run_id {
            None => true,
            Some(run_id) => run_id == &snapshot.run_id,
        }
    }
}

#[derive(Default)]
struct HubInner {
    subscribers: Vec<Subscriber>,
    latest: HashMap<String, Snapshot>,
}

/// Broadcasts snapshots to interested subscribers and keeps the latest
/// revision per run for point lookups and subscriber catch-up.
///
/// A single mutex guards both the subscriber list and the latest map; the
/// fan-out writes happen outside the lock so a slow consumer cannot block
/// registration. Channels are unbounded, so delivery is FIFO per subscriber
/// and never suspends the publisher.
pub struct SnapshotHub {
    inner: Mutex<HubInner>,
}

impl SnapshotHub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner::default()),
        }
    }

    /// Store `snapshot` as the latest for its run and deliver it to every
    /// subscriber whose filter accepts it.
    pub fn publish(&self, snapshot: Snapshot) {
        let targets: Vec<UnboundedSender<Snapshot>> = {
            let mut inner = self.inner.lock().expect("hub lock poisoned");
            inner
                .latest
                .insert(snapshot.run_id.clone(), snapshot.clone());
            inner
                .subscribers
                .iter()
                .filter(|subscriber| subscriber.accepts(&snapshot))
                .map(|subscriber| subscriber.tx.clone())
                .collect()
        };

        let mut dropped = false;
        for tx in targets {
            if tx.send(snapshot.clone()).is_err() {
                dropped = true;
            }
        }
        if dropped {
            let mut inner = self.inner.lock().expect("hub lock poisoned");
            let before = inner.subscribers.len();
            inner.subscribers.retain(|s| !s.tx.is_closed());
            debug!(
                pruned = before - inner.subscribers.len(),
                "removed disconnected hub subscribers"
            );
        }
    }

    /// Subscribe to snapshots for one run, or all runs when `run_id` is
    /// `None`. Currently-known matching snapshots are delivered first as a
    /// catch-up burst, then live updates. The stream ends only when the hub
    /// is reset or dropped; stop consuming to unsubscribe.
    pub fn listen(&self, run_id: Option<&str>) -> SnapshotStream {
        let (tx, rx) = unbounded_channel();
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        // Catch-up is queued while still holding the lock so a concurrent
        // publish cannot be observed before the backlog.
        match run_id {
            None => {
                for snapshot in inner.latest.values() {
                    let _ = tx.send(snapshot.clone());
                }
            }
            Some(run_id) => {
                if let Some(snapshot) = inner.latest.get(run_id) {
                    let _ = tx.send(snapshot.clone());
                }
            }
        }
        inner.subscribers.push(Subscriber {
            run_id: run_id.map(str::to_string),
            tx,
        });
        SnapshotStream { rx }
    }

    /// Last known snapshot for a run, if any.
    pub fn latest(&self, run_id: &str) -> Option<Snapshot> {
        self.inner
            .lock()
            .expect("hub lock poisoned")
            .latest
            .get(run_id)
            .cloned()
    }

    /// Last known snapshots for all runs (unordered).
    pub fn list_snapshots(&self) -> Vec<Snapshot> {
        self.inner
            .lock()
            .expect("hub lock poisoned")
            .latest
            .values()
            .cloned()
            .collect()
    }

    /// Clear all stored snapshots and subscribers. Existing streams end.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("hub lock poisoned");
        inner.latest.clear();
        inner.subscribers.clear();
    }
}

impl Default for SnapshotHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Live sequence of snapshots handed out by [`SnapshotHub::listen`]
pub struct SnapshotStream {
    rx: UnboundedReceiver<Snapshot>,
}

impl SnapshotStream {
    /// Next snapshot, or `None` once the hub has dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Non-blocking read of an already-delivered snapshot.
    pub fn try_recv(&mut self) -> Option<Snapshot> {
        self.rx.try_recv().ok()
    }
}
