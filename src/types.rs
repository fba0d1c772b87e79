//! Core types for bot runs, snapshots, and audit records

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RunnerError};

/// Inclusive leverage bounds accepted by the exchange
pub const MIN_LEVERAGE: u32 = 1;
pub const MAX_LEVERAGE: u32 = 50;

/// Longest run duration a caller may request
pub const MAX_DURATION_MINUTES: f64 = 240.0;

/// Default run duration when the caller does not pick one
pub const DEFAULT_DURATION_MINUTES: f64 = 15.0;

/// Lifecycle status of a bot run
///
/// `completed` is the legacy placeholder terminal state; `closed` means the
/// exchange-side position was actively unwound (explicit stop or auto-close).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Starting,
    Running,
    Completed,
    Cancelled,
    Failed,
    Closed,
}

impl RunStatus {
    /// Terminal statuses never transition again; the nonce guard only
    /// blocks agents attached to non-terminal runs.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Cancelled | RunStatus::Failed | RunStatus::Closed
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Starting => write!(f, "starting"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Input payload for starting a bot run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub market: String,
    pub usd_notional: Decimal,
    pub leverage: u32,
    pub duration_minutes: f64,
}

impl StartRequest {
    pub fn new(market: &str, usd_notional: Decimal, leverage: u32) -> Self {
        Self {
            market: market.to_string(),
            usd_notional,
            leverage,
            duration_minutes: DEFAULT_DURATION_MINUTES,
        }
    }

    pub fn with_duration(mut self, duration_minutes: f64) -> Self {
        self.duration_minutes = duration_minutes;
        self
    }

    /// Validate and normalize the request before any side effect.
    pub fn validate(mut self) -> Result<Self> {
        self.market = self.market.trim().to_uppercase();
        if self.market.len() < 3 || self.market.len() > 32 {
            return Err(RunnerError::InvalidRequest(format!(
                "market symbol '{}' must be 3..=32 characters",
                self.market
            )));
        }
        if self.usd_notional <= Decimal::ZERO {
            return Err(RunnerError::InvalidRequest(
                "usd_notional must be positive".to_string(),
            ));
        }
        if !(MIN_LEVERAGE..=MAX_LEVERAGE).contains(&self.leverage) {
            return Err(RunnerError::InvalidRequest(format!(
                "leverage must be between {} and {}",
                MIN_LEVERAGE, MAX_LEVERAGE
            )));
        }
        if self.duration_minutes <= 0.0 || self.duration_minutes > MAX_DURATION_MINUTES {
            return Err(RunnerError::InvalidRequest(format!(
                "duration_minutes must be in (0, {}]",
                MAX_DURATION_MINUTES
            )));
        }
        Ok(self)
    }
}

/// Persisted record of one trading session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub market: String,
    pub usd_notional: Decimal,
    pub leverage: u32,
    pub wallet_address: String,
    pub agent_address: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_closed: Option<bool>,
}

impl RunRecord {
    /// Moment the run should be auto-closed, derived from start + duration.
    pub fn end_at(&self) -> DateTime<Utc> {
        self.started_at + Duration::milliseconds((self.duration_minutes * 60_000.0).round() as i64)
    }
}

/// Identifying fields returned by a successful stop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopOutcome {
    pub run_id: String,
    pub market: String,
    pub status: RunStatus,
    pub closed_at: DateTime<Utc>,
}

/// Live position data read back from the exchange
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PositionReading {
    pub position_notional: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
}

/// Point-in-time view of a run's live financials and status
///
/// Revisions are immutable; every update produces a fresh value with a new
/// timestamp and the hub keeps only the latest one per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub market: String,
    pub status: RunStatus,
    pub position_notional: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
}

impl Snapshot {
    pub fn total_pnl(&self) -> Decimal {
        self.realized_pnl + self.unrealized_pnl
    }
}

/// Partial field set applied over the previous snapshot revision
#[derive(Debug, Clone, Default)]
pub struct SnapshotUpdate {
    pub status: Option<RunStatus>,
    pub position_notional: Option<Decimal>,
    pub entry_price: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
    pub unrealized_pnl: Option<Decimal>,
}

impl SnapshotUpdate {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn from_position(position: &PositionReading) -> Self {
        Self {
            status: None,
            position_notional: Some(position.position_notional),
            entry_price: Some(position.entry_price),
            mark_price: Some(position.mark_price),
            realized_pnl: Some(position.realized_pnl),
            unrealized_pnl: Some(position.unrealized_pnl),
        }
    }

    /// Merge the supplied fields over `snapshot`, leaving the rest untouched.
    pub fn apply(&self, snapshot: &mut Snapshot) {
        if let Some(status) = self.status {
            snapshot.status = status;
        }
        if let Some(value) = self.position_notional {
            snapshot.position_notional = value;
        }
        if let Some(value) = self.entry_price {
            snapshot.entry_price = value;
        }
        if let Some(value) = self.mark_price {
            snapshot.mark_price = value;
        }
        if let Some(value) = self.realized_pnl {
            snapshot.realized_pnl = value;
        }
        if let Some(value) = self.unrealized_pnl {
            snapshot.unrealized_pnl = value;
        }
    }
}

/// Stored metadata for a delegated signing agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_address: String,
    pub wallet_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Encrypted private key; decryption is delegated to the vault seam
    pub key_cipher: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<DateTime<Utc>>,
}

/// Append-only audit record, one JSON object per line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub ts: f64,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_address: Option<String>,
}

impl AuditEvent {
    pub fn new(action: &str) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            ts: Utc::now().timestamp_millis() as f64 / 1000.0,
            action: action.to_string(),
            run_id: None,
            market: None,
            wallet_address: None,
            agent_address: None,
        }
    }
}

/// Read-only aggregation for dashboards
#[derive(Debug, Clone, Serialize)]
pub struct Overview {
    pub recent_runs: Vec<RunRecord>,
    pub metrics: HashMap<String, u64>,
    pub agent_count: usize,
    pub active_runs: usize,
    pub total_runs: usize,
}
