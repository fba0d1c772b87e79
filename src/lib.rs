//! Perp Runner Library
//!
//! Lifecycle coordination for perpetual-futures bot runs: start a position
//! through the exchange gateway, monitor it from a per-run background task,
//! broadcast live PnL snapshots, and unwind on expiry or explicit stop.

pub mod agents;
pub mod config;
pub mod error;
pub mod gateway;
pub mod hub;
pub mod metrics;
pub mod paper;
pub mod runner;
pub mod snapshots;
pub mod store;
pub mod tasks;
pub mod types;

// Re-export main types for convenience
pub use agents::{select_agent, AgentDirectory};
pub use config::Config;
pub use error::{GatewayError, Result, RunnerError};
pub use gateway::{
    CredentialVault, ExchangeCredentials, ExchangeGateway, GatewayFactory, GatewayResult,
};
pub use hub::{SnapshotHub, SnapshotStream};
pub use metrics::MetricsRegistry;
pub use paper::{PaperExchange, PlaintextVault};
pub use runner::{RunManager, DEFAULT_POLL_INTERVAL};
pub use snapshots::SnapshotService;
pub use store::{AuditLog, RunStore, RunUpdate};
pub use tasks::{MonitorExit, MonitorRegistry};
pub use types::{
    AgentRecord, AuditEvent, Overview, PositionReading, RunRecord, RunStatus, Snapshot,
    SnapshotUpdate, StartRequest, StopOutcome,
};
