//! Error taxonomy for run lifecycle operations

use serde_json::Value;
use thiserror::Error;

use crate::types::RunStatus;

/// Structured rejection reported by the exchange gateway.
///
/// Carries the action name and the raw rejection payload so callers can
/// audit-log the exact exchange response.
#[derive(Debug, Clone, Error)]
#[error("exchange rejected '{action}': {payload}")]
pub struct GatewayError {
    /// Gateway action that was rejected (e.g. `place_market_order`)
    pub action: String,
    /// Raw rejection payload as returned by the exchange
    pub payload: Value,
}

impl GatewayError {
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }
}

/// Error types for run lifecycle operations
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("wallet not connected")]
    WalletNotConnected,

    #[error("no agent wallet registered")]
    NoAgentRegistered,

    #[error("agent {agent_address} already assigned to an active run")]
    AgentBusy { agent_address: String },

    #[error("run {run_id} not found")]
    NotFound { run_id: String },

    #[error("run {run_id} is not active (status: {status})")]
    InvalidState { run_id: String, status: RunStatus },

    #[error("agent wallet {agent_address} unavailable")]
    AgentUnavailable { agent_address: String },

    #[error("no snapshot registered for run {run_id}")]
    SnapshotNotRegistered { run_id: String },

    #[error("unable to decrypt agent key: {0}")]
    Credential(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Result type for run lifecycle operations
pub type Result<T> = std::result::Result<T, RunnerError>;
