//! Runtime configuration from environment variables

use std::path::PathBuf;
use std::time::Duration;

const TESTNET_REST: &str = "https://api.hyperliquid-testnet.xyz";
const MAINNET_REST: &str = "https://api.hyperliquid.xyz";

const DEFAULT_STORAGE_DIR: &str = ".perp-runner/storage";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Runtime configuration sourced from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding runs.json, agents.json, and the audit log
    pub storage_dir: PathBuf,
    /// Exchange REST endpoint handed to the real gateway implementation
    pub rest_base: String,
    /// Pause between monitor ticks
    pub poll_interval: Duration,
}

impl Config {
    /// Load from environment:
    /// - `STORAGE_DIR` - storage directory (default: ~/.perp-runner/storage)
    /// - `HL_ENV` - `prod` selects the mainnet endpoint (default: testnet)
    /// - `HL_REST_BASE` - explicit endpoint override
    /// - `POLL_INTERVAL_SECS` - monitor tick interval (default: 5)
    pub fn from_env() -> Self {
        let storage_dir = std::env::var("STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(DEFAULT_STORAGE_DIR)
            });

        let rest_base = std::env::var("HL_REST_BASE").unwrap_or_else(|_| {
            match std::env::var("HL_ENV").as_deref() {
                Ok("prod") => MAINNET_REST.to_string(),
                _ => TESTNET_REST.to_string(),
            }
        });

        let poll_interval = std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|value| value.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));

        Self {
            storage_dir,
            rest_base,
            poll_interval,
        }
    }

    pub fn runs_path(&self) -> PathBuf {
        self.storage_dir.join("runs.json")
    }

    pub fn agents_path(&self) -> PathBuf {
        self.storage_dir.join("agents.json")
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.storage_dir.join("audit_log.jsonl")
    }
}
