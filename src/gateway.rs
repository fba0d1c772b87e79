//! Exchange gateway seam - signing credentials and abstract exchange actions
//!
//! The concrete exchange client lives outside this crate. The coordinator
//! only depends on these traits: a factory that binds decrypted credentials
//! at construction, and the action surface itself. Implementations must be
//! fail-fast; retry policy is not layered in here.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::{GatewayError, Result};
use crate::types::{AgentRecord, PositionReading};

/// Decrypted agent credentials needed for signing exchange actions
#[derive(Debug, Clone)]
pub struct ExchangeCredentials {
    /// Agent (signing) address
    pub address: String,
    /// Decrypted private key
    pub private_key: String,
    /// Master account the agent acts for, when different from the signer
    pub account_address: Option<String>,
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Abstract exchange-action capability, credentials bound at construction
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Update isolated leverage for a perpetual market.
    async fn set_leverage(&self, market: &str, leverage: u32) -> GatewayResult<()>;

    /// Submit a market order sized by USD notional.
    async fn place_market_order(&self, market: &str, usd_notional: Decimal) -> GatewayResult<()>;

    /// Cancel all resting orders for a market.
    async fn cancel_open_orders(&self, market: &str) -> GatewayResult<()>;

    /// Close the open position for a market.
    async fn close_position(&self, market: &str) -> GatewayResult<()>;

    /// Read back live position and mark-price data.
    async fn get_position(&self, market: &str) -> GatewayResult<PositionReading>;

    /// Send USD to another address.
    async fn usd_transfer(&self, destination: &str, amount: Decimal) -> GatewayResult<()>;

    /// Send a spot asset to another address.
    async fn spot_transfer(&self, coin: &str, destination: &str, amount: Decimal)
        -> GatewayResult<()>;

    /// Release any held connection resources. Callers invoke this on every
    /// exit path, including after a rejection.
    async fn close(&self);
}

/// Constructs gateway instances for a set of credentials
pub trait GatewayFactory: Send + Sync {
    fn open(&self, credentials: ExchangeCredentials) -> Box<dyn ExchangeGateway>;
}

/// Decrypts an agent's stored key cipher
///
/// Encryption-at-rest is owned by the credential collaborator; the
/// coordinator only needs the plaintext key for the duration of a call.
pub trait CredentialVault: Send + Sync {
    fn decrypt(&self, agent: &AgentRecord) -> Result<String>;
}
