//! Paper trading gateway - simulated fills for offline runs
//!
//! Backs the paper runner binary with an in-memory exchange: market orders
//! fill instantly at a synthetic entry price and the mark price drifts a few
//! basis points per poll.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::Result;
use crate::gateway::{
    CredentialVault, ExchangeCredentials, ExchangeGateway, GatewayFactory, GatewayResult,
};
use crate::types::{AgentRecord, PositionReading};

#[derive(Debug, Clone)]
struct PaperPosition {
    notional: Decimal,
    entry_price: Decimal,
    mark_price: Decimal,
}

/// Shared simulated exchange state; every opened gateway sees the same book
pub struct PaperExchange {
    book: Arc<Mutex<HashMap<String, PaperPosition>>>,
}

impl PaperExchange {
    pub fn new() -> Self {
        Self {
            book: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn base_price(market: &str) -> Decimal {
        match market.split('-').next().unwrap_or(market) {
            "BTC" => Decimal::new(65_000, 0),
            "ETH" => Decimal::new(3_000, 0),
            "SOL" => Decimal::new(150, 0),
            _ => Decimal::new(100, 0),
        }
    }
}

impl Default for PaperExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayFactory for PaperExchange {
    fn open(&self, credentials: ExchangeCredentials) -> Box<dyn ExchangeGateway> {
        Box::new(PaperGateway {
            book: Arc::clone(&self.book),
            signer: credentials.address,
        })
    }
}

struct PaperGateway {
    book: Arc<Mutex<HashMap<String, PaperPosition>>>,
    signer: String,
}

#[async_trait]
impl ExchangeGateway for PaperGateway {
    async fn set_leverage(&self, market: &str, leverage: u32) -> GatewayResult<()> {
        debug!(market, leverage, signer = %self.signer, "paper leverage set");
        Ok(())
    }

    async fn place_market_order(&self, market: &str, usd_notional: Decimal) -> GatewayResult<()> {
        let entry_price = PaperExchange::base_price(market);
        self.book.lock().expect("paper book poisoned").insert(
            market.to_string(),
            PaperPosition {
                notional: usd_notional,
                entry_price,
                mark_price: entry_price,
            },
        );
        info!(market, %usd_notional, %entry_price, "paper market order filled");
        Ok(())
    }

    async fn cancel_open_orders(&self, market: &str) -> GatewayResult<()> {
        debug!(market, "paper open orders cancelled");
        Ok(())
    }

    async fn close_position(&self, market: &str) -> GatewayResult<()> {
        let removed = self
            .book
            .lock()
            .expect("paper book poisoned")
            .remove(market);
        info!(market, had_position = removed.is_some(), "paper position closed");
        Ok(())
    }

    async fn get_position(&self, market: &str) -> GatewayResult<PositionReading> {
        let mut book = self.book.lock().expect("paper book poisoned");
        let Some(position) = book.get_mut(market) else {
            return Ok(PositionReading::default());
        };
        // Drift the mark price by up to +/-50 bps per poll.
        let bps: i64 = rand::thread_rng().gen_range(-50..=50);
        position.mark_price *= Decimal::ONE + Decimal::new(bps, 4);

        let unrealized_pnl = if position.entry_price.is_zero() {
            Decimal::ZERO
        } else {
            position.notional * (position.mark_price - position.entry_price)
                / position.entry_price
        };
        Ok(PositionReading {
            position_notional: position.notional,
            entry_price: position.entry_price,
            mark_price: position.mark_price,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl,
        })
    }

    async fn usd_transfer(&self, destination: &str, amount: Decimal) -> GatewayResult<()> {
        info!(destination, %amount, "paper usd transfer");
        Ok(())
    }

    async fn spot_transfer(
        &self,
        coin: &str,
        destination: &str,
        amount: Decimal,
    ) -> GatewayResult<()> {
        info!(coin, destination, %amount, "paper spot transfer");
        Ok(())
    }

    async fn close(&self) {}
}

/// Vault that stores keys unencrypted, for paper runs and tests only
pub struct PlaintextVault;

impl CredentialVault for PlaintextVault {
    fn decrypt(&self, agent: &AgentRecord) -> Result<String> {
        Ok(agent.key_cipher.clone())
    }
}
