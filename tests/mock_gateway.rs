//! Mocked exchange gateway for lifecycle tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::json;

use perp_runner::{
    ExchangeCredentials, ExchangeGateway, GatewayError, GatewayFactory, GatewayResult,
    PositionReading,
};

/// Shared mock exchange: records every call and fails on demand
pub struct MockExchange {
    calls: Arc<Mutex<Vec<String>>>,
    fail_order: Arc<AtomicBool>,
    fail_unwind: Arc<AtomicBool>,
    fail_poll: Arc<AtomicBool>,
    position: Arc<Mutex<PositionReading>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_order: Arc::new(AtomicBool::new(false)),
            fail_unwind: Arc::new(AtomicBool::new(false)),
            fail_poll: Arc::new(AtomicBool::new(false)),
            position: Arc::new(Mutex::new(PositionReading {
                position_notional: Decimal::new(100, 0),
                entry_price: Decimal::new(65_000, 0),
                mark_price: Decimal::new(65_100, 0),
                realized_pnl: Decimal::ZERO,
                unrealized_pnl: Decimal::new(2, 0),
            })),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_named(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(name))
            .count()
    }

    pub fn set_fail_order(&self, fail: bool) {
        self.fail_order.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_unwind(&self, fail: bool) {
        self.fail_unwind.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_poll(&self, fail: bool) {
        self.fail_poll.store(fail, Ordering::SeqCst);
    }

    pub fn set_mark_price(&self, mark_price: Decimal) {
        self.position.lock().unwrap().mark_price = mark_price;
    }
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayFactory for MockExchange {
    fn open(&self, _credentials: ExchangeCredentials) -> Box<dyn ExchangeGateway> {
        Box::new(MockGateway {
            calls: Arc::clone(&self.calls),
            fail_order: Arc::clone(&self.fail_order),
            fail_unwind: Arc::clone(&self.fail_unwind),
            fail_poll: Arc::clone(&self.fail_poll),
            position: Arc::clone(&self.position),
        })
    }
}

struct MockGateway {
    calls: Arc<Mutex<Vec<String>>>,
    fail_order: Arc<AtomicBool>,
    fail_unwind: Arc<AtomicBool>,
    fail_poll: Arc<AtomicBool>,
    position: Arc<Mutex<PositionReading>>,
}

impl MockGateway {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn reject(&self, action: &str) -> GatewayError {
        GatewayError::new(action, json!({ "status": "err", "response": "mock rejection" }))
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn set_leverage(&self, market: &str, leverage: u32) -> GatewayResult<()> {
        self.record(format!("set_leverage {} {}", market, leverage));
        Ok(())
    }

    async fn place_market_order(&self, market: &str, usd_notional: Decimal) -> GatewayResult<()> {
        self.record(format!("place_market_order {} {}", market, usd_notional));
        if self.fail_order.load(Ordering::SeqCst) {
            return Err(self.reject("place_market_order"));
        }
        Ok(())
    }

    async fn cancel_open_orders(&self, market: &str) -> GatewayResult<()> {
        self.record(format!("cancel_open_orders {}", market));
        if self.fail_unwind.load(Ordering::SeqCst) {
            return Err(self.reject("cancel_open_orders"));
        }
        Ok(())
    }

    async fn close_position(&self, market: &str) -> GatewayResult<()> {
        self.record(format!("close_position {}", market));
        if self.fail_unwind.load(Ordering::SeqCst) {
            return Err(self.reject("close_position"));
        }
        Ok(())
    }

    async fn get_position(&self, market: &str) -> GatewayResult<PositionReading> {
        self.record(format!("get_position {}", market));
        if self.fail_poll.load(Ordering::SeqCst) {
            return Err(self.reject("get_position"));
        }
        Ok(self.position.lock().unwrap().clone())
    }

    async fn usd_transfer(&self, destination: &str, amount: Decimal) -> GatewayResult<()> {
        self.record(format!("usd_transfer {} {}", destination, amount));
        Ok(())
    }

    async fn spot_transfer(
        &self,
        coin: &str,
        destination: &str,
        amount: Decimal,
    ) -> GatewayResult<()> {
        self.record(format!("spot_transfer {} {} {}", coin, destination, amount));
        Ok(())
    }

    async fn close(&self) {
        self.record("close".to_string());
    }
}
