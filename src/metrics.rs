//! Minimal in-process counter registry for observability

use std::collections::HashMap;
use std::sync::Mutex;

/// Named monotonic counters behind a single lock
#[derive(Default)]
pub struct MetricsRegistry {
    counters: Mutex<HashMap<String, u64>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, value: u64) {
        let mut counters = self.counters.lock().expect("metrics lock poisoned");
        *counters.entry(name.to_string()).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .lock()
            .expect("metrics lock poisoned")
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters.lock().expect("metrics lock poisoned").clone()
    }

    pub fn reset(&self) {
        self.counters.lock().expect("metrics lock poisoned").clear();
    }
}
