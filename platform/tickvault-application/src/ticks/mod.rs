use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tickvault_domain::value_objects::tick::Tick;

/// Latest live mark per ticker.
#[derive(Clone, Default)]
pub struct TickBook {
    ticks: Arc<RwLock<HashMap<String, Tick>>>,
}

impl TickBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Older snapshots never replace a newer one.
    pub fn set(&self, tick: Tick) {
        let mut ticks = self.ticks.write();
        match ticks.get(&tick.ticker) {
            Some(current) if current.timestamp > tick.timestamp => {}
            _ => {
                ticks.insert(tick.ticker.clone(), tick);
            }
        }
    }

    pub fn get(&self, ticker: &str) -> Option<Tick> {
        self.ticks.read().get(ticker).cloned()
    }

    /// Every tick, sorted by ticker.
    pub fn all(&self) -> Vec<Tick> {
        let mut ticks: Vec<Tick> = self.ticks.read().values().cloned().collect();
        ticks.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        ticks
    }

    pub fn len(&self) -> usize {
        self.ticks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
