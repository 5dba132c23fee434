use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickvault_domain::error::SyncError;
use tickvault_domain::repositories::bar_store::{BarStore, TickerCoverage, UpsertOutcome};
use tickvault_domain::value_objects::bar::{format_date, ChartBar};

type BarKey = (String, String);

/// `BarStore` kept in process memory. Used by the `memory` backend and by
/// tests, which can slow down or fail writes on demand.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBarStore {
    rows: Arc<Mutex<BTreeMap<BarKey, ChartBar>>>,
    upsert_calls: Arc<AtomicUsize>,
    write_delay: Option<Duration>,
    failure: Arc<Mutex<Option<String>>>,
}

impl InMemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write sleeps for `delay` before touching the rows.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Makes every following write fail with `message`; `None` heals it.
    pub fn fail_writes(&self, message: Option<&str>) {
        *self.failure.lock() = message.map(str::to_string);
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn rows_for(&self, ticker: &str) -> Vec<ChartBar> {
        self.rows
            .lock()
            .values()
            .filter(|bar| bar.ticker == ticker)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BarStore for InMemoryBarStore {
    async fn read_range(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ChartBar>, SyncError> {
        let from = (ticker.to_string(), format_date(start));
        let to = (ticker.to_string(), format_date(end));
        let rows = self.rows.lock();
        Ok(rows.range(from..=to).map(|(_, bar)| bar.clone()).collect())
    }

    async fn bulk_conditional_upsert(&self, bars: &[ChartBar]) -> Result<UpsertOutcome, SyncError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failure.lock().clone();
        if let Some(message) = failure {
            return Err(SyncError::Store(message));
        }

        let mut rows = self.rows.lock();
        let mut outcome = UpsertOutcome::default();
        for bar in bars {
            let key = (bar.ticker.clone(), bar.dt_string.clone());
            match rows.get(&key) {
                Some(existing) if existing.same_values(bar) => {}
                _ => {
                    rows.insert(key, bar.clone());
                    outcome.rows_changed += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn coverage(&self) -> Result<Vec<TickerCoverage>, SyncError> {
        let rows = self.rows.lock();
        let mut coverage: BTreeMap<&str, TickerCoverage> = BTreeMap::new();
        for bar in rows.values() {
            let entry = coverage
                .entry(bar.ticker.as_str())
                .or_insert_with(|| TickerCoverage {
                    ticker: bar.ticker.clone(),
                    rows: 0,
                    last: None,
                });
            entry.rows += 1;
            entry.last = entry.last.max(Some(bar.timestamp));
        }
        Ok(coverage.into_values().collect())
    }
}
