//! Write path that folds concurrent identical-range upserts into one store call.

use crate::cache::TaskFailure;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tickvault_domain::error::SyncError;
use tickvault_domain::repositories::bar_store::{BarStore, UpsertOutcome};
use tickvault_domain::value_objects::bar::ChartBar;
use tracing::Instrument;

type SharedWrite = Shared<BoxFuture<'static, Result<UpsertOutcome, SyncError>>>;

/// Identity of a write: one ticker over one inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub ticker: String,
    pub first_date: String,
    pub last_date: String,
}

impl Fingerprint {
    /// Expects a batch already sorted by `dt_string`.
    fn of_sorted(bars: &[ChartBar]) -> Option<Self> {
        let first = bars.first()?;
        let last = bars.last()?;
        Some(Self {
            ticker: first.ticker.clone(),
            first_date: first.dt_string.clone(),
            last_date: last.dt_string.clone(),
        })
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.ticker, self.first_date, self.last_date)
    }
}

#[derive(Clone)]
pub struct IdempotentUpsert {
    store: Arc<dyn BarStore>,
    in_flight: Arc<Mutex<HashMap<Fingerprint, SharedWrite>>>,
}

impl IdempotentUpsert {
    pub fn new(store: Arc<dyn BarStore>) -> Self {
        Self {
            store,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<dyn BarStore> {
        &self.store
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub async fn upsert(&self, bars: Vec<ChartBar>) -> Result<UpsertOutcome, SyncError> {
        let bars = canonicalize_batch(bars)?;
        let Some(fingerprint) = Fingerprint::of_sorted(&bars) else {
            return Ok(UpsertOutcome::default());
        };

        let pending = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&fingerprint) {
                Some(existing) => {
                    metrics::counter!("tickvault.upsert.coalesced_total").increment(1);
                    tracing::debug!(fingerprint = %fingerprint, "joining in-flight upsert");
                    existing.clone()
                }
                None => {
                    let shared = self.settling_write(fingerprint.clone(), bars).shared();
                    in_flight.insert(fingerprint, shared.clone());
                    shared
                }
            }
        };

        pending.await
    }

    /// Spawns the store write so it lands even if every caller stops
    /// waiting. Called with the in-flight lock held.
    fn settling_write(
        &self,
        fingerprint: Fingerprint,
        bars: Vec<ChartBar>,
    ) -> BoxFuture<'static, Result<UpsertOutcome, SyncError>> {
        let store = Arc::clone(&self.store);
        let in_flight = Arc::clone(&self.in_flight);

        let write = async move {
            let mut marker = WriteMarker {
                in_flight: Arc::clone(&in_flight),
                fingerprint: fingerprint.clone(),
                armed: true,
            };
            let started = Instant::now();
            let result = store.bulk_conditional_upsert(&bars).await;
            in_flight.lock().remove(&fingerprint);
            marker.armed = false;

            metrics::histogram!("tickvault.upsert.write_ms")
                .record(started.elapsed().as_secs_f64() * 1000.0);
            match &result {
                Ok(outcome) => {
                    metrics::counter!("tickvault.upsert.writes_total", "result" => "ok")
                        .increment(1);
                    tracing::info!(
                        fingerprint = %fingerprint,
                        rows = bars.len(),
                        rows_changed = outcome.rows_changed,
                        "upserted bars"
                    );
                }
                Err(err) => {
                    metrics::counter!("tickvault.upsert.writes_total", "result" => "err")
                        .increment(1);
                    tracing::error!(fingerprint = %fingerprint, error = %err, "upsert failed");
                }
            }
            result
        };
        let handle = tokio::spawn(write.in_current_span());

        async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(error = %err, "upsert task failed");
                    Err(SyncError::from(TaskFailure::from(err)))
                }
            }
        }
        .boxed()
    }
}

/// Drops the fingerprint from the in-flight map if the write task unwinds or
/// is dropped before settling.
struct WriteMarker {
    in_flight: Arc<Mutex<HashMap<Fingerprint, SharedWrite>>>,
    fingerprint: Fingerprint,
    armed: bool,
}

impl Drop for WriteMarker {
    fn drop(&mut self) {
        if self.armed {
            self.in_flight.lock().remove(&self.fingerprint);
        }
    }
}

/// Sorts by date and keeps the last record on duplicate dates. Mixed tickers
/// are rejected before anything reaches the store.
pub fn canonicalize_batch(mut bars: Vec<ChartBar>) -> Result<Vec<ChartBar>, SyncError> {
    if let Some(first) = bars.first() {
        if let Some(other) = bars.iter().find(|bar| bar.ticker != first.ticker) {
            return Err(SyncError::InvalidInput(format!(
                "upsert batch mixes tickers {} and {}",
                first.ticker, other.ticker
            )));
        }
    }

    bars.sort_by(|a, b| a.dt_string.cmp(&b.dt_string));

    let mut canonical: Vec<ChartBar> = Vec::with_capacity(bars.len());
    for bar in bars {
        if let Some(last) = canonical.last_mut() {
            if last.dt_string == bar.dt_string {
                *last = bar;
                continue;
            }
        }
        canonical.push(bar);
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::{canonicalize_batch, Fingerprint};
    use chrono::{TimeZone, Utc};
    use tickvault_domain::error::SyncError;
    use tickvault_domain::value_objects::bar::{ChartBar, DataSource};

    fn bar(ticker: &str, date: &str, close: f64) -> ChartBar {
        ChartBar {
            ticker: ticker.to_string(),
            dt_string: date.to_string(),
            open_trade: close,
            high: close,
            low: close,
            unadj_close: close,
            volume: 100,
            adj_close: close,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 2, 14, 30, 0).unwrap(),
            source: DataSource::Yahoo,
        }
    }

    #[test]
    fn canonicalize_sorts_and_keeps_last_duplicate() {
        let bars = canonicalize_batch(vec![
            bar("AAPL", "2025-01-03", 3.0),
            bar("AAPL", "2025-01-02", 1.0),
            bar("AAPL", "2025-01-02", 2.0),
        ])
        .unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].dt_string, "2025-01-02");
        assert_eq!(bars[0].unadj_close, 2.0);
        assert_eq!(bars[1].dt_string, "2025-01-03");
    }

    #[test]
    fn canonicalize_rejects_mixed_tickers() {
        let err = canonicalize_batch(vec![
            bar("AAPL", "2025-01-02", 1.0),
            bar("MSFT", "2025-01-02", 1.0),
        ])
        .unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput(_)));
    }

    #[test]
    fn fingerprint_spans_first_and_last_date() {
        let bars = canonicalize_batch(vec![
            bar("AAPL", "2025-01-09", 1.0),
            bar("AAPL", "2025-01-02", 1.0),
            bar("AAPL", "2025-01-05", 1.0),
        ])
        .unwrap();
        let fingerprint = Fingerprint::of_sorted(&bars).unwrap();
        assert_eq!(fingerprint.to_string(), "AAPL:2025-01-02:2025-01-09");
        assert!(Fingerprint::of_sorted(&[]).is_none());
    }
}
