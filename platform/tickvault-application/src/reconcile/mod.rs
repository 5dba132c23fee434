//! Periodic driver that drains pending jobs through fetch, normalize and upsert.

use crate::cache::CoalescingCache;
use crate::ledger::JobLedger;
use crate::ticks::TickBook;
use crate::upsert::IdempotentUpsert;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tickvault_domain::error::SyncError;
use tickvault_domain::repositories::providers::{ChartProvider, FetchWindow, QuoteProvider};
use tickvault_domain::value_objects::bar::{ChartBar, ChartPayload};
use tickvault_domain::value_objects::job::{JobCounts, JobKey, JobStatus, UpdateKind};
use tickvault_domain::value_objects::tick::{Quote, Tick};
use tracing::Instrument;

pub type ChartCache = CoalescingCache<ChartPayload, SyncError>;
pub type QuoteCache = CoalescingCache<Quote, SyncError>;

pub const FULL_HISTORY_YEARS: i32 = 5;
pub const PARTIAL_LOOKBACK_DAYS: i64 = 7;

/// Only transient provider failures are worth suppressing for a while;
/// malformed payloads are retried on the next tick.
pub fn is_cacheable_provider_error(err: &SyncError) -> bool {
    err.is_transient()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Clone)]
struct QuoteSource {
    provider: Arc<dyn QuoteProvider>,
    cache: QuoteCache,
}

#[derive(Clone)]
pub struct Reconciler {
    ledger: JobLedger,
    chart_provider: Arc<dyn ChartProvider>,
    chart_cache: ChartCache,
    quotes: Option<QuoteSource>,
    upsert: IdempotentUpsert,
    ticks: TickBook,
}

impl Reconciler {
    pub fn new(
        ledger: JobLedger,
        chart_provider: Arc<dyn ChartProvider>,
        chart_cache: ChartCache,
        upsert: IdempotentUpsert,
        ticks: TickBook,
    ) -> Self {
        Self {
            ledger,
            chart_provider,
            chart_cache,
            quotes: None,
            upsert,
            ticks,
        }
    }

    /// Enables `Live` jobs.
    pub fn with_quotes(mut self, provider: Arc<dyn QuoteProvider>, cache: QuoteCache) -> Self {
        self.quotes = Some(QuoteSource { provider, cache });
        self
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    pub fn ticks(&self) -> &TickBook {
        &self.ticks
    }

    pub fn chart_cache(&self) -> &ChartCache {
        &self.chart_cache
    }

    /// One pass over the ledger. Every pending job ends as `Completed` or
    /// `Failed`; a failing job never stops the others.
    pub async fn tick(&self) -> TickReport {
        let span = tracing::info_span!("reconcile.tick");
        async {
            let today = Utc::now().date_naive();
            let mut report = TickReport::default();

            for (key, entry) in self.ledger.all_jobs() {
                if entry.status != JobStatus::Pending || !self.ledger.claim(&key) {
                    continue;
                }
                report.claimed += 1;

                match self.run_job(&key, entry.timestamp, today).await {
                    Ok(rows_changed) => {
                        report.completed += 1;
                        self.ledger
                            .set_status(&key.ticker, key.kind, JobStatus::Completed);
                        metrics::counter!(
                            "tickvault.reconcile.jobs_total",
                            "kind" => key.kind.as_str(),
                            "result" => "completed"
                        )
                        .increment(1);
                        tracing::info!(job = %key, rows_changed, "job completed");
                    }
                    Err(err) => {
                        report.failed += 1;
                        self.ledger.set_status(&key.ticker, key.kind, JobStatus::Failed);
                        metrics::counter!(
                            "tickvault.reconcile.jobs_total",
                            "kind" => key.kind.as_str(),
                            "result" => "failed"
                        )
                        .increment(1);
                        tracing::warn!(job = %key, error_kind = err.kind(), error = %err, "job failed");
                    }
                }
            }

            if report.claimed > 0 {
                tracing::debug!(
                    claimed = report.claimed,
                    completed = report.completed,
                    failed = report.failed,
                    "reconcile tick finished"
                );
            }
            report
        }
        .instrument(span)
        .await
    }

    /// Logs and returns the ledger totals.
    pub fn heartbeat(&self) -> JobCounts {
        let counts = self.ledger.counts();
        metrics::gauge!("tickvault.jobs.pending").set(counts.pending as f64);
        metrics::gauge!("tickvault.jobs.running").set(counts.running as f64);
        tracing::info!(
            total = counts.total,
            pending = counts.pending,
            running = counts.running,
            completed = counts.completed,
            failed = counts.failed,
            cached_charts = self.chart_cache.len(),
            live_ticks = self.ticks.len(),
            "heartbeat"
        );
        counts
    }

    async fn run_job(
        &self,
        key: &JobKey,
        requested_at: DateTime<Utc>,
        today: NaiveDate,
    ) -> Result<u64, SyncError> {
        if key.kind == UpdateKind::Live {
            self.refresh_quote(&key.ticker).await?;
            return Ok(0);
        }

        let window = fetch_window(key.kind, requested_at.date_naive(), today)?;
        let payload = self.fetch_chart(&key.ticker, window).await?;
        if let Some(live) = payload.live.clone() {
            self.ticks.set(Tick {
                ticker: key.ticker.clone(),
                ..live
            });
        }

        let bars = normalize_payload(&key.ticker, &payload);
        if bars.is_empty() {
            return Err(SyncError::EmptyResult {
                ticker: key.ticker.clone(),
            });
        }

        let outcome = self.upsert.upsert(bars).await?;
        Ok(outcome.rows_changed)
    }

    async fn fetch_chart(&self, ticker: &str, window: FetchWindow) -> Result<ChartPayload, SyncError> {
        let provider = Arc::clone(&self.chart_provider);
        let owned = ticker.to_string();
        self.chart_cache
            .get_or_fetch(&window.cache_key(ticker), move || async move {
                provider.fetch_chart(&owned, &window).await
            })
            .await
    }

    async fn refresh_quote(&self, ticker: &str) -> Result<(), SyncError> {
        let Some(quotes) = &self.quotes else {
            return Err(SyncError::InvalidInput(format!(
                "no quote provider configured for live job {ticker}"
            )));
        };
        let provider = Arc::clone(&quotes.provider);
        let owned = ticker.to_string();
        let quote = quotes
            .cache
            .get_or_fetch(ticker, move || async move { provider.fetch_quote(&owned).await })
            .await?;
        self.ticks.set(quote.to_tick());
        Ok(())
    }
}

/// `Full` covers Jan 1st five years before the job date; `Partial` the last
/// week before it. Both end today.
pub fn fetch_window(
    kind: UpdateKind,
    job_date: NaiveDate,
    today: NaiveDate,
) -> Result<FetchWindow, SyncError> {
    let start = match kind {
        UpdateKind::Full => NaiveDate::from_ymd_opt(job_date.year() - FULL_HISTORY_YEARS, 1, 1)
            .ok_or_else(|| SyncError::InvalidInput(format!("no history start for {job_date}")))?,
        UpdateKind::Partial => job_date - Duration::days(PARTIAL_LOOKBACK_DAYS),
        UpdateKind::Live => {
            return Err(SyncError::InvalidInput(
                "live jobs have no chart window".to_string(),
            ))
        }
    };
    FetchWindow::new(start.min(today), today).map_err(SyncError::InvalidInput)
}

/// Turns provider rows into storable bars keyed by `ticker`, the symbol the
/// job asked for, whatever spelling the provider echoed back. Rows without a
/// usable close are dropped; other missing prices fall back to the close and
/// missing volume to zero. Prices are rounded to four decimals.
pub fn normalize_payload(ticker: &str, payload: &ChartPayload) -> Vec<ChartBar> {
    payload
        .rows
        .iter()
        .filter_map(|row| {
            let close = row.close.filter(|c| c.is_finite() && *c != 0.0)?;
            let or_close = |value: Option<f64>| round4(value.filter(|v| v.is_finite()).unwrap_or(close));
            Some(ChartBar {
                ticker: ticker.to_string(),
                dt_string: row.timestamp.date_naive().format("%Y-%m-%d").to_string(),
                open_trade: or_close(row.open),
                high: or_close(row.high),
                low: or_close(row.low),
                unadj_close: round4(close),
                volume: row.volume.unwrap_or(0),
                adj_close: or_close(row.adj_close),
                timestamp: row.timestamp,
                source: payload.source,
            })
        })
        .collect()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
