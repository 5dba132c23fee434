//! Read path: serves stored bars and enqueues a job when they are missing or
//! behind. Never waits for the job itself.

use crate::ledger::JobLedger;
use crate::ticks::TickBook;
use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tickvault_domain::error::SyncError;
use tickvault_domain::repositories::bar_store::{BarStore, TickerCoverage};
use tickvault_domain::value_objects::bar::{parse_date, ChartBar};
use tickvault_domain::value_objects::job::UpdateKind;
use tickvault_domain::value_objects::tick::Tick;
use tickvault_domain::value_objects::ticker::validate_ticker;

const DEFAULT_HISTORY_YEARS: i32 = 5;
const MOST_STALE_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRead {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub bars: Vec<ChartBar>,
    /// Job kind queued by this read, if the data was missing or stale.
    pub enqueued: Option<UpdateKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseStatus {
    pub tickers: usize,
    pub most_stale: Vec<TickerCoverage>,
}

#[derive(Clone)]
pub struct ChartQueryService {
    store: Arc<dyn BarStore>,
    ledger: JobLedger,
    ticks: TickBook,
}

impl ChartQueryService {
    pub fn new(store: Arc<dyn BarStore>, ledger: JobLedger, ticks: TickBook) -> Self {
        Self {
            store,
            ledger,
            ticks,
        }
    }

    pub async fn chart_data(
        &self,
        ticker: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<ChartRead, SyncError> {
        self.chart_data_as_of(ticker, start, end, Utc::now().date_naive())
            .await
    }

    /// Same as [`ChartQueryService::chart_data`] with an explicit "today".
    pub async fn chart_data_as_of(
        &self,
        ticker: &str,
        start: Option<&str>,
        end: Option<&str>,
        today: NaiveDate,
    ) -> Result<ChartRead, SyncError> {
        validate_ticker(ticker).map_err(SyncError::InvalidInput)?;

        let start = match start {
            Some(value) => parse_date(value).map_err(SyncError::InvalidInput)?,
            None => NaiveDate::from_ymd_opt(today.year() - DEFAULT_HISTORY_YEARS, 1, 1)
                .ok_or_else(|| SyncError::InvalidInput(format!("no default start for {today}")))?,
        };
        let end = match end {
            Some(value) => parse_date(value).map_err(SyncError::InvalidInput)?,
            None => today,
        };
        if start > end {
            return Err(SyncError::InvalidInput(format!(
                "start_date must be before end_date: {start} is after {end}"
            )));
        }

        let bars = self.store.read_range(ticker, start, end).await?;

        let enqueued = match bars.last() {
            None => Some(UpdateKind::Full),
            Some(last) => {
                let last_date = last.date().map_err(SyncError::Store)?;
                ((end - last_date).num_days() >= 1).then_some(UpdateKind::Partial)
            }
        };
        if let Some(kind) = enqueued {
            tracing::info!(ticker, kind = kind.as_str(), rows = bars.len(), "stale read, enqueueing job");
            self.ledger.add_job(ticker, kind);
        }

        Ok(ChartRead {
            ticker: ticker.to_string(),
            start,
            end,
            bars,
            enqueued,
        })
    }

    pub fn force_update(&self, ticker: &str) -> Result<(), SyncError> {
        validate_ticker(ticker).map_err(SyncError::InvalidInput)?;
        self.ledger.add_job(ticker, UpdateKind::Full);
        Ok(())
    }

    pub async fn database_status(&self) -> Result<DatabaseStatus, SyncError> {
        let mut coverage = self.store.coverage().await?;
        let tickers = coverage.len();
        coverage.sort_by(|a, b| a.last.cmp(&b.last).then_with(|| a.ticker.cmp(&b.ticker)));
        coverage.truncate(MOST_STALE_LIMIT);
        Ok(DatabaseStatus {
            tickers,
            most_stale: coverage,
        })
    }

    pub fn all_ticks(&self) -> Vec<Tick> {
        self.ticks.all()
    }
}
