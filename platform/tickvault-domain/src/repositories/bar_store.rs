use crate::error::SyncError;
use crate::value_objects::bar::ChartBar;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertOutcome {
    pub rows_changed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerCoverage {
    pub ticker: String,
    pub rows: u64,
    pub last: Option<DateTime<Utc>>,
}

/// Durable table of daily bars keyed by `(ticker, dt_string)`.
#[async_trait]
pub trait BarStore: Send + Sync {
    /// Rows for `ticker` with `start <= dt_string <= end`, oldest first.
    async fn read_range(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ChartBar>, SyncError>;

    /// Inserts missing rows and rewrites existing rows only when a value
    /// differs. `rows_changed` counts inserted plus rewritten rows.
    async fn bulk_conditional_upsert(&self, bars: &[ChartBar]) -> Result<UpsertOutcome, SyncError>;

    async fn coverage(&self) -> Result<Vec<TickerCoverage>, SyncError>;
}
