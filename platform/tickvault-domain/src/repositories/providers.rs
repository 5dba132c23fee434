use crate::error::SyncError;
use crate::value_objects::bar::{format_date, ChartPayload};
use crate::value_objects::tick::Quote;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Inclusive date range requested from a chart provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if start > end {
            return Err(format!(
                "start_date must be before end_date: {} is after {}",
                format_date(start),
                format_date(end)
            ));
        }
        Ok(Self { start, end })
    }

    /// Stable identity used as the provider cache key.
    pub fn cache_key(&self, ticker: &str) -> String {
        format!(
            "{}:{}:{}",
            ticker,
            format_date(self.start),
            format_date(self.end)
        )
    }
}

#[async_trait]
pub trait ChartProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_chart(
        &self,
        ticker: &str,
        window: &FetchWindow,
    ) -> Result<ChartPayload, SyncError>;
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_quote(&self, ticker: &str) -> Result<Quote, SyncError>;
}
