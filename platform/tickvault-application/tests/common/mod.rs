#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tickvault_domain::error::SyncError;
use tickvault_domain::repositories::providers::{ChartProvider, FetchWindow, QuoteProvider};
use tickvault_domain::value_objects::bar::{ChartBar, ChartPayload, DataSource, RawBar};
use tickvault_domain::value_objects::tick::{Quote, Tick};

/// Chart provider answering from a per-ticker script. Unscripted tickers get
/// an empty history.
#[derive(Default)]
pub struct FakeChartProvider {
    responses: Mutex<HashMap<String, Result<ChartPayload, SyncError>>>,
    calls: AtomicUsize,
    windows: Mutex<Vec<(String, FetchWindow)>>,
    delay_ms: u64,
}

impl FakeChartProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn respond(&self, ticker: &str, response: Result<ChartPayload, SyncError>) {
        self.responses.lock().insert(ticker.to_string(), response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn windows(&self) -> Vec<(String, FetchWindow)> {
        self.windows.lock().clone()
    }
}

#[async_trait]
impl ChartProvider for FakeChartProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_chart(
        &self,
        ticker: &str,
        window: &FetchWindow,
    ) -> Result<ChartPayload, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.windows.lock().push((ticker.to_string(), *window));
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        let scripted = self.responses.lock().get(ticker).cloned();
        scripted.unwrap_or_else(|| Ok(payload(ticker, Vec::new())))
    }
}

#[derive(Default)]
pub struct FakeQuoteProvider {
    prices: Mutex<HashMap<String, f64>>,
    calls: AtomicUsize,
}

impl FakeQuoteProvider {
    pub fn with_price(self, ticker: &str, price: f64) -> Self {
        self.prices.lock().insert(ticker.to_string(), price);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for FakeQuoteProvider {
    fn name(&self) -> &'static str {
        "fake-quotes"
    }

    async fn fetch_quote(&self, ticker: &str) -> Result<Quote, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let price = self.prices.lock().get(ticker).copied();
        let price = price.ok_or_else(|| SyncError::transient("fake-quotes", "503: unavailable"))?;
        Ok(Quote {
            ticker: ticker.to_string(),
            name: format!("{ticker} Inc."),
            price,
            exchange: "NASDAQ".to_string(),
            currency: "USD".to_string(),
            updated: Utc.with_ymd_and_hms(2025, 11, 12, 21, 0, 0).unwrap(),
        })
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn session(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(14, 30, 0).unwrap())
}

pub fn raw_row(date: NaiveDate, close: f64) -> RawBar {
    RawBar {
        timestamp: session(date),
        open: Some(close - 1.0),
        high: Some(close + 1.0),
        low: Some(close - 2.0),
        close: Some(close),
        adj_close: Some(close),
        volume: Some(1_000),
    }
}

/// `days` consecutive daily rows ending on `last`.
pub fn history(last: NaiveDate, days: i64, close: f64) -> Vec<RawBar> {
    (0..days)
        .rev()
        .map(|back| raw_row(last - Duration::days(back), close))
        .collect()
}

pub fn payload(ticker: &str, rows: Vec<RawBar>) -> ChartPayload {
    ChartPayload {
        ticker: ticker.to_string(),
        source: DataSource::Yahoo,
        rows,
        live: None,
    }
}

pub fn payload_with_live(ticker: &str, rows: Vec<RawBar>, mark: f64) -> ChartPayload {
    ChartPayload {
        live: Some(Tick {
            ticker: ticker.to_string(),
            mark,
            timestamp: Utc.with_ymd_and_hms(2025, 11, 12, 20, 0, 0).unwrap(),
        }),
        ..payload(ticker, rows)
    }
}

pub fn bar(ticker: &str, date: NaiveDate, close: f64) -> ChartBar {
    ChartBar {
        ticker: ticker.to_string(),
        dt_string: date.format("%Y-%m-%d").to_string(),
        open_trade: close,
        high: close,
        low: close,
        unadj_close: close,
        volume: 1_000,
        adj_close: close,
        timestamp: session(date),
        source: DataSource::Yahoo,
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
