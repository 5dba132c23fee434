use crate::value_objects::tick::Tick;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Yahoo,
    Massive,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Yahoo => "yahoo",
            DataSource::Massive => "massive",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_lowercase().as_str() {
            "yahoo" => Ok(DataSource::Yahoo),
            "massive" => Ok(DataSource::Massive),
            other => Err(format!("unknown data source: {other}")),
        }
    }
}

/// One stored daily bar. `(ticker, dt_string)` is the primary key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartBar {
    pub ticker: String,
    pub dt_string: String,
    pub open_trade: f64,
    pub high: f64,
    pub low: f64,
    pub unadj_close: f64,
    pub volume: i64,
    pub adj_close: f64,
    pub timestamp: DateTime<Utc>,
    pub source: DataSource,
}

impl ChartBar {
    /// True when every non-key column matches `other`.
    pub fn same_values(&self, other: &ChartBar) -> bool {
        self.open_trade == other.open_trade
            && self.high == other.high
            && self.low == other.low
            && self.unadj_close == other.unadj_close
            && self.volume == other.volume
            && self.adj_close == other.adj_close
            && self.timestamp == other.timestamp
            && self.source == other.source
    }

    pub fn date(&self) -> Result<NaiveDate, String> {
        NaiveDate::parse_from_str(&self.dt_string, DATE_FORMAT)
            .map_err(|err| format!("invalid dt_string '{}': {err}", self.dt_string))
    }
}

/// A provider row before normalization; any price may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    pub timestamp: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub adj_close: Option<f64>,
    pub volume: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartPayload {
    pub ticker: String,
    pub source: DataSource,
    pub rows: Vec<RawBar>,
    pub live: Option<Tick>,
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| format!("{value} is invalid, must be in YYYY-MM-DD format"))
}
