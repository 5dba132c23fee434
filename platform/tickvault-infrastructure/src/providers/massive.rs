use super::{build_client, fetch_body, no_description, truncate_body};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use reqwest::Client;
use serde::Deserialize;
use tickvault_domain::error::SyncError;
use tickvault_domain::repositories::providers::{ChartProvider, FetchWindow};
use tickvault_domain::value_objects::bar::{format_date, ChartPayload, DataSource, RawBar};
use tracing::Instrument;

const PROVIDER: &str = "massive";
pub const MASSIVE_BASE: &str = "https://api.massive.com/v1";

#[derive(Debug, Deserialize)]
struct OpenClose {
    status: String,
    symbol: String,
    from: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

/// Daily open/close endpoint. Only ever returns the bar for the last day of
/// the requested window.
pub struct MassiveChartProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl MassiveChartProvider {
    pub fn new(base_url: &str, api_key: &str, timeout_ms: u64) -> Result<Self, String> {
        if api_key.trim().is_empty() {
            return Err("massive api key is empty".to_string());
        }
        Ok(Self {
            client: build_client(timeout_ms, None)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ChartProvider for MassiveChartProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_chart(
        &self,
        ticker: &str,
        window: &FetchWindow,
    ) -> Result<ChartPayload, SyncError> {
        let asof = format_date(window.end);
        let span = tracing::info_span!("infra.massive.fetch_chart", ticker = %ticker, asof = %asof);
        async {
            tracing::info!("fetching open/close from Massive API");
            let url = format!("{}/open-close/{}/{}", self.base_url, ticker, asof);
            let request = self
                .client
                .get(&url)
                .query(&[("adjusted", "true")])
                .bearer_auth(&self.api_key);
            let body = fetch_body(PROVIDER, request, no_description).await?;
            parse_open_close(ticker, &asof, &body)
        }
        .instrument(span)
        .await
    }
}

pub fn parse_open_close(ticker: &str, asof: &str, body: &str) -> Result<ChartPayload, SyncError> {
    let invalid = || {
        SyncError::validation(
            PROVIDER,
            format!("for {ticker} on {asof}: {}", truncate_body(body)),
        )
    };
    let parsed: OpenClose = serde_json::from_str(body).map_err(|_| invalid())?;
    if !parsed.status.eq_ignore_ascii_case("ok") {
        return Err(invalid());
    }
    let day = NaiveDate::parse_from_str(&parsed.from, "%Y-%m-%d").map_err(|_| invalid())?;

    Ok(ChartPayload {
        ticker: parsed.symbol,
        source: DataSource::Massive,
        rows: vec![RawBar {
            timestamp: day.and_time(NaiveTime::MIN).and_utc(),
            open: Some(parsed.open),
            high: Some(parsed.high),
            low: Some(parsed.low),
            close: Some(parsed.close),
            adj_close: Some(parsed.close),
            volume: Some(parsed.volume.round() as i64),
        }],
        live: None,
    })
}
