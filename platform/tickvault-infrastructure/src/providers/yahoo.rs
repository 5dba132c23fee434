use super::{build_client, fetch_body, truncate_body};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tickvault_domain::error::SyncError;
use tickvault_domain::repositories::providers::{ChartProvider, FetchWindow};
use tickvault_domain::value_objects::bar::{ChartPayload, DataSource, RawBar};
use tickvault_domain::value_objects::tick::Tick;
use tracing::Instrument;

const PROVIDER: &str = "yahoo";
pub const YAHOO_BASE: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Deserialize)]
struct YahooResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    meta: YahooMeta,
    timestamp: Option<Vec<i64>>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooMeta {
    regular_market_price: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
    #[serde(default)]
    adjclose: Vec<YahooAdjClose>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooQuote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<f64>>>,
}

#[derive(Debug, Deserialize)]
struct YahooAdjClose {
    adjclose: Option<Vec<Option<f64>>>,
}

pub struct YahooChartProvider {
    client: Client,
    base_url: String,
}

impl YahooChartProvider {
    pub fn new(base_url: &str, user_agent: &str, timeout_ms: u64) -> Result<Self, String> {
        Ok(Self {
            client: build_client(timeout_ms, Some(user_agent))?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ChartProvider for YahooChartProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_chart(
        &self,
        ticker: &str,
        window: &FetchWindow,
    ) -> Result<ChartPayload, SyncError> {
        let span = tracing::info_span!(
            "infra.yahoo.fetch_chart",
            ticker = %ticker,
            start = %window.start,
            end = %window.end
        );
        async {
            let (period1, period2) = period_bounds(window);
            let url = format!("{}/v8/finance/chart/{}", self.base_url, to_yahoo_symbol(ticker));
            tracing::info!("fetching chart from Yahoo Finance");

            let request = self.client.get(&url).query(&[
                ("interval", "1d".to_string()),
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
            ]);
            let body = fetch_body(PROVIDER, request, error_description).await?;
            parse_chart_response(ticker, &body)
        }
        .instrument(span)
        .await
    }
}

/// General symbols use `.` for share classes; Yahoo uses `-`. The mapping
/// is one way only: `BF-B` and `BF.B` both request `BF-B`, and the payload
/// keeps whichever ticker was asked for.
pub fn to_yahoo_symbol(symbol: &str) -> String {
    symbol.replace('.', "-")
}

/// Start of the first day and last second of the final day, in epoch seconds.
pub fn period_bounds(window: &FetchWindow) -> (i64, i64) {
    let start = window.start.and_time(NaiveTime::MIN).and_utc().timestamp();
    let end = window
        .end
        .succ_opt()
        .map(|next| next.and_time(NaiveTime::MIN).and_utc().timestamp() - 1)
        .unwrap_or(i64::MAX);
    (start, end)
}

fn error_description(body: &str) -> Option<String> {
    let parsed: YahooResponse = serde_json::from_str(body).ok()?;
    parsed.chart.error.map(|err| err.description)
}

/// Decodes a chart body for `ticker` into raw rows. Prices are passed through
/// untouched; rounding and filtering belong to normalization.
pub fn parse_chart_response(ticker: &str, body: &str) -> Result<ChartPayload, SyncError> {
    let parsed: YahooResponse = serde_json::from_str(body).map_err(|err| {
        SyncError::validation(PROVIDER, format!("{err}: {}", truncate_body(body)))
    })?;

    if let Some(err) = parsed.chart.error {
        return Err(SyncError::validation(
            PROVIDER,
            format!("{}: {}", err.code, err.description),
        ));
    }
    let result = parsed
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| SyncError::validation(PROVIDER, "chart has no result"))?;


    let live = match (result.meta.regular_market_price, result.meta.regular_market_time) {
        (Some(price), Some(time)) if price.is_finite() => epoch(time).map(|timestamp| Tick {
            ticker: ticker.to_string(),
            mark: (price * 10_000.0).round() / 10_000.0,
            timestamp,
        }),
        _ => None,
    };

    let quote = result.indicators.quote.into_iter().next().unwrap_or_default();
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .and_then(|adj| adj.adjclose);
    let at = |series: &Option<Vec<Option<f64>>>, index: usize| {
        series
            .as_ref()
            .and_then(|values| values.get(index).copied().flatten())
    };

    let mut rows = Vec::new();
    for (index, ts) in result.timestamp.unwrap_or_default().into_iter().enumerate() {
        let Some(timestamp) = epoch(ts) else {
            return Err(SyncError::validation(PROVIDER, format!("invalid timestamp {ts}")));
        };
        rows.push(RawBar {
            timestamp,
            open: at(&quote.open, index),
            high: at(&quote.high, index),
            low: at(&quote.low, index),
            close: at(&quote.close, index),
            adj_close: at(&adjclose, index),
            volume: at(&quote.volume, index).map(|v| v.round() as i64),
        });
    }

    Ok(ChartPayload {
        ticker: ticker.to_string(),
        source: DataSource::Yahoo,
        rows,
        live,
    })
}

fn epoch(seconds: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds, 0).single()
}
