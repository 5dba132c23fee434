use super::{build_client, fetch_body, no_description, truncate_body};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tickvault_domain::error::SyncError;
use tickvault_domain::repositories::providers::QuoteProvider;
use tickvault_domain::value_objects::tick::Quote;
use tracing::Instrument;

const PROVIDER: &str = "ninja";
pub const NINJA_BASE: &str = "https://api.api-ninjas.com/v1";

#[derive(Debug, Deserialize)]
struct StockPrice {
    ticker: String,
    name: String,
    price: f64,
    exchange: String,
    updated: i64,
    currency: String,
}

pub struct NinjaQuoteProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl NinjaQuoteProvider {
    pub fn new(base_url: &str, api_key: &str, timeout_ms: u64) -> Result<Self, String> {
        if api_key.trim().is_empty() {
            return Err("ninja api key is empty".to_string());
        }
        Ok(Self {
            client: build_client(timeout_ms, None)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl QuoteProvider for NinjaQuoteProvider {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn fetch_quote(&self, ticker: &str) -> Result<Quote, SyncError> {
        let span = tracing::info_span!("infra.ninja.fetch_quote", ticker = %ticker);
        async {
            tracing::info!("fetching quote from Ninja API");
            let request = self
                .client
                .get(format!("{}/stockprice", self.base_url))
                .query(&[("ticker", ticker)])
                .header("X-API-Key", &self.api_key);
            let body = fetch_body(PROVIDER, request, no_description).await?;
            parse_stock_price(ticker, &body)
        }
        .instrument(span)
        .await
    }
}

pub fn parse_stock_price(ticker: &str, body: &str) -> Result<Quote, SyncError> {
    let invalid = || SyncError::validation(PROVIDER, format!("for {ticker}: {}", truncate_body(body)));
    let parsed: StockPrice = serde_json::from_str(body).map_err(|_| invalid())?;
    let updated = Utc
        .timestamp_opt(parsed.updated, 0)
        .single()
        .ok_or_else(invalid)?;
    Ok(Quote {
        ticker: parsed.ticker,
        name: parsed.name,
        price: parsed.price,
        exchange: parsed.exchange,
        currency: parsed.currency,
        updated,
    })
}
