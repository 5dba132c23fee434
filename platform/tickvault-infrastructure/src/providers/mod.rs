//! HTTP clients for upstream market-data providers.
//!
//! Failure mapping is shared: transport errors and non-success statuses are
//! `Transient`, bodies that do not match the expected shape are `Validation`.

pub mod massive;
pub mod ninja;
pub mod yahoo;

use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::{Duration, Instant};
use tickvault_domain::error::SyncError;

pub(crate) fn build_client(timeout_ms: u64, user_agent: Option<&str>) -> Result<Client, String> {
    let mut builder = Client::builder()
        .timeout(Duration::from_millis(timeout_ms.max(1)))
        .pool_idle_timeout(Duration::from_secs(90));
    if let Some(user_agent) = user_agent {
        builder = builder.user_agent(user_agent);
    }
    builder
        .build()
        .map_err(|err| format!("failed to build http client: {err}"))
}

/// Sends `request` and returns the raw body of a successful response.
/// `describe` extracts a provider-specific error description from the body
/// of a failed one.
pub(crate) async fn fetch_body(
    provider: &'static str,
    request: RequestBuilder,
    describe: fn(&str) -> Option<String>,
) -> Result<String, SyncError> {
    let started = Instant::now();
    let response = request.send().await.map_err(|err| {
        record_request(provider, "transport");
        SyncError::transient(provider, format!("request failed: {err}"))
    })?;

    let status = response.status();
    let body = response.text().await.map_err(|err| {
        record_request(provider, "transport");
        SyncError::transient(provider, format!("failed to read response body: {err}"))
    })?;
    metrics::histogram!("tickvault.infra.http.request_ms", "provider" => provider)
        .record(started.elapsed().as_secs_f64() * 1000.0);

    if !status.is_success() {
        record_request(provider, status_label(status));
        let description = describe(&body).unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string()
        });
        return Err(SyncError::transient(
            provider,
            format!("{}: {description}", status.as_u16()),
        ));
    }

    record_request(provider, "ok");
    Ok(body)
}

fn status_label(status: StatusCode) -> &'static str {
    if status == StatusCode::TOO_MANY_REQUESTS {
        "rate_limited"
    } else if status.is_server_error() {
        "server_error"
    } else {
        "client_error"
    }
}

fn record_request(provider: &'static str, result: &'static str) {
    metrics::counter!(
        "tickvault.infra.http.requests_total",
        "provider" => provider,
        "result" => result
    )
    .increment(1);
}

pub(crate) fn no_description(_body: &str) -> Option<String> {
    None
}

/// Keeps error messages readable when a provider echoes a large body.
pub(crate) fn truncate_body(body: &str) -> &str {
    const MAX: usize = 256;
    if body.len() <= MAX {
        return body;
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
