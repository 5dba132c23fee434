//! Log subscriber and metrics exporter setup for the binary.

use clap::ValueEnum;
use std::net::SocketAddr;

pub const LOG_ENV: &str = "TICKVAULT_LOG";

/// Postgres and HTTP client internals are noisy at info.
pub const DEFAULT_FILTER: &str = "info,tokio_postgres=warn,hyper_util=warn,reqwest=warn";

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// `TICKVAULT_LOG` wins when set and non-blank.
pub fn log_filter(env_value: Option<&str>) -> String {
    env_value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

pub fn init_tracing(format: LogFormat) -> Result<(), String> {
    let filter = log_filter(std::env::var(LOG_ENV).ok().as_deref());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&filter)
        .map_err(|err| format!("invalid {LOG_ENV} filter {filter:?}: {err}"))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);
    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
    installed.map_err(|err| format!("failed to install log subscriber: {err}"))
}

/// Blank means disabled.
pub fn parse_metrics_addr(raw: Option<&str>) -> Result<Option<SocketAddr>, String> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    raw.parse()
        .map(Some)
        .map_err(|err| format!("invalid metrics address {raw:?} (expected host:port): {err}"))
}

#[cfg(feature = "prometheus")]
pub fn init_metrics(metrics_addr: Option<&str>) -> Result<Option<SocketAddr>, String> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let Some(addr) = parse_metrics_addr(metrics_addr)? else {
        return Ok(None);
    };
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|err| format!("failed to start metrics listener on {addr}: {err}"))?;

    tracing::info!(%addr, "serving prometheus metrics");
    Ok(Some(addr))
}

#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(metrics_addr: Option<&str>) -> Result<Option<SocketAddr>, String> {
    match parse_metrics_addr(metrics_addr)? {
        Some(addr) => Err(format!(
            "cannot serve metrics on {addr}: built without the `prometheus` feature"
        )),
        None => Ok(None),
    }
}
