use chrono::NaiveDate;
use tickvault_domain::error::SyncError;
use tickvault_domain::repositories::providers::{ChartProvider, FetchWindow, QuoteProvider};
use tickvault_domain::value_objects::bar::DataSource;
use tickvault_infrastructure::providers::massive::MassiveChartProvider;
use tickvault_infrastructure::providers::ninja::NinjaQuoteProvider;
use tickvault_infrastructure::providers::yahoo::{parse_chart_response, YahooChartProvider};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

const AAPL_CHART: &str = include_str!("fixtures/yahoo_chart_aapl.json");
const NOT_FOUND: &str = include_str!("fixtures/yahoo_not_found.json");

/// Serves one canned HTTP response and hands back the raw request.
async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 8192];
        let n = socket.read(&mut buf).await.unwrap();
        let request = String::from_utf8_lossy(&buf[..n]).to_string();
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        let _ = tx.send(request);
    });

    (format!("http://{addr}"), rx)
}

fn window(start: (i32, u32, u32), end: (i32, u32, u32)) -> FetchWindow {
    FetchWindow::new(
        NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
        NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
    )
    .unwrap()
}

#[test]
fn yahoo_fixture_keeps_null_closes_for_normalization() {
    let payload = parse_chart_response("AAPL", AAPL_CHART).unwrap();
    assert_eq!(payload.ticker, "AAPL");
    assert_eq!(payload.source, DataSource::Yahoo);
    assert_eq!(payload.rows.len(), 3);
    assert_eq!(payload.rows[0].close, Some(269.429993));
    assert_eq!(payload.rows[2].close, None);
    assert_eq!(payload.rows[1].volume, Some(46_208_300));

    let live = payload.live.expect("live snapshot");
    assert_eq!(live.mark, 273.47);
    assert_eq!(live.timestamp.timestamp(), 1_762_981_201);
}

#[tokio::test]
async fn yahoo_requests_mapped_symbol_and_day_bounds() {
    let (base, request) = serve_once("200 OK", AAPL_CHART).await;
    let provider = YahooChartProvider::new(&base, "tickvault-test", 5_000).unwrap();

    let payload = provider
        .fetch_chart("BRK.B", &window((2025, 11, 10), (2025, 11, 12)))
        .await
        .unwrap();
    assert_eq!(payload.ticker, "BRK.B");
    assert_eq!(payload.rows.len(), 3);

    let request = request.await.unwrap();
    let request_line = request.lines().next().unwrap();
    assert!(request_line.starts_with("GET /v8/finance/chart/BRK-B?"));
    assert!(request_line.contains("interval=1d"));
    assert!(request_line.contains("period1=1762732800"));
    assert!(request_line.contains("period2=1762991999"));
    assert!(request.to_lowercase().contains("user-agent: tickvault-test"));
}

#[tokio::test]
async fn yahoo_rate_limit_is_transient_with_status_and_description() {
    let (base, _request) = serve_once("429 Too Many Requests", NOT_FOUND).await;
    let provider = YahooChartProvider::new(&base, "tickvault-test", 5_000).unwrap();

    let err = provider
        .fetch_chart("AAPL", &window((2025, 11, 10), (2025, 11, 12)))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(
        err.to_string(),
        "yahoo: 429: No data found, symbol may be delisted"
    );
}

#[tokio::test]
async fn yahoo_garbage_body_is_validation() {
    let (base, _request) = serve_once("200 OK", "<html>consent</html>").await;
    let provider = YahooChartProvider::new(&base, "tickvault-test", 5_000).unwrap();

    let err = provider
        .fetch_chart("AAPL", &window((2025, 11, 10), (2025, 11, 12)))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation { provider: "yahoo", .. }));
}

#[tokio::test]
async fn yahoo_unreachable_host_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let provider = YahooChartProvider::new(&format!("http://{addr}"), "tickvault-test", 2_000).unwrap();
    let err = provider
        .fetch_chart("AAPL", &window((2025, 11, 10), (2025, 11, 12)))
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn massive_sends_bearer_key_and_asks_for_window_end() {
    let body = r#"{"close":273.47,"from":"2025-11-12","high":275.73,"low":271.7,"open":275.0,"status":"OK","symbol":"AAPL","volume":48398000}"#;
    let (base, request) = serve_once("200 OK", body).await;
    let provider = MassiveChartProvider::new(&base, "secret-key", 5_000).unwrap();

    let payload = provider
        .fetch_chart("AAPL", &window((2025, 11, 5), (2025, 11, 12)))
        .await
        .unwrap();
    assert_eq!(payload.source, DataSource::Massive);
    assert_eq!(payload.rows.len(), 1);

    let request = request.await.unwrap();
    assert!(request.starts_with("GET /open-close/AAPL/2025-11-12?adjusted=true"));
    assert!(request.to_lowercase().contains("authorization: bearer secret-key"));
}

#[tokio::test]
async fn ninja_sends_api_key_header() {
    let body = r#"{"ticker":"AAPL","name":"Apple Inc.","price":273.47,"exchange":"NASDAQ","updated":1762981200,"currency":"USD"}"#;
    let (base, request) = serve_once("200 OK", body).await;
    let provider = NinjaQuoteProvider::new(&base, "ninja-key", 5_000).unwrap();

    let quote = provider.fetch_quote("AAPL").await.unwrap();
    assert_eq!(quote.exchange, "NASDAQ");

    let request = request.await.unwrap();
    assert!(request.starts_with("GET /stockprice?ticker=AAPL"));
    assert!(request.to_lowercase().contains("x-api-key: ninja-key"));
}

#[tokio::test]
async fn ninja_server_error_is_transient() {
    let (base, _request) = serve_once("503 Service Unavailable", "{}").await;
    let provider = NinjaQuoteProvider::new(&base, "ninja-key", 5_000).unwrap();

    let err = provider.fetch_quote("AAPL").await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(err.to_string(), "ninja: 503: Service Unavailable");
}
