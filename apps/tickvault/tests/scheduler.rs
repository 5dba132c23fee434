use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tickvault::engine::Engine;
use tickvault::scheduler;
use tickvault_application::config::{Config, SchedulerConfig};
use tickvault_domain::error::SyncError;
use tickvault_domain::repositories::providers::{ChartProvider, FetchWindow};
use tickvault_domain::value_objects::bar::{ChartPayload, DataSource, RawBar};
use tickvault_domain::value_objects::job::{JobStatus, UpdateKind};
use tickvault_infrastructure::persistence::memory_bars::InMemoryBarStore;

#[derive(Default)]
struct OneBarProvider {
    calls: AtomicUsize,
    delay: Duration,
}

impl OneBarProvider {
    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ChartProvider for OneBarProvider {
    fn name(&self) -> &'static str {
        "one-bar"
    }

    async fn fetch_chart(
        &self,
        ticker: &str,
        _window: &FetchWindow,
    ) -> Result<ChartPayload, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if ticker == "FAIL" {
            return Err(SyncError::transient("one-bar", "503: Service Unavailable"));
        }
        Ok(ChartPayload {
            ticker: ticker.to_string(),
            source: DataSource::Yahoo,
            rows: vec![RawBar {
                timestamp: Utc::now(),
                open: Some(10.0),
                high: Some(11.0),
                low: Some(9.0),
                close: Some(10.5),
                adj_close: Some(10.5),
                volume: Some(1_000),
            }],
            live: None,
        })
    }
}

fn engine_with(provider: Arc<OneBarProvider>, store: InMemoryBarStore) -> Engine {
    Engine::assemble(&Config::default(), Arc::new(store), provider, None)
}

#[tokio::test(start_paused = true)]
async fn scheduler_drains_seeded_watchlist_then_stops() {
    let provider = Arc::new(OneBarProvider::default());
    let store = InMemoryBarStore::new();
    let engine = engine_with(provider.clone(), store.clone());
    engine.seed_watchlist(&["AAPL".to_string(), "MSFT".to_string(), "FAIL".to_string()]);

    scheduler::run(
        &engine,
        &SchedulerConfig::default(),
        tokio::time::sleep(Duration::from_secs(5)),
    )
    .await;

    let status = |ticker: &str| engine.ledger().get(ticker, UpdateKind::Full).map(|e| e.status);
    assert_eq!(status("AAPL"), Some(JobStatus::Completed));
    assert_eq!(status("MSFT"), Some(JobStatus::Completed));
    assert_eq!(status("FAIL"), Some(JobStatus::Failed));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn reads_enqueue_jobs_the_scheduler_then_completes() {
    let provider = Arc::new(OneBarProvider::default());
    let engine = engine_with(provider, InMemoryBarStore::new());

    let first = engine.queries.chart_data("AAPL", None, None).await.unwrap();
    assert_eq!(first.enqueued, Some(UpdateKind::Full));

    scheduler::run(
        &engine,
        &SchedulerConfig::default(),
        tokio::time::sleep(Duration::from_secs(2)),
    )
    .await;

    let second = engine.queries.chart_data("AAPL", None, None).await.unwrap();
    assert_eq!(second.bars.len(), 1);
    assert_eq!(second.enqueued, None);
}

#[tokio::test(start_paused = true)]
async fn scheduler_returns_promptly_on_shutdown() {
    let engine = engine_with(Arc::new(OneBarProvider::default()), InMemoryBarStore::new());
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn({
        let engine = engine.clone();
        async move {
            scheduler::run(&engine, &SchedulerConfig::default(), async {
                let _ = rx.await;
            })
            .await;
        }
    });
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let _ = tx.send(());

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("scheduler stopped")
        .expect("scheduler task");
    assert!(engine.ledger().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_a_stalled_reconcile_pass() {
    let provider = Arc::new(OneBarProvider::slow(Duration::from_secs(3600)));
    let engine = engine_with(provider.clone(), InMemoryBarStore::new());
    engine.seed_watchlist(&["AAPL".to_string()]);
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let handle = tokio::spawn({
        let engine = engine.clone();
        async move {
            scheduler::run(&engine, &SchedulerConfig::default(), async {
                let _ = rx.await;
            })
            .await;
        }
    });
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    let _ = tx.send(());

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler stopped mid-pass")
        .expect("scheduler task");
    assert_eq!(
        engine.ledger().get("AAPL", UpdateKind::Full).map(|e| e.status),
        Some(JobStatus::Running)
    );
}

#[tokio::test]
async fn read_through_fills_a_missing_range_in_one_call() {
    let provider = Arc::new(OneBarProvider::default());
    let store = InMemoryBarStore::new();
    let engine = engine_with(provider.clone(), store.clone());

    let read = engine.read_through("AAPL", None, None).await.unwrap();
    assert_eq!(read.bars.len(), 1);
    assert_eq!(read.enqueued, None);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        engine.ledger().get("AAPL", UpdateKind::Full).map(|e| e.status),
        Some(JobStatus::Completed)
    );

    let again = engine.read_through("AAPL", None, None).await.unwrap();
    assert_eq!(again.bars, read.bars);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}
