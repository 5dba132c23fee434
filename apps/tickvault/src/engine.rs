//! Wires config, store, providers and caches into one running engine.

use std::sync::Arc;
use tickvault_application::cache::CoalescingCache;
use tickvault_application::config::{ChartSource, Config, StoreBackend};
use tickvault_application::freshness::{ChartQueryService, ChartRead};
use tickvault_application::ledger::JobLedger;
use tickvault_application::reconcile::{is_cacheable_provider_error, Reconciler};
use tickvault_application::ticks::TickBook;
use tickvault_application::upsert::IdempotentUpsert;
use tickvault_domain::error::SyncError;
use tickvault_domain::repositories::bar_store::BarStore;
use tickvault_domain::repositories::providers::{ChartProvider, QuoteProvider};
use tickvault_domain::value_objects::job::UpdateKind;
use tickvault_infrastructure::persistence::memory_bars::InMemoryBarStore;
use tickvault_infrastructure::persistence::postgres_bars::PostgresBarStore;
use tickvault_infrastructure::providers::massive::{MassiveChartProvider, MASSIVE_BASE};
use tickvault_infrastructure::providers::ninja::{NinjaQuoteProvider, NINJA_BASE};
use tickvault_infrastructure::providers::yahoo::YahooChartProvider;

#[derive(Clone)]
pub struct Engine {
    pub reconciler: Reconciler,
    /// Read path over the same store and ledger the reconciler drains.
    pub queries: ChartQueryService,
}

impl Engine {
    /// Builds the engine around already constructed adapters.
    pub fn assemble(
        config: &Config,
        store: Arc<dyn BarStore>,
        chart_provider: Arc<dyn ChartProvider>,
        quote_provider: Option<Arc<dyn QuoteProvider>>,
    ) -> Self {
        let ledger = JobLedger::new();
        let ticks = TickBook::new();
        let chart_cache = CoalescingCache::with_classifier(
            "chart",
            config.cache.chart.options(),
            Arc::new(is_cacheable_provider_error),
        );

        let mut reconciler = Reconciler::new(
            ledger.clone(),
            chart_provider,
            chart_cache,
            IdempotentUpsert::new(Arc::clone(&store)),
            ticks.clone(),
        );
        if let Some(provider) = quote_provider {
            let quote_cache = CoalescingCache::with_classifier(
                "quote",
                config.cache.quote.options(),
                Arc::new(is_cacheable_provider_error),
            );
            reconciler = reconciler.with_quotes(provider, quote_cache);
        }

        Self {
            reconciler,
            queries: ChartQueryService::new(store, ledger, ticks),
        }
    }

    pub fn ledger(&self) -> &JobLedger {
        self.reconciler.ledger()
    }

    /// Reads a range and, when the read queued a job, runs one reconcile
    /// pass and reads again. Used by one-shot commands that have no
    /// scheduler behind them.
    pub async fn read_through(
        &self,
        ticker: &str,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<ChartRead, SyncError> {
        let first = self.queries.chart_data(ticker, start, end).await?;
        if first.enqueued.is_none() {
            return Ok(first);
        }
        let report = self.reconciler.tick().await;
        tracing::debug!(ticker, completed = report.completed, failed = report.failed, "read-through pass");
        self.queries.chart_data(ticker, start, end).await
    }

    /// Enqueues a full sync for every watched ticker.
    pub fn seed_watchlist(&self, tickers: &[String]) {
        for ticker in tickers {
            self.ledger().add_job(ticker, UpdateKind::Full);
        }
        if !tickers.is_empty() {
            tracing::info!(tickers = tickers.len(), "seeded watchlist");
        }
    }
}

pub async fn connect_store(config: &Config) -> Result<Arc<dyn BarStore>, String> {
    match config.db.backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory bar store; data is lost on exit");
            Ok(Arc::new(InMemoryBarStore::new()))
        }
        StoreBackend::Postgres => {
            let url = config.db.resolve_url()?;
            let store = PostgresBarStore::connect(&url, &config.db.table).await?;
            Ok(Arc::new(store))
        }
    }
}

pub fn chart_provider(config: &Config) -> Result<Arc<dyn ChartProvider>, String> {
    let providers = &config.providers;
    match providers.chart {
        ChartSource::Yahoo => {
            let yahoo = &providers.yahoo;
            let provider = YahooChartProvider::new(&yahoo.base_url, &yahoo.user_agent, yahoo.timeout_ms)?;
            Ok(Arc::new(provider))
        }
        ChartSource::Massive => {
            let massive = &providers.massive;
            let api_key = massive
                .api_key()
                .ok_or_else(|| format!("missing massive api key: set {}", massive.api_key_env))?;
            let provider = MassiveChartProvider::new(
                massive.base_url.as_deref().unwrap_or(MASSIVE_BASE),
                &api_key,
                massive.timeout_ms,
            )?;
            Ok(Arc::new(provider))
        }
    }
}

/// `None` when no Ninja key is available; live jobs then fail.
pub fn quote_provider(config: &Config) -> Result<Option<Arc<dyn QuoteProvider>>, String> {
    let ninja = &config.providers.ninja;
    let Some(api_key) = ninja.api_key() else {
        tracing::warn!(env = %ninja.api_key_env, "no ninja api key; live quotes disabled");
        return Ok(None);
    };
    let provider = NinjaQuoteProvider::new(
        ninja.base_url.as_deref().unwrap_or(NINJA_BASE),
        &api_key,
        ninja.timeout_ms,
    )?;
    Ok(Some(Arc::new(provider)))
}

pub async fn build_engine(config: &Config) -> Result<Engine, String> {
    let store = connect_store(config).await?;
    let chart = chart_provider(config)?;
    let quotes = quote_provider(config)?;
    tracing::info!(
        chart_provider = chart.name(),
        backend = ?config.db.backend,
        live_quotes = quotes.is_some(),
        "engine ready"
    );
    Ok(Engine::assemble(config, store, chart, quotes))
}
