use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tickvault::engine::{build_engine, Engine};
use tickvault::obs::{self, LogFormat};
use tickvault::scheduler;
use tickvault_application::config::{self, Config, StoreBackend};
use tickvault_domain::value_objects::job::{JobStatus, UpdateKind};
use tickvault_domain::value_objects::ticker::validate_ticker;
use tickvault_infrastructure::persistence::postgres_bars::PostgresBarStore;

#[derive(Parser, Debug)]
#[command(name = "tickvault")]
#[command(about = "Keeps daily market bars fresh in a durable store.", version)]
struct Cli {
    /// Config file path (TOML). Defaults apply when neither this nor TICKVAULT_CONFIG is set.
    #[arg(long, global = true, env = "TICKVAULT_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Expose Prometheus metrics on host:port.
    #[arg(long, global = true, env = "TICKVAULT_METRICS_ADDR")]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the reconcile and heartbeat loops until Ctrl-C.
    Serve,
    /// Create the bar table if it does not exist.
    Migrate,
    /// Print the effective config as TOML.
    ShowConfig,
    /// Enqueue one job, run a single reconcile pass and print the outcome.
    Sync {
        #[arg(long)]
        ticker: String,
        #[arg(long, value_enum, default_value_t = KindArg::Full)]
        kind: KindArg,
    },
    /// Print stored bars for a range as JSON, syncing first if they are missing or stale.
    Chart {
        #[arg(long)]
        ticker: String,
        /// YYYY-MM-DD; defaults to Jan 1st five years back.
        #[arg(long)]
        start: Option<String>,
        /// YYYY-MM-DD; defaults to today.
        #[arg(long)]
        end: Option<String>,
    },
    /// Print ticker coverage and the most stale tickers as JSON.
    Status,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum KindArg {
    Full,
    Partial,
    Live,
}

impl From<KindArg> for UpdateKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Full => UpdateKind::Full,
            KindArg::Partial => UpdateKind::Partial,
            KindArg::Live => UpdateKind::Live,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = obs::init_tracing(cli.log_format) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: failed to init tokio runtime: {err}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32, String> {
    obs::init_metrics(cli.metrics_addr.as_deref())?;
    let config = resolve_config(cli.config.as_deref())?;

    match cli.command {
        Command::Serve => {
            let engine = build_engine(&config).await?;
            engine.seed_watchlist(&config.watch.tickers);
            scheduler::run(&engine, &config.scheduler, shutdown_signal()).await;
            engine.reconciler.heartbeat();
            Ok(0)
        }
        Command::Migrate => {
            migrate(&config).await?;
            Ok(0)
        }
        Command::ShowConfig => {
            print!("{}", config::to_toml_pretty(&config)?);
            Ok(0)
        }
        Command::Sync { ticker, kind } => {
            validate_ticker(&ticker)?;
            let engine = build_engine(&config).await?;
            sync_once(&engine, &ticker, kind.into()).await
        }
        Command::Chart { ticker, start, end } => {
            let engine = build_engine(&config).await?;
            let read = engine
                .read_through(&ticker, start.as_deref(), end.as_deref())
                .await
                .map_err(|err| err.to_string())?;
            print_json(&read)?;
            Ok(if read.bars.is_empty() { 1 } else { 0 })
        }
        Command::Status => {
            let engine = build_engine(&config).await?;
            let status = engine
                .queries
                .database_status()
                .await
                .map_err(|err| err.to_string())?;
            print_json(&status)?;
            Ok(0)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| format!("failed to render output: {err}"))?;
    println!("{rendered}");
    Ok(())
}

fn resolve_config(path: Option<&Path>) -> Result<Config, String> {
    match path {
        Some(path) => config::load_config(path),
        None => {
            tracing::info!("no config file given, using defaults");
            Ok(Config::default())
        }
    }
}

async fn migrate(config: &Config) -> Result<(), String> {
    if config.db.backend == StoreBackend::Memory {
        println!("migrate skipped: memory backend has no schema");
        return Ok(());
    }
    let url = config.db.resolve_url()?;
    let store = PostgresBarStore::connect(&url, &config.db.table).await?;
    store.migrate().await?;
    println!("migrate complete: {}", store.table());
    Ok(())
}

async fn sync_once(engine: &Engine, ticker: &str, kind: UpdateKind) -> Result<i32, String> {
    engine.ledger().add_job(ticker, kind);
    let report = engine.reconciler.tick().await;
    let entry = engine
        .ledger()
        .get(ticker, kind)
        .ok_or_else(|| format!("job {ticker}:{} vanished from the ledger", kind.as_str()))?;

    let summary = serde_json::json!({
        "ticker": ticker,
        "kind": kind,
        "status": entry.status,
        "timestamp": entry.timestamp,
        "report": report,
        "counts": engine.ledger().counts(),
    });
    print_json(&summary)?;

    Ok(if entry.status == JobStatus::Failed { 1 } else { 0 })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
