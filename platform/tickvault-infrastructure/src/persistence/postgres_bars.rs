use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::time::Instant;
use tickvault_domain::error::SyncError;
use tickvault_domain::repositories::bar_store::{BarStore, TickerCoverage, UpsertOutcome};
use tickvault_domain::value_objects::bar::{format_date, ChartBar, DataSource};
use tokio_postgres::{Client, NoTls, Row};
use tracing::Instrument;

const COLUMNS: &str =
    "ticker, dt_string, open_trade, high, low, unadj_close, volume, adj_close, timestamp, source";

pub struct PostgresBarStore {
    client: Client,
    table: String,
}

impl PostgresBarStore {
    /// Connects and spawns the connection driver on the current runtime.
    pub async fn connect(db_url: &str, table: &str) -> Result<Self, String> {
        if let Err(err) = validate_table_name(table) {
            return Err(format!("invalid table '{table}': {err}"));
        }

        let (client, connection) = tokio_postgres::connect(db_url, NoTls)
            .await
            .map_err(|err| format!("failed to connect to postgres: {err}"))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "postgres connection error");
            }
        });

        Ok(Self {
            client,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the bar table and its `(ticker, dt_string)` key if missing.
    pub async fn migrate(&self) -> Result<(), String> {
        self.client
            .batch_execute(&create_table_sql(&self.table))
            .await
            .map_err(|err| format!("failed to apply migrations: {err}"))?;
        tracing::info!(table = %self.table, "migrate complete");
        Ok(())
    }

    fn ensure_open(&self, stage: &'static str) -> Result<(), SyncError> {
        if self.client.is_closed() {
            record_error(stage, "connection_closed");
            return Err(SyncError::Store("postgres connection closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BarStore for PostgresBarStore {
    async fn read_range(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ChartBar>, SyncError> {
        let span = tracing::info_span!(
            "infra.postgres.read_range",
            table = %self.table,
            ticker = %ticker,
            start = %start,
            end = %end
        );
        async {
            self.ensure_open("read_range")?;
            let query = format!(
                "SELECT {COLUMNS} FROM {} \
                 WHERE ticker = $1 AND dt_string BETWEEN $2 AND $3 \
                 ORDER BY dt_string ASC",
                self.table
            );
            let started = Instant::now();
            let rows = self
                .client
                .query(&query, &[&ticker, &format_date(start), &format_date(end)])
                .await
                .map_err(|err| {
                    record_error("read_range", "query");
                    tracing::error!(error = %err, "failed to query bars");
                    SyncError::Store(format!("failed to query bars: {err}"))
                })?;
            metrics::histogram!("tickvault.infra.postgres.query_ms", "op" => "read_range")
                .record(started.elapsed().as_secs_f64() * 1000.0);

            let bars = rows
                .iter()
                .map(bar_from_row)
                .collect::<Result<Vec<_>, _>>()?;
            tracing::debug!(rows = bars.len(), "loaded bars");
            Ok(bars)
        }
        .instrument(span)
        .await
    }

    async fn bulk_conditional_upsert(&self, bars: &[ChartBar]) -> Result<UpsertOutcome, SyncError> {
        if bars.is_empty() {
            return Ok(UpsertOutcome::default());
        }
        let span = tracing::info_span!(
            "infra.postgres.upsert",
            table = %self.table,
            rows = bars.len()
        );
        async {
            self.ensure_open("upsert")?;
            let columns = UpsertColumns::from_bars(bars);
            let statement = upsert_sql(&self.table);

            let started = Instant::now();
            let rows_changed = self
                .client
                .execute(
                    &statement,
                    &[
                        &columns.tickers,
                        &columns.dates,
                        &columns.opens,
                        &columns.highs,
                        &columns.lows,
                        &columns.closes,
                        &columns.volumes,
                        &columns.adj_closes,
                        &columns.timestamps,
                        &columns.sources,
                    ],
                )
                .await
                .map_err(|err| {
                    record_error("upsert", "execute");
                    tracing::error!(error = %err, "bulk upsert failed");
                    SyncError::Store(format!("upsert failed: {err}"))
                })?;

            metrics::histogram!("tickvault.infra.postgres.query_ms", "op" => "upsert")
                .record(started.elapsed().as_secs_f64() * 1000.0);
            metrics::counter!("tickvault.infra.postgres.rows_changed_total").increment(rows_changed);
            Ok(UpsertOutcome { rows_changed })
        }
        .instrument(span)
        .await
    }

    async fn coverage(&self) -> Result<Vec<TickerCoverage>, SyncError> {
        self.ensure_open("coverage")?;
        let query = format!(
            "SELECT ticker, COUNT(*), MAX(timestamp) FROM {} GROUP BY ticker ORDER BY ticker",
            self.table
        );
        let rows = self.client.query(&query, &[]).await.map_err(|err| {
            record_error("coverage", "query");
            SyncError::Store(format!("failed to query coverage: {err}"))
        })?;

        rows.iter()
            .map(|row| {
                let count: i64 = row
                    .try_get(1)
                    .map_err(|err| SyncError::Store(format!("invalid coverage row: {err}")))?;
                Ok(TickerCoverage {
                    ticker: row
                        .try_get(0)
                        .map_err(|err| SyncError::Store(format!("invalid coverage row: {err}")))?,
                    rows: count.max(0) as u64,
                    last: row
                        .try_get::<_, Option<DateTime<Utc>>>(2)
                        .map_err(|err| SyncError::Store(format!("invalid coverage row: {err}")))?,
                })
            })
            .collect()
    }
}

/// Column-major copy of a batch, bound as one array per column.
struct UpsertColumns {
    tickers: Vec<String>,
    dates: Vec<String>,
    opens: Vec<f64>,
    highs: Vec<f64>,
    lows: Vec<f64>,
    closes: Vec<f64>,
    volumes: Vec<i64>,
    adj_closes: Vec<f64>,
    timestamps: Vec<DateTime<Utc>>,
    sources: Vec<String>,
}

impl UpsertColumns {
    fn from_bars(bars: &[ChartBar]) -> Self {
        Self {
            tickers: bars.iter().map(|b| b.ticker.clone()).collect(),
            dates: bars.iter().map(|b| b.dt_string.clone()).collect(),
            opens: bars.iter().map(|b| b.open_trade).collect(),
            highs: bars.iter().map(|b| b.high).collect(),
            lows: bars.iter().map(|b| b.low).collect(),
            closes: bars.iter().map(|b| b.unadj_close).collect(),
            volumes: bars.iter().map(|b| b.volume).collect(),
            adj_closes: bars.iter().map(|b| b.adj_close).collect(),
            timestamps: bars.iter().map(|b| b.timestamp).collect(),
            sources: bars.iter().map(|b| b.source.as_str().to_string()).collect(),
        }
    }
}

fn bar_from_row(row: &Row) -> Result<ChartBar, SyncError> {
    let invalid = |err: tokio_postgres::Error| SyncError::Store(format!("invalid bar row: {err}"));
    let source: String = row.try_get(9).map_err(invalid)?;
    Ok(ChartBar {
        ticker: row.try_get(0).map_err(invalid)?,
        dt_string: row.try_get(1).map_err(invalid)?,
        open_trade: row.try_get(2).map_err(invalid)?,
        high: row.try_get(3).map_err(invalid)?,
        low: row.try_get(4).map_err(invalid)?,
        unadj_close: row.try_get(5).map_err(invalid)?,
        volume: row.try_get(6).map_err(invalid)?,
        adj_close: row.try_get(7).map_err(invalid)?,
        timestamp: row.try_get(8).map_err(invalid)?,
        source: DataSource::parse(&source).map_err(SyncError::Store)?,
    })
}

fn record_error(op: &'static str, stage: &'static str) {
    metrics::counter!(
        "tickvault.infra.postgres.errors_total",
        "op" => op,
        "stage" => stage
    )
    .increment(1);
}

pub fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            ticker TEXT NOT NULL,
            dt_string TEXT NOT NULL,
            open_trade DOUBLE PRECISION NOT NULL,
            high DOUBLE PRECISION NOT NULL,
            low DOUBLE PRECISION NOT NULL,
            unadj_close DOUBLE PRECISION NOT NULL,
            volume BIGINT NOT NULL,
            adj_close DOUBLE PRECISION NOT NULL,
            timestamp TIMESTAMPTZ NOT NULL,
            source TEXT NOT NULL CHECK (source IN ('yahoo', 'massive')),
            PRIMARY KEY (ticker, dt_string)
        );"
    )
}

/// Inserts missing rows and rewrites a conflicting row only when one of its
/// values differs, so unchanged rows do not count as affected.
pub fn upsert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} ({COLUMNS})
        SELECT * FROM UNNEST(
            $1::text[], $2::text[], $3::float8[], $4::float8[], $5::float8[],
            $6::float8[], $7::int8[], $8::float8[], $9::timestamptz[], $10::text[]
        )
        ON CONFLICT (ticker, dt_string) DO UPDATE SET
            open_trade = EXCLUDED.open_trade,
            high = EXCLUDED.high,
            low = EXCLUDED.low,
            unadj_close = EXCLUDED.unadj_close,
            volume = EXCLUDED.volume,
            adj_close = EXCLUDED.adj_close,
            timestamp = EXCLUDED.timestamp,
            source = EXCLUDED.source
        WHERE ({table}.open_trade, {table}.high, {table}.low, {table}.unadj_close,
               {table}.volume, {table}.adj_close, {table}.timestamp, {table}.source)
            IS DISTINCT FROM
              (EXCLUDED.open_trade, EXCLUDED.high, EXCLUDED.low, EXCLUDED.unadj_close,
               EXCLUDED.volume, EXCLUDED.adj_close, EXCLUDED.timestamp, EXCLUDED.source)"
    )
}

pub fn validate_table_name(table: &str) -> Result<(), String> {
    if table.is_empty() {
        return Err("table name is empty".to_string());
    }
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 {
        return Err(format!("invalid table name: {table}"));
    }
    for part in parts {
        let mut chars = part.chars();
        let valid_head = chars
            .next()
            .is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
        if !valid_head || !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(format!("invalid table name: {table}"));
        }
    }
    Ok(())
}
