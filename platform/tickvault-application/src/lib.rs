pub mod cache;
pub mod config;
pub mod freshness;
pub mod ledger;
pub mod reconcile;
pub mod ticks;
pub mod upsert;
