pub mod memory_bars;
pub mod postgres_bars;
