pub mod engine;
pub mod obs;
pub mod scheduler;
