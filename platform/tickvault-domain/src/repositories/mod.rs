pub mod bar_store;
pub mod providers;
