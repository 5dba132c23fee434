pub mod bar;
pub mod job;
pub mod tick;
pub mod ticker;
