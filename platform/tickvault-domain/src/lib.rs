pub mod error;
pub mod repositories;
pub mod value_objects;
