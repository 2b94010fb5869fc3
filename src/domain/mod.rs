pub mod repository;
pub mod stats;
