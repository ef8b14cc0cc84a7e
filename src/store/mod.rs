//! Durable cache storage

pub mod csv_store;

pub use csv_store::CacheStore;
