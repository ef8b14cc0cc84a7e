//! Core business logic abstractions

pub mod analytics;
pub mod config;
pub mod freshness;
pub mod log;
pub mod manager;
pub mod provider;
pub mod retry;
pub mod sectors;
pub mod series;
