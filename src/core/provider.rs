//! Market-data provider abstraction

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::core::series::Period;

/// One raw OHLCV bar as delivered by a provider, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
}

/// A source of daily historical bars. Implementations are treated as
/// unreliable: any call may fail, and an empty result is an error.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn fetch_history(&self, symbol: &str, period: Period) -> Result<Vec<ProviderBar>>;
}
