//! Orchestrates the cache store, the freshness policy and the provider.
//!
//! The public surface never returns an error: provider failures drop the
//! affected symbol, storage failures are logged, and an empty map means
//! "no data available".

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{Local, NaiveDate};
use futures::StreamExt;
use futures::stream;
use tracing::{debug, error, info, warn};

use crate::core::freshness;
use crate::core::provider::HistoryProvider;
use crate::core::retry::with_retry;
use crate::core::sectors::{Sector, SectorRegistry};
use crate::core::series::{CacheSnapshot, Period, PriceSeries};
use crate::store::CacheStore;

const FETCH_ATTEMPTS: usize = 3;
const RETRY_DELAY_MS: u64 = 500;
const MAX_IN_FLIGHT: usize = 4;

/// Aggregate view of one period's cache, for the status page.
#[derive(Debug, Clone)]
pub struct CacheSummary {
    pub symbol_count: usize,
    pub row_count: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub refreshed_on: NaiveDate,
    pub age_days: i64,
}

/// Single entry point for price data. Owns the store, the provider handle
/// and the sector registry; constructed once per process.
pub struct DataManager {
    provider: Arc<dyn HistoryProvider>,
    store: CacheStore,
    registry: SectorRegistry,
}

impl DataManager {
    pub fn new(
        provider: Arc<dyn HistoryProvider>,
        store: CacheStore,
        registry: SectorRegistry,
    ) -> Self {
        DataManager {
            provider,
            store,
            registry,
        }
    }

    /// Returns the series for exactly the requested symbols, serving from
    /// the cache when the period's bucket is fresh and refetching it
    /// wholesale otherwise. Symbols that fail every attempt are dropped.
    pub async fn get_stock_data(
        &self,
        symbols: &[String],
        period: Period,
    ) -> BTreeMap<String, PriceSeries> {
        let today = Local::now().date_naive();
        if let Some(snapshot) = self.store.load(period).await {
            if !freshness::is_stale(period, Some(snapshot.fetched_on), today)
                && !snapshot.is_empty()
            {
                debug!(period = %period, "Serving {} requested symbols from cache", symbols.len());
                return filter_snapshot(&snapshot, symbols);
            }
            debug!(period = %period, "Cache is stale, refetching");
        } else {
            debug!(period = %period, "Cache miss");
        }
        self.download_fresh(symbols, period).await
    }

    /// Runs `get_stock_data` over the full sector universe, falling back to
    /// a forced download when the fresh bucket contains none of it.
    pub async fn get_segmented_data(&self, period: Period) -> BTreeMap<String, PriceSeries> {
        let symbols = self.registry.all_symbols();
        let data = self.get_stock_data(&symbols, period).await;
        if data.is_empty() {
            info!("No cached data matched the universe, downloading fresh");
            return self.download_fresh(&symbols, period).await;
        }
        data
    }

    /// Force-refetch path: fetches every requested symbol (bounded retries,
    /// bounded concurrency), replaces the period's bucket with the result
    /// and stamps the ledger. Persist failures are logged; the in-memory
    /// result is returned regardless.
    pub async fn download_fresh(
        &self,
        symbols: &[String],
        period: Period,
    ) -> BTreeMap<String, PriceSeries> {
        info!(period = %period, "Fetching fresh data for {} symbols", symbols.len());

        let fetches: Vec<(String, Result<PriceSeries>)> = stream::iter(symbols.iter().cloned())
            .map(|symbol| async move {
                let result = self.fetch_one(&symbol, period).await;
                (symbol, result)
            })
            .buffer_unordered(MAX_IN_FLIGHT)
            .collect()
            .await;

        let mut series_map = BTreeMap::new();
        for (symbol, result) in fetches {
            match result {
                Ok(series) => {
                    series_map.insert(symbol, series);
                }
                Err(e) => {
                    error!("Dropping {symbol} after {FETCH_ATTEMPTS} attempts: {e}");
                }
            }
        }

        if series_map.is_empty() {
            error!(period = %period, "No data could be fetched");
            return BTreeMap::new();
        }

        let mut snapshot = CacheSnapshot::new(period, Local::now().date_naive());
        snapshot.series = series_map.clone();
        if let Err(e) = self.store.save(&snapshot).await {
            warn!("Failed to persist cache for {period}: {e}");
        }
        series_map
    }

    async fn fetch_one(&self, symbol: &str, period: Period) -> Result<PriceSeries> {
        let bars = with_retry(
            || async {
                let bars = self.provider.fetch_history(symbol, period).await?;
                if bars.is_empty() {
                    bail!("Provider returned no rows for {symbol}");
                }
                Ok(bars)
            },
            FETCH_ATTEMPTS,
            RETRY_DELAY_MS,
        )
        .await?;
        Ok(PriceSeries::from_bars(symbol, bars))
    }

    /// Deletes the persisted cache; failures are logged, never surfaced.
    pub async fn clear_cache(&self) {
        match self.store.clear().await {
            Ok(()) => info!("Cache cleared"),
            Err(e) => error!("Failed to clear cache: {e}"),
        }
    }

    pub async fn cache_summary(&self, period: Period) -> Option<CacheSummary> {
        let snapshot = self.store.load(period).await?;
        let today = Local::now().date_naive();

        let mut date_range: Option<(NaiveDate, NaiveDate)> = None;
        for series in snapshot.series.values() {
            if let Some((first, last)) = series.date_range() {
                date_range = Some(match date_range {
                    Some((lo, hi)) => (lo.min(first), hi.max(last)),
                    None => (first, last),
                });
            }
        }

        Some(CacheSummary {
            symbol_count: snapshot.series.len(),
            row_count: snapshot.row_count(),
            date_range,
            refreshed_on: snapshot.fetched_on,
            age_days: (today - snapshot.fetched_on).num_days(),
        })
    }

    pub async fn cached_symbols(&self, period: Period) -> BTreeSet<String> {
        self.store
            .load(period)
            .await
            .map(|snapshot| snapshot.series.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn freshness_ledger(&self) -> BTreeMap<Period, NaiveDate> {
        self.store.ledger().await
    }

    pub fn sectors(&self) -> &[Sector] {
        self.registry.sectors()
    }

    pub fn get_all_symbols(&self) -> Vec<String> {
        self.registry.all_symbols()
    }
}

fn filter_snapshot(
    snapshot: &CacheSnapshot,
    symbols: &[String],
) -> BTreeMap<String, PriceSeries> {
    let mut out = BTreeMap::new();
    for symbol in symbols {
        if let Some(series) = snapshot.series.get(symbol) {
            if !series.is_empty() {
                let mut series = series.clone();
                // Never trust persisted pct_change.
                series.recompute_pct_change();
                out.insert(symbol.clone(), series);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::provider::ProviderBar;
    use crate::core::series::PriceRow;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bar(d: NaiveDate, adj_close: f64) -> ProviderBar {
        ProviderBar {
            date: d,
            open: adj_close,
            high: adj_close,
            low: adj_close,
            close: adj_close,
            adj_close,
            volume: 1000,
        }
    }

    fn row(d: NaiveDate, adj_close: f64) -> PriceRow {
        PriceRow {
            date: d,
            open: adj_close,
            high: adj_close,
            low: adj_close,
            close: adj_close,
            adj_close,
            volume: 1000,
            pct_change: None,
        }
    }

    struct MockProvider {
        calls: Mutex<HashMap<String, usize>>,
        failing: HashSet<String>,
    }

    impl MockProvider {
        fn new() -> Self {
            MockProvider {
                calls: Mutex::new(HashMap::new()),
                failing: HashSet::new(),
            }
        }

        fn failing(symbols: &[&str]) -> Self {
            MockProvider {
                calls: Mutex::new(HashMap::new()),
                failing: symbols.iter().map(|s| s.to_string()).collect(),
            }
        }

        fn call_count(&self, symbol: &str) -> usize {
            *self.calls.lock().unwrap().get(symbol).unwrap_or(&0)
        }
    }

    #[async_trait]
    impl HistoryProvider for MockProvider {
        async fn fetch_history(&self, symbol: &str, _period: Period) -> Result<Vec<ProviderBar>> {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(symbol.to_string())
                .or_insert(0) += 1;
            if self.failing.contains(symbol) {
                bail!("provider down");
            }
            Ok(vec![
                bar(date(2024, 1, 2), 100.0),
                bar(date(2024, 1, 3), 110.0),
                bar(date(2024, 1, 4), 99.0),
            ])
        }
    }

    fn registry(symbols: &[&str]) -> SectorRegistry {
        SectorRegistry::new(vec![Sector {
            name: "Test".to_string(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        }])
    }

    fn manager(dir: &TempDir, provider: Arc<MockProvider>, universe: &[&str]) -> DataManager {
        DataManager::new(provider, CacheStore::new(dir.path()), registry(universe))
    }

    fn symbols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fetches_and_caches_on_first_call() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new());
        let manager = manager(&dir, Arc::clone(&provider), &["AAPL"]);

        let data = manager
            .get_stock_data(&symbols(&["AAPL"]), Period::OneMonth)
            .await;
        assert_eq!(data.len(), 1);
        let series = &data["AAPL"];
        assert_eq!(series.len(), 3);
        assert!((series.rows[1].pct_change.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(provider.call_count("AAPL"), 1);

        // Immediate second read serves from cache with identical content.
        let again = manager
            .get_stock_data(&symbols(&["AAPL"]), Period::OneMonth)
            .await;
        assert_eq!(again, data);
        assert_eq!(provider.call_count("AAPL"), 1);
    }

    #[tokio::test]
    async fn test_stale_ledger_triggers_refetch() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new());
        let manager = manager(&dir, Arc::clone(&provider), &["AAPL"]);

        // Backdated bucket: daily cadence makes a 3-day-old entry stale.
        let store = CacheStore::new(dir.path());
        let today = Local::now().date_naive();
        let mut snapshot = CacheSnapshot::new(Period::OneMonth, today - Duration::days(3));
        snapshot.series.insert(
            "AAPL".to_string(),
            PriceSeries::new("AAPL", vec![row(date(2023, 6, 1), 50.0)]),
        );
        store.save(&snapshot).await.unwrap();

        let data = manager
            .get_stock_data(&symbols(&["AAPL"]), Period::OneMonth)
            .await;
        assert_eq!(provider.call_count("AAPL"), 1);
        // The stale row is gone; the bucket now holds the refetched series.
        assert_eq!(data["AAPL"].rows[0].date, date(2024, 1, 2));
        let reloaded = store.load(Period::OneMonth).await.unwrap();
        assert_eq!(reloaded.fetched_on, today);
    }

    #[tokio::test]
    async fn test_fresh_cache_is_not_refetched() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new());
        let manager = manager(&dir, Arc::clone(&provider), &["AAPL"]);

        let store = CacheStore::new(dir.path());
        let today = Local::now().date_naive();
        let mut snapshot = CacheSnapshot::new(Period::OneMonth, today);
        snapshot.series.insert(
            "AAPL".to_string(),
            PriceSeries::new(
                "AAPL",
                vec![row(date(2023, 6, 1), 50.0), row(date(2023, 6, 2), 55.0)],
            ),
        );
        store.save(&snapshot).await.unwrap();

        let data = manager
            .get_stock_data(&symbols(&["AAPL"]), Period::OneMonth)
            .await;
        assert_eq!(provider.call_count("AAPL"), 0);
        assert_eq!(data["AAPL"].rows[0].date, date(2023, 6, 1));
        assert!((data["AAPL"].rows[1].pct_change.unwrap() - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_partial_failure_drops_only_failing_symbols() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::failing(&["BAD1", "BAD2"]));
        let universe = ["AAPL", "MSFT", "NVDA", "BAD1", "BAD2"];
        let manager = manager(&dir, Arc::clone(&provider), &universe);

        let data = manager
            .get_stock_data(&symbols(&universe), Period::OneMonth)
            .await;
        assert_eq!(
            data.keys().collect::<Vec<_>>(),
            vec!["AAPL", "MSFT", "NVDA"]
        );
        // Failing symbols exhausted all attempts.
        assert_eq!(provider.call_count("BAD1"), 3);
        assert_eq!(provider.call_count("AAPL"), 1);

        // Only the successes were persisted.
        let cached = manager.cached_symbols(Period::OneMonth).await;
        assert_eq!(
            cached.iter().collect::<Vec<_>>(),
            vec!["AAPL", "MSFT", "NVDA"]
        );
    }

    #[tokio::test]
    async fn test_total_failure_returns_empty_map_and_persists_nothing() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::failing(&["BAD"]));
        let manager = manager(&dir, Arc::clone(&provider), &["BAD"]);

        let data = manager
            .get_stock_data(&symbols(&["BAD"]), Period::OneMonth)
            .await;
        assert!(data.is_empty());
        assert!(manager.freshness_ledger().await.is_empty());
    }

    #[tokio::test]
    async fn test_persist_failure_still_returns_fetched_data() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new());
        let manager = manager(&dir, Arc::clone(&provider), &["AAPL"]);

        // A plain file where the bucket directory belongs makes save fail.
        std::fs::write(dir.path().join("1mo"), "blocked").unwrap();

        let data = manager
            .get_stock_data(&symbols(&["AAPL"]), Period::OneMonth)
            .await;
        assert_eq!(data.len(), 1);
        assert_eq!(data["AAPL"].len(), 3);
        // Nothing was persisted, so the ledger stays unstamped.
        assert!(manager.freshness_ledger().await.is_empty());
    }

    #[tokio::test]
    async fn test_clear_cache_forces_refetch() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new());
        let manager = manager(&dir, Arc::clone(&provider), &["AAPL"]);

        manager
            .get_stock_data(&symbols(&["AAPL"]), Period::OneMonth)
            .await;
        manager.clear_cache().await;
        manager
            .get_stock_data(&symbols(&["AAPL"]), Period::OneMonth)
            .await;
        assert_eq!(provider.call_count("AAPL"), 2);
    }

    #[tokio::test]
    async fn test_filter_returns_only_requested_symbols() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new());
        let manager = manager(&dir, Arc::clone(&provider), &["AAPL", "MSFT"]);

        manager
            .get_stock_data(&symbols(&["AAPL", "MSFT"]), Period::OneMonth)
            .await;
        let data = manager
            .get_stock_data(&symbols(&["AAPL"]), Period::OneMonth)
            .await;
        assert_eq!(data.keys().collect::<Vec<_>>(), vec!["AAPL"]);
        assert_eq!(provider.call_count("AAPL"), 1);
        assert_eq!(provider.call_count("MSFT"), 1);
    }

    #[tokio::test]
    async fn test_segmented_data_falls_back_when_fresh_bucket_misses_universe() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new());
        let manager = manager(&dir, Arc::clone(&provider), &["AAPL"]);

        // Fresh bucket that holds none of the universe.
        let store = CacheStore::new(dir.path());
        let today = Local::now().date_naive();
        let mut snapshot = CacheSnapshot::new(Period::OneMonth, today);
        snapshot.series.insert(
            "ZZZZ".to_string(),
            PriceSeries::new("ZZZZ", vec![row(date(2023, 6, 1), 1.0)]),
        );
        store.save(&snapshot).await.unwrap();

        let data = manager.get_segmented_data(Period::OneMonth).await;
        assert_eq!(data.keys().collect::<Vec<_>>(), vec!["AAPL"]);
        assert_eq!(provider.call_count("AAPL"), 1);
    }

    #[tokio::test]
    async fn test_cache_summary_reflects_snapshot() {
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(MockProvider::new());
        let manager = manager(&dir, Arc::clone(&provider), &["AAPL", "MSFT"]);

        assert!(manager.cache_summary(Period::OneMonth).await.is_none());

        manager
            .get_stock_data(&symbols(&["AAPL", "MSFT"]), Period::OneMonth)
            .await;
        let summary = manager.cache_summary(Period::OneMonth).await.unwrap();
        assert_eq!(summary.symbol_count, 2);
        assert_eq!(summary.row_count, 6);
        assert_eq!(
            summary.date_range,
            Some((date(2024, 1, 2), date(2024, 1, 4)))
        );
        assert_eq!(summary.age_days, 0);
    }
}
