//! CSV-backed price cache.
//!
//! Layout:
//!   {cache_dir}/ledger.json          period -> last refresh date
//!   {cache_dir}/{period}/{SYMBOL}.csv
//!
//! Writes are atomic (write to .tmp, rename into place). A bucket with any
//! unparsable file is treated as a cache miss so the caller refetches it
//! wholesale.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::core::series::{CacheSnapshot, Period, PriceRow, PriceSeries};

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Adj Close")]
    adj_close: f64,
    #[serde(rename = "Volume")]
    volume: u64,
    #[serde(rename = "Symbol")]
    symbol: String,
    #[serde(rename = "Pct_Change")]
    pct_change: Option<f64>,
}

/// Durable store for price data, one bucket per period. The internal mutex
/// serializes all filesystem access; there is at most one writer at a time.
pub struct CacheStore {
    cache_dir: PathBuf,
    lock: Mutex<()>,
}

impl CacheStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        CacheStore {
            cache_dir: cache_dir.into(),
            lock: Mutex::new(()),
        }
    }

    fn bucket_dir(&self, period: Period) -> PathBuf {
        self.cache_dir.join(period.as_str())
    }

    fn ledger_path(&self) -> PathBuf {
        self.cache_dir.join("ledger.json")
    }

    /// Loads the snapshot for a period. `None` when the ledger has no entry,
    /// the bucket directory is missing or empty, or any file in it fails to
    /// parse (logged; the caller treats this as a miss and refetches).
    pub async fn load(&self, period: Period) -> Option<CacheSnapshot> {
        let _guard = self.lock.lock().await;

        let ledger = read_ledger(&self.ledger_path());
        let refreshed_on = *ledger.get(&period)?;
        let dir = self.bucket_dir(period);
        if !dir.is_dir() {
            return None;
        }

        let mut snapshot = CacheSnapshot::new(period, refreshed_on);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to read cache bucket {}: {e}", dir.display());
                return None;
            }
        };
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    error!("Failed to read cache bucket {}: {e}", dir.display());
                    return None;
                }
            };
            if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
                continue;
            }
            match read_series(&path) {
                Ok(series) => {
                    snapshot.series.insert(series.symbol.clone(), series);
                }
                Err(e) => {
                    error!("Corrupt cache file {}: {e}", path.display());
                    return None;
                }
            }
        }

        if snapshot.series.is_empty() {
            return None;
        }
        debug!(
            period = %period,
            "Loaded {} cached series ({} rows)",
            snapshot.series.len(),
            snapshot.row_count()
        );
        Some(snapshot)
    }

    /// Replaces the period's bucket with exactly the snapshot's series and
    /// stamps the ledger entry with `snapshot.fetched_on`.
    pub async fn save(&self, snapshot: &CacheSnapshot) -> Result<()> {
        let _guard = self.lock.lock().await;

        let dir = self.bucket_dir(snapshot.period);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to clear cache bucket {}", dir.display()))?;
        }
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache bucket {}", dir.display()))?;

        for (symbol, series) in &snapshot.series {
            if series.is_empty() {
                continue;
            }
            write_series(&dir, symbol, series)?;
        }

        let mut ledger = read_ledger(&self.ledger_path());
        ledger.insert(snapshot.period, snapshot.fetched_on);
        write_ledger(&self.ledger_path(), &ledger)?;

        debug!(
            period = %snapshot.period,
            "Saved {} series ({} rows)",
            snapshot.series.len(),
            snapshot.row_count()
        );
        Ok(())
    }

    /// Deletes the entire cache directory, all periods and the ledger.
    /// Idempotent.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir).with_context(|| {
                format!("Failed to remove cache dir {}", self.cache_dir.display())
            })?;
        }
        Ok(())
    }

    /// Read-only view of the freshness ledger; empty when absent or
    /// unreadable.
    pub async fn ledger(&self) -> BTreeMap<Period, NaiveDate> {
        let _guard = self.lock.lock().await;
        read_ledger(&self.ledger_path())
    }
}

fn read_series(path: &Path) -> Result<PriceSeries> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut symbol: Option<String> = None;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        let record: CsvRow = record.with_context(|| format!("Bad row in {}", path.display()))?;
        symbol.get_or_insert(record.symbol);
        rows.push(PriceRow {
            date: record.date,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            adj_close: record.adj_close,
            volume: record.volume,
            pct_change: record.pct_change,
        });
    }
    let Some(symbol) = symbol else {
        bail!("Empty cache file {}", path.display());
    };
    // Normalization re-sorts and recomputes pct_change from adjusted close.
    Ok(PriceSeries::new(symbol, rows))
}

fn write_series(dir: &Path, symbol: &str, series: &PriceSeries) -> Result<()> {
    let path = dir.join(format!("{symbol}.csv"));
    let tmp = dir.join(format!("{symbol}.csv.tmp"));

    let mut writer =
        csv::Writer::from_path(&tmp).with_context(|| format!("Failed to open {}", tmp.display()))?;
    for row in &series.rows {
        writer.serialize(CsvRow {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            adj_close: row.adj_close,
            volume: row.volume,
            symbol: symbol.to_string(),
            pct_change: row.pct_change,
        })?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to flush {}", tmp.display()))?;
    drop(writer);

    fs::rename(&tmp, &path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        anyhow::anyhow!("Atomic rename failed for {}: {e}", path.display())
    })?;
    Ok(())
}

fn read_ledger(path: &Path) -> BTreeMap<Period, NaiveDate> {
    let Ok(content) = fs::read_to_string(path) else {
        return BTreeMap::new();
    };
    let raw: BTreeMap<String, NaiveDate> = match serde_json::from_str(&content) {
        Ok(raw) => raw,
        Err(e) => {
            error!("Unreadable ledger {}: {e}", path.display());
            return BTreeMap::new();
        }
    };
    raw.into_iter()
        .filter_map(|(key, date)| key.parse::<Period>().ok().map(|period| (period, date)))
        .collect()
}

fn write_ledger(path: &Path, ledger: &BTreeMap<Period, NaiveDate>) -> Result<()> {
    let raw: BTreeMap<&str, NaiveDate> = ledger
        .iter()
        .map(|(period, date)| (period.as_str(), *date))
        .collect();
    let json = serde_json::to_string_pretty(&raw).context("Failed to serialize ledger")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        anyhow::anyhow!("Atomic rename failed for {}: {e}", path.display())
    })?;
    Ok(())
}
