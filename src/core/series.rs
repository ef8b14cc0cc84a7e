//! Price series types and core normalization rules

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use crate::core::provider::ProviderBar;

/// Relative lookback window for a historical data request. The identifier is
/// also the provider's `range` parameter and the cache bucket name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Period {
    FiveDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
    Max,
}

impl Period {
    pub const ALL: [Period; 8] = [
        Period::FiveDays,
        Period::OneMonth,
        Period::ThreeMonths,
        Period::SixMonths,
        Period::OneYear,
        Period::TwoYears,
        Period::FiveYears,
        Period::Max,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::FiveDays => "5d",
            Period::OneMonth => "1mo",
            Period::ThreeMonths => "3mo",
            Period::SixMonths => "6mo",
            Period::OneYear => "1y",
            Period::TwoYears => "2y",
            Period::FiveYears => "5y",
            Period::Max => "max",
        }
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "5d" => Ok(Period::FiveDays),
            "1mo" => Ok(Period::OneMonth),
            "3mo" => Ok(Period::ThreeMonths),
            "6mo" => Ok(Period::SixMonths),
            "1y" => Ok(Period::OneYear),
            "2y" => Ok(Period::TwoYears),
            "5y" => Ok(Period::FiveYears),
            "max" => Ok(Period::Max),
            _ => Err(anyhow::anyhow!("Invalid period: {}", s)),
        }
    }
}

/// One trading day of a symbol's history. `pct_change` is the percentage
/// change of the adjusted close against the prior row and is `None` on the
/// first row of a series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: u64,
    pub pct_change: Option<f64>,
}

/// A symbol's history within one period, ordered by date ascending with no
/// duplicate dates.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub symbol: String,
    pub rows: Vec<PriceRow>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, rows: Vec<PriceRow>) -> Self {
        let mut series = PriceSeries {
            symbol: symbol.into(),
            rows,
        };
        series.normalize();
        series
    }

    pub fn from_bars(symbol: impl Into<String>, bars: Vec<ProviderBar>) -> Self {
        let rows = bars
            .into_iter()
            .map(|bar| PriceRow {
                date: bar.date,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                adj_close: bar.adj_close,
                volume: bar.volume,
                pct_change: None,
            })
            .collect();
        PriceSeries::new(symbol, rows)
    }

    /// Sorts by date, collapses duplicate dates (last row wins) and
    /// recomputes `pct_change` from the adjusted close.
    pub fn normalize(&mut self) {
        let deduped: BTreeMap<NaiveDate, PriceRow> = self
            .rows
            .drain(..)
            .map(|row| (row.date, row))
            .collect();
        self.rows = deduped.into_values().collect();
        self.recompute_pct_change();
    }

    /// Derives `pct_change` on the percentage scale: adjusted closes of
    /// [100, 110, 99] yield [None, 10.0, -10.0].
    pub fn recompute_pct_change(&mut self) {
        let mut prior: Option<f64> = None;
        for row in &mut self.rows {
            row.pct_change = match prior {
                Some(prev) if prev != 0.0 && prev.is_finite() => {
                    Some(((row.adj_close - prev) / prev) * 100.0)
                }
                _ => None,
            };
            prior = Some(row.adj_close);
        }
    }

    /// Mean of the available percentage changes, `None` when the series has
    /// no computed change at all.
    pub fn mean_pct_change(&self) -> Option<f64> {
        let changes: Vec<f64> = self.rows.iter().filter_map(|row| row.pct_change).collect();
        if changes.is_empty() {
            return None;
        }
        Some(changes.iter().sum::<f64>() / changes.len() as f64)
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        match (self.rows.first(), self.rows.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Everything persisted for one period: the per-symbol series plus the date
/// the bucket was last refreshed.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub period: Period,
    pub fetched_on: NaiveDate,
    pub series: BTreeMap<String, PriceSeries>,
}

impl CacheSnapshot {
    pub fn new(period: Period, fetched_on: NaiveDate) -> Self {
        CacheSnapshot {
            period,
            fetched_on,
            series: BTreeMap::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.series.values().map(PriceSeries::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(PriceSeries::is_empty)
    }
}
