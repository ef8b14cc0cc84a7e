//! Statistics derived from cached price series.
//!
//! Everything here is a pure function over pre-fetched series maps; pages
//! fetch through the data manager and hand the result down.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::core::sectors::Sector;
use crate::core::series::PriceSeries;

/// Pairwise correlation of daily percentage changes. `symbols` keeps the
/// caller's ordering; `cells[i][j]` is `None` when the pair has fewer than
/// two overlapping observations or one side has zero variance.
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    pub symbols: Vec<String>,
    pub cells: Vec<Vec<Option<f64>>>,
}

/// A sector's ranking entry: the mean of its members' mean percentage
/// changes, plus the per-member breakdown.
#[derive(Debug, Clone)]
pub struct SectorPerformance {
    pub sector: String,
    pub average_change: Option<f64>,
    pub members: Vec<(String, Option<f64>)>,
}

/// Divergence of an ETF against the weighted average of its holdings, both
/// normalized to 100 at the first common date. Values are in index points.
#[derive(Debug, Clone)]
pub struct DivergenceStats {
    pub max: f64,
    pub min: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub current: f64,
    pub crossovers: usize,
    pub observations: usize,
}

/// Standard Pearson correlation coefficient. `None` when the slices differ
/// in length, have fewer than two points, or either side has zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}

fn pct_change_observations(series: &PriceSeries) -> BTreeMap<NaiveDate, f64> {
    series
        .rows
        .iter()
        .filter_map(|row| row.pct_change.map(|change| (row.date, change)))
        .collect()
}

/// Builds the pairwise correlation matrix of date-aligned percentage
/// changes. Symbols missing from `data` or with zero observations are
/// dropped from the matrix entirely; the rest keep the order of
/// `ordered_symbols`.
pub fn correlation_matrix(
    data: &BTreeMap<String, PriceSeries>,
    ordered_symbols: &[String],
) -> CorrelationMatrix {
    let mut observations: Vec<(String, BTreeMap<NaiveDate, f64>)> = Vec::new();
    for symbol in ordered_symbols {
        match data.get(symbol) {
            Some(series) => {
                let obs = pct_change_observations(series);
                if obs.is_empty() {
                    debug!("Excluding {symbol} from matrix: no observations");
                } else {
                    observations.push((symbol.clone(), obs));
                }
            }
            None => debug!("Excluding {symbol} from matrix: no data"),
        }
    }

    let n = observations.len();
    let mut cells = vec![vec![None; n]; n];
    for i in 0..n {
        cells[i][i] = Some(1.0);
        for j in (i + 1)..n {
            let (_, ref obs_i) = observations[i];
            let (_, ref obs_j) = observations[j];
            let mut xs = Vec::new();
            let mut ys = Vec::new();
            for (date, x) in obs_i {
                if let Some(y) = obs_j.get(date) {
                    xs.push(*x);
                    ys.push(*y);
                }
            }
            let r = pearson(&xs, &ys);
            cells[i][j] = r;
            cells[j][i] = r;
        }
    }

    CorrelationMatrix {
        symbols: observations.into_iter().map(|(symbol, _)| symbol).collect(),
        cells,
    }
}

/// Ranks sectors by the mean of their members' mean percentage changes,
/// descending; sectors with no valid members sort last with `None`.
pub fn rank_sector_performance(
    data: &BTreeMap<String, PriceSeries>,
    sectors: &[Sector],
) -> Vec<SectorPerformance> {
    let mut ranked: Vec<SectorPerformance> = sectors
        .iter()
        .map(|sector| {
            let members: Vec<(String, Option<f64>)> = sector
                .symbols
                .iter()
                .map(|symbol| {
                    let mean = data.get(symbol).and_then(PriceSeries::mean_pct_change);
                    (symbol.clone(), mean)
                })
                .collect();
            let valid: Vec<f64> = members.iter().filter_map(|(_, mean)| *mean).collect();
            let average_change = if valid.is_empty() {
                None
            } else {
                Some(valid.iter().sum::<f64>() / valid.len() as f64)
            };
            SectorPerformance {
                sector: sector.name.clone(),
                average_change,
                members,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        let a = a.average_change.unwrap_or(f64::NEG_INFINITY);
        let b = b.average_change.unwrap_or(f64::NEG_INFINITY);
        b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

/// Computes divergence stats for an ETF against the weighted average of its
/// holdings, using adjusted close. Weights whose sum drifts outside
/// [0.98, 1.02] are renormalized. `None` when no holding has data or the
/// two series share no dates.
pub fn etf_divergence(
    etf: &PriceSeries,
    weights: &BTreeMap<String, f64>,
    holdings_data: &BTreeMap<String, PriceSeries>,
) -> Option<DivergenceStats> {
    let total: f64 = weights.values().sum();
    let weights: BTreeMap<&str, f64> = if total > 0.0 && !(0.98..=1.02).contains(&total) {
        warn!("Holdings weights sum to {total:.4}, renormalizing");
        weights
            .iter()
            .map(|(symbol, weight)| (symbol.as_str(), weight / total))
            .collect()
    } else {
        weights
            .iter()
            .map(|(symbol, weight)| (symbol.as_str(), *weight))
            .collect()
    };

    let mut basket: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for (symbol, weight) in &weights {
        if let Some(series) = holdings_data.get(*symbol) {
            for row in &series.rows {
                *basket.entry(row.date).or_insert(0.0) += weight * row.adj_close;
            }
        } else {
            debug!("No data for holding {symbol}, excluded from basket");
        }
    }
    if basket.is_empty() {
        return None;
    }

    let etf_by_date: BTreeMap<NaiveDate, f64> = etf
        .rows
        .iter()
        .map(|row| (row.date, row.adj_close))
        .collect();
    let common: Vec<NaiveDate> = etf_by_date
        .keys()
        .filter(|date| basket.contains_key(date))
        .copied()
        .collect();
    let first = *common.first()?;

    let etf_base = etf_by_date[&first];
    let basket_base = basket[&first];
    if etf_base == 0.0 || basket_base == 0.0 {
        return None;
    }

    let divergence: Vec<f64> = common
        .iter()
        .map(|date| etf_by_date[date] / etf_base * 100.0 - basket[date] / basket_base * 100.0)
        .collect();

    let n = divergence.len() as f64;
    let mean = divergence.iter().sum::<f64>() / n;
    let std_dev = if divergence.len() > 1 {
        (divergence.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
    } else {
        0.0
    };

    Some(DivergenceStats {
        max: divergence.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        min: divergence.iter().copied().fold(f64::INFINITY, f64::min),
        mean,
        std_dev,
        current: *divergence.last()?,
        crossovers: divergence.windows(2).filter(|w| w[0] * w[1] <= 0.0).count(),
        observations: divergence.len(),
    })
}
