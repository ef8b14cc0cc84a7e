use super::ui;
use crate::core::analytics::{self, DivergenceStats};
use crate::core::manager::DataManager;
use crate::core::series::{Period, PriceSeries};
use anyhow::{Result, bail};
use comfy_table::Cell;
use std::collections::BTreeMap;

/// Top holdings and index weights for the supported ETFs. Weights are
/// partial baskets (top constituents only) and get renormalized by the
/// divergence calculation.
pub fn builtin_holdings() -> BTreeMap<&'static str, BTreeMap<String, f64>> {
    fn weights(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(symbol, weight)| (symbol.to_string(), *weight))
            .collect()
    }

    BTreeMap::from([
        (
            "GDXJ",
            weights(&[
                ("PAAS", 0.0713),
                ("AGI", 0.0645),
                ("EVN", 0.0640),
                ("HMY", 0.0604),
                ("BTG", 0.0482),
                ("OR", 0.0225),
                ("HL", 0.0215),
                ("EDV", 0.0209),
            ]),
        ),
        (
            "XRT",
            weights(&[
                ("CVNA", 0.0229),
                ("WRBY", 0.0208),
                ("VSCO", 0.0196),
                ("SFM", 0.0187),
                ("LAD", 0.0175),
                ("RVLV", 0.0172),
                ("GME", 0.0168),
                ("DDS", 0.0162),
            ]),
        ),
        (
            "GDX",
            weights(&[
                ("NEM", 0.1227),
                ("AEM", 0.1017),
                ("GOLD", 0.0769),
                ("WPM", 0.0703),
                ("FNV", 0.0578),
            ]),
        ),
        (
            "SMH",
            weights(&[
                ("NVDA", 0.2150),
                ("TSM", 0.1450),
                ("ASML", 0.1120),
                ("AMD", 0.0950),
                ("AVGO", 0.0850),
            ]),
        ),
        (
            "XHB",
            weights(&[
                ("DHI", 0.1250),
                ("LEN", 0.1150),
                ("PHM", 0.0950),
                ("NVR", 0.0850),
                ("TOL", 0.0750),
            ]),
        ),
        (
            "XLK",
            weights(&[
                ("AAPL", 0.2150),
                ("MSFT", 0.2050),
                ("NVDA", 0.1550),
                ("AVGO", 0.0450),
                ("AMD", 0.0350),
            ]),
        ),
        (
            "IWM",
            weights(&[
                ("CRGY", 0.0025),
                ("CELH", 0.0024),
                ("MEDP", 0.0023),
                ("PODD", 0.0022),
                ("TECH", 0.0021),
            ]),
        ),
    ])
}

/// Renders the ETF divergence page: the ETF's track against the weighted
/// average of its top holdings, both indexed to 100.
pub async fn run(manager: &DataManager, etf_symbol: &str, period: Period) -> Result<()> {
    let holdings = builtin_holdings();
    let Some(weights) = holdings.get(etf_symbol) else {
        let supported: Vec<&str> = holdings.keys().copied().collect();
        bail!(
            "Unsupported ETF '{etf_symbol}'. Supported: {}",
            supported.join(", ")
        );
    };

    let mut requested: Vec<String> = vec![etf_symbol.to_string()];
    requested.extend(weights.keys().cloned());

    let spinner = ui::new_spinner(&format!("Loading {period} data for {etf_symbol}..."));
    let mut data = manager.get_stock_data(&requested, period).await;

    // ETF constituents mostly live outside the sector universe, so a fresh
    // cache bucket usually misses them. Fetch the gap directly.
    let missing: Vec<String> = requested
        .iter()
        .filter(|symbol| !data.contains_key(*symbol))
        .cloned()
        .collect();
    if !missing.is_empty() {
        let fetched = manager.download_fresh(&missing, period).await;
        data.extend(fetched);
    }
    spinner.finish_and_clear();

    let Some(etf_series) = data.get(etf_symbol) else {
        println!(
            "{}",
            ui::style_text(
                &format!("No price data available for {etf_symbol}."),
                ui::StyleType::Error
            )
        );
        return Ok(());
    };

    println!(
        "\n{} ({period})",
        ui::style_text(
            &format!("{etf_symbol} vs Top Holdings"),
            ui::StyleType::Title
        )
    );
    display_holdings(weights, &data);

    match analytics::etf_divergence(etf_series, weights, &data) {
        Some(stats) => {
            ui::print_separator();
            display_stats(&stats);
        }
        None => println!(
            "{}",
            ui::style_text(
                "Not enough overlapping data to compute divergence.",
                ui::StyleType::Error
            )
        ),
    }
    Ok(())
}

fn display_holdings(weights: &BTreeMap<String, f64>, data: &BTreeMap<String, PriceSeries>) {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Holding"),
        ui::header_cell("Weight"),
        ui::header_cell("Avg Daily Change"),
    ]);

    for (symbol, weight) in weights {
        let mean = data.get(symbol).and_then(PriceSeries::mean_pct_change);
        let change_cell = match mean {
            Some(change) => ui::change_cell(change),
            None => ui::na_cell(true),
        };
        table.add_row(vec![
            Cell::new(symbol),
            Cell::new(format!("{:.2}%", weight * 100.0)),
            change_cell,
        ]);
    }

    println!("{table}");
}

fn display_stats(stats: &DivergenceStats) {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Statistic"),
        ui::header_cell("Value"),
    ]);

    let point = |v: f64| format!("{v:.2}");
    table.add_row(vec![
        Cell::new("Current Divergence"),
        Cell::new(point(stats.current)),
    ]);
    table.add_row(vec![Cell::new("Mean"), Cell::new(point(stats.mean))]);
    table.add_row(vec![Cell::new("Std Dev"), Cell::new(point(stats.std_dev))]);
    table.add_row(vec![Cell::new("Max"), Cell::new(point(stats.max))]);
    table.add_row(vec![Cell::new("Min"), Cell::new(point(stats.min))]);
    table.add_row(vec![
        Cell::new("Crossovers"),
        Cell::new(stats.crossovers.to_string()),
    ]);
    table.add_row(vec![
        Cell::new("Observations"),
        Cell::new(stats.observations.to_string()),
    ]);

    println!("{table}");
}
