use super::ui;
use crate::core::freshness;
use crate::core::manager::DataManager;
use crate::core::series::Period;
use anyhow::Result;
use chrono::Local;
use comfy_table::{Attribute, Cell, Color};

/// Renders the cache status page: one row per period bucket plus sector
/// coverage for the requested period.
pub async fn run(manager: &DataManager, period: Period) -> Result<()> {
    println!(
        "\n{}",
        ui::style_text("Cache Status", ui::StyleType::Title)
    );
    display_buckets(manager).await;
    ui::print_separator();
    println!(
        "{} ({period})",
        ui::style_text("Sector Coverage", ui::StyleType::Title)
    );
    display_coverage(manager, period).await;
    Ok(())
}

async fn display_buckets(manager: &DataManager) {
    let today = Local::now().date_naive();
    let ledger = manager.freshness_ledger().await;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Period"),
        ui::header_cell("Symbols"),
        ui::header_cell("Rows"),
        ui::header_cell("Date Range"),
        ui::header_cell("Refreshed"),
        ui::header_cell("Age"),
        ui::header_cell("State"),
    ]);

    for period in Period::ALL {
        let refreshed_on = ledger.get(&period).copied();
        let summary = manager.cache_summary(period).await;

        let state_cell = if summary.is_none() {
            Cell::new("empty").fg(Color::DarkGrey)
        } else if freshness::is_stale(period, refreshed_on, today) {
            Cell::new("stale").fg(Color::Yellow)
        } else {
            Cell::new("fresh").fg(Color::Green)
        };

        match summary {
            Some(summary) => {
                let range = summary
                    .date_range
                    .map(|(first, last)| format!("{first} to {last}"));
                table.add_row(vec![
                    Cell::new(period.as_str()).add_attribute(Attribute::Bold),
                    Cell::new(summary.symbol_count.to_string()),
                    Cell::new(summary.row_count.to_string()),
                    ui::format_optional_cell(range, |r| r),
                    Cell::new(summary.refreshed_on.to_string()),
                    Cell::new(format!("{}d", summary.age_days)),
                    state_cell,
                ]);
            }
            None => {
                table.add_row(vec![
                    Cell::new(period.as_str()).add_attribute(Attribute::Bold),
                    ui::na_cell(false),
                    ui::na_cell(false),
                    ui::na_cell(false),
                    ui::na_cell(false),
                    ui::na_cell(false),
                    state_cell,
                ]);
            }
        }
    }

    println!("{table}");
}

async fn display_coverage(manager: &DataManager, period: Period) {
    let cached = manager.cached_symbols(period).await;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Sector"),
        ui::header_cell("Cached"),
        ui::header_cell("Missing"),
    ]);

    for sector in manager.sectors() {
        let missing: Vec<&str> = sector
            .symbols
            .iter()
            .filter(|symbol| !cached.contains(*symbol))
            .map(String::as_str)
            .collect();
        let covered = sector.symbols.len() - missing.len();

        let missing_cell = if missing.is_empty() {
            Cell::new("-").fg(Color::DarkGrey)
        } else {
            Cell::new(missing.join(", ")).fg(Color::Yellow)
        };
        table.add_row(vec![
            Cell::new(&sector.name),
            Cell::new(format!("{covered}/{}", sector.symbols.len())),
            missing_cell,
        ]);
    }

    println!("{table}");
}
