use super::ui;
use crate::core::analytics::{self, SectorPerformance};
use crate::core::manager::DataManager;
use crate::core::series::Period;
use anyhow::Result;
use comfy_table::{Attribute, Cell};

/// Renders the sector growth ranking: sectors ordered by the mean of their
/// members' mean daily percentage changes, with a per-member breakdown.
pub async fn run(manager: &DataManager, period: Period) -> Result<()> {
    let spinner = ui::new_spinner(&format!("Loading {period} price data..."));
    let data = manager.get_segmented_data(period).await;
    spinner.finish_and_clear();

    if data.is_empty() {
        println!(
            "{}",
            ui::style_text("No price data available.", ui::StyleType::Error)
        );
        return Ok(());
    }

    let ranked = analytics::rank_sector_performance(&data, manager.sectors());

    println!(
        "\n{} ({period})",
        ui::style_text("Sector Growth Ranking", ui::StyleType::Title)
    );
    display_ranking(&ranked);
    ui::print_separator();
    display_members(&ranked);
    Ok(())
}

fn display_ranking(ranked: &[SectorPerformance]) {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Rank"),
        ui::header_cell("Sector"),
        ui::header_cell("Avg Daily Change"),
    ]);

    for (rank, entry) in ranked.iter().enumerate() {
        let change_cell = match entry.average_change {
            Some(change) => ui::change_cell(change),
            None => ui::na_cell(false),
        };
        table.add_row(vec![
            Cell::new(format!("{}", rank + 1)),
            Cell::new(&entry.sector).add_attribute(Attribute::Bold),
            change_cell,
        ]);
    }

    println!("{table}");
}

fn display_members(ranked: &[SectorPerformance]) {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Sector"),
        ui::header_cell("Symbol"),
        ui::header_cell("Avg Daily Change"),
    ]);

    for entry in ranked {
        for (symbol, mean) in &entry.members {
            let change_cell = match mean {
                Some(change) => ui::change_cell(*change),
                None => ui::na_cell(true),
            };
            table.add_row(vec![
                Cell::new(&entry.sector),
                Cell::new(symbol),
                change_cell,
            ]);
        }
    }

    println!("{table}");
}
