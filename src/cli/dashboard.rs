use super::ui;
use crate::core::analytics;
use crate::core::manager::DataManager;
use crate::core::series::Period;
use crate::core::sectors::Sector;
use crate::core::series::PriceSeries;
use anyhow::Result;
use comfy_table::{Cell, Color};
use std::collections::BTreeMap;

/// Renders the correlation dashboard: the pairwise correlation matrix of
/// daily percentage changes across the whole sector universe.
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

    let universe = manager.get_all_symbols();
    let matrix = analytics::correlation_matrix(&data, &universe);

    println!(
        "\n{} ({period})",
        ui::style_text("Correlation Matrix", ui::StyleType::Title)
    );
    display_matrix(&matrix);

    ui::print_separator();
    println!(
        "{}",
        ui::style_text("Data Availability", ui::StyleType::Title)
    );
    display_availability(manager.sectors(), &data);
    Ok(())
}

fn display_availability(sectors: &[Sector], data: &BTreeMap<String, PriceSeries>) {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Sector"),
        ui::header_cell("Available"),
        ui::header_cell("Missing"),
    ]);

    for sector in sectors {
        let missing: Vec<&str> = sector
            .symbols
            .iter()
            .filter(|symbol| !data.contains_key(*symbol))
            .map(String::as_str)
            .collect();
        let available = sector.symbols.len() - missing.len();

        let missing_cell = if missing.is_empty() {
            Cell::new("-").fg(Color::DarkGrey)
        } else {
            Cell::new(missing.join(", ")).fg(Color::Red)
        };
        table.add_row(vec![
            Cell::new(&sector.name),
            Cell::new(format!("{available}/{}", sector.symbols.len())),
            missing_cell,
        ]);
    }

    println!("{table}");
}

fn display_matrix(matrix: &analytics::CorrelationMatrix) {
    let mut table = ui::new_styled_table();

    let mut header = vec![ui::header_cell("")];
    for symbol in &matrix.symbols {
        header.push(ui::header_cell(symbol));
    }
    table.set_header(header);

    for (i, symbol) in matrix.symbols.iter().enumerate() {
        let mut cells = vec![ui::header_cell(symbol)];
        for value in &matrix.cells[i] {
            let cell = match value {
                Some(r) => ui::correlation_cell(*r),
                None => ui::na_cell(false),
            };
            cells.push(cell);
        }
        table.add_row(cells);
    }

    println!("{table}");
}
