pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::config::AppConfig;
use crate::core::manager::DataManager;
use crate::core::series::Period;
use crate::providers::yahoo_chart::YahooChartProvider;
use crate::store::CacheStore;

/// A fully resolved invocation, period included.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Dashboard { period: Period },
    Sectors { period: Period },
    Etf { symbol: String, period: Period },
    Status { period: Period },
    Refresh { period: Period },
    Clear,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("marketgrid starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let base_url = config
        .providers
        .yahoo
        .as_ref()
        .map_or("https://query1.finance.yahoo.com", |p| &p.base_url);
    let provider = Arc::new(YahooChartProvider::new(base_url));
    let store = CacheStore::new(config.cache_dir()?);
    let manager = DataManager::new(provider, store, config.sector_registry());

    match command {
        AppCommand::Dashboard { period } => cli::dashboard::run(&manager, period).await,
        AppCommand::Sectors { period } => cli::sector_growth::run(&manager, period).await,
        AppCommand::Etf { symbol, period } => cli::etf::run(&manager, &symbol, period).await,
        AppCommand::Status { period } => cli::status::run(&manager, period).await,
        AppCommand::Refresh { period } => refresh(&manager, period).await,
        AppCommand::Clear => {
            manager.clear_cache().await;
            println!("Cache cleared.");
            Ok(())
        }
    }
}

/// Force-refetches the whole universe for one period, regardless of
/// freshness.
async fn refresh(manager: &DataManager, period: Period) -> Result<()> {
    let symbols = manager.get_all_symbols();
    let spinner = cli::ui::new_spinner(&format!(
        "Refreshing {period} data for {} symbols...",
        symbols.len()
    ));
    let data = manager.download_fresh(&symbols, period).await;
    spinner.finish_and_clear();

    if data.is_empty() {
        anyhow::bail!("Refresh failed: no data could be fetched");
    }
    println!(
        "Refreshed {period}: {} of {} symbols.",
        data.len(),
        symbols.len()
    );
    Ok(())
}
