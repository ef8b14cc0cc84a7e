//! The sector-grouped ticker universe

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A named group of tickers. Order matters: it drives table and matrix
/// layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub name: String,
    pub symbols: Vec<String>,
}

/// Static registry of sectors and their member tickers. Immutable once
/// built; the config file may replace the built-in universe wholesale.
#[derive(Debug, Clone)]
pub struct SectorRegistry {
    sectors: Vec<Sector>,
}

fn sector(name: &str, symbols: [&str; 5]) -> Sector {
    Sector {
        name: name.to_string(),
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
    }
}

impl SectorRegistry {
    pub fn new(sectors: Vec<Sector>) -> Self {
        SectorRegistry { sectors }
    }

    /// The default universe: eleven GICS-style sectors, five large caps each.
    pub fn builtin() -> Self {
        SectorRegistry::new(vec![
            sector("Technology", ["AAPL", "MSFT", "NVDA", "AVGO", "CSCO"]),
            sector("Healthcare", ["JNJ", "UNH", "PFE", "MRK", "ABT"]),
            sector("Financials", ["JPM", "BAC", "WFC", "GS", "MS"]),
            sector("Consumer Discretionary", ["AMZN", "TSLA", "HD", "MCD", "NKE"]),
            sector("Consumer Staples", ["PG", "KO", "PEP", "WMT", "COST"]),
            sector("Industrials", ["UPS", "HON", "CAT", "BA", "GE"]),
            sector("Energy", ["XOM", "CVX", "COP", "SLB", "EOG"]),
            sector("Utilities", ["NEE", "DUK", "SO", "D", "AEP"]),
            sector("Materials", ["LIN", "APD", "ECL", "DD", "NEM"]),
            sector("Real Estate", ["AMT", "PLD", "CCI", "EQIX", "PSA"]),
            sector("Communication Services", ["GOOGL", "META", "NFLX", "TMUS", "VZ"]),
        ])
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    /// Union of all tickers in sector order, duplicates collapsed to their
    /// first occurrence.
    pub fn all_symbols(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut symbols = Vec::new();
        for sector in &self.sectors {
            for symbol in &sector.symbols {
                if seen.insert(symbol.clone()) {
                    symbols.push(symbol.clone());
                }
            }
        }
        symbols
    }
}

impl Default for SectorRegistry {
    fn default() -> Self {
        SectorRegistry::builtin()
    }
}
