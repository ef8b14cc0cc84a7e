use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::provider::{HistoryProvider, ProviderBar};
use crate::core::series::Period;

/// Client for the Yahoo Finance v8 chart endpoint. Stateless; one HTTP call
/// per fetch, no retry logic of its own.
pub struct YahooChartProvider {
    base_url: String,
}

impl YahooChartProvider {
    pub fn new(base_url: &str) -> Self {
        YahooChartProvider {
            base_url: base_url.to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<u64>>>,
}

#[derive(Deserialize, Debug)]
struct AdjClose {
    adjclose: Option<Vec<Option<f64>>>,
}

fn series_value(values: Option<&Vec<Option<f64>>>, index: usize) -> Option<f64> {
    values.and_then(|v| v.get(index).copied().flatten())
}

#[async_trait]
impl HistoryProvider for YahooChartProvider {
    #[instrument(
        name = "YahooHistoryFetch",
        skip(self),
        fields(symbol = %symbol, period = %period)
    )]
    async fn fetch_history(&self, symbol: &str, period: Period) -> Result<Vec<ProviderBar>> {
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range={}",
            self.base_url, symbol, period
        );
        debug!("Requesting history from {}", url);

        let client = reqwest::Client::builder()
            .user_agent("marketgrid/0.3")
            .build()?;
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("Request error: {} for symbol: {} URL: {}", e, symbol, url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for symbol: {}",
                response.status(),
                symbol
            ));
        }

        let data = response
            .json::<ChartResponse>()
            .await
            .map_err(|e| anyhow!("Failed to parse chart response for {}: {}", symbol, e))?;
        let item = data
            .chart
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No chart data found for symbol: {}", symbol))?;

        let timestamps = item
            .timestamp
            .ok_or_else(|| anyhow!("No timestamps in chart data for symbol: {}", symbol))?;
        let indicators = item
            .indicators
            .ok_or_else(|| anyhow!("No indicators in chart data for symbol: {}", symbol))?;
        let quote = indicators
            .quote
            .first()
            .ok_or_else(|| anyhow!("No quote block in chart data for symbol: {}", symbol))?;
        let adjclose = indicators
            .adjclose
            .as_ref()
            .and_then(|blocks| blocks.first())
            .and_then(|block| block.adjclose.as_ref());

        let mut bars = Vec::with_capacity(timestamps.len());
        for (i, ts) in timestamps.iter().enumerate() {
            let date = match Utc.timestamp_opt(*ts, 0).single() {
                Some(dt) => dt.date_naive(),
                None => continue,
            };
            let (Some(open), Some(high), Some(low), Some(close)) = (
                series_value(quote.open.as_ref(), i),
                series_value(quote.high.as_ref(), i),
                series_value(quote.low.as_ref(), i),
                series_value(quote.close.as_ref(), i),
            ) else {
                // Yahoo pads halted days with nulls; skip those rows.
                continue;
            };
            let adj_close = adjclose
                .and_then(|values| values.get(i).copied().flatten())
                .unwrap_or(close);
            let volume = quote
                .volume
                .as_ref()
                .and_then(|values| values.get(i).copied().flatten())
                .unwrap_or(0);
            bars.push(ProviderBar {
                date,
                open,
                high,
                low,
                close,
                adj_close,
                volume,
            });
        }

        if bars.is_empty() {
            return Err(anyhow!("No usable rows in chart data for symbol: {}", symbol));
        }
        Ok(bars)
    }
}
