use std::fs;
use tracing::{error, info};

mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // 2024-01-02 through 2024-01-04, 14:30 UTC.
    pub const TS_DAY1: i64 = 1704205800;
    pub const TS_DAY2: i64 = 1704292200;
    pub const TS_DAY3: i64 = 1704378600;

    pub fn chart_response(closes: [f64; 3]) -> String {
        format!(
            r#"
        {{
            "chart": {{
                "result": [
                    {{
                        "timestamp": [{}, {}, {}],
                        "indicators": {{
                            "quote": [{{
                                "open": [{c0}, {c1}, {c2}],
                                "high": [{c0}, {c1}, {c2}],
                                "low": [{c0}, {c1}, {c2}],
                                "close": [{c0}, {c1}, {c2}],
                                "volume": [1000, 1100, 1200]
                            }}],
                            "adjclose": [{{
                                "adjclose": [{c0}, {c1}, {c2}]
                            }}]
                        }}
                    }}
                ]
            }}
        }}"#,
            TS_DAY1,
            TS_DAY2,
            TS_DAY3,
            c0 = closes[0],
            c1 = closes[1],
            c2 = closes[2],
        )
    }

    pub async fn mount_chart_mock(
        mock_server: &MockServer,
        symbol: &str,
        closes: [f64; 3],
        expected_calls: u64,
    ) {
        Mock::given(method("GET"))
            .and(path(format!("/v8/finance/chart/{symbol}")))
            .respond_with(ResponseTemplate::new(200).set_body_string(chart_response(closes)))
            .expect(expected_calls)
            .mount(mock_server)
            .await;
    }
}

fn write_config(
    dir: &tempfile::TempDir,
    base_url: &str,
    symbols: &[&str],
) -> std::path::PathBuf {
    let symbol_list = symbols
        .iter()
        .map(|s| format!("\"{s}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let config_content = format!(
        r#"
        providers:
          yahoo:
            base_url: {base_url}
        data_path: "{}"
        sectors:
          - name: "Test Sector"
            symbols: [{symbol_list}]
    "#,
        dir.path().join("data").display()
    );

    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, &config_content).expect("Failed to write config file");
    config_path
}

#[test_log::test(tokio::test)]
async fn test_dashboard_flow_populates_and_reuses_cache() {
    let mock_server = wiremock::MockServer::start().await;
    // One provider call per symbol across both runs proves the second run
    // was served from the cache.
    test_utils::mount_chart_mock(&mock_server, "AAPL", [100.0, 110.0, 99.0], 1).await;
    test_utils::mount_chart_mock(&mock_server, "MSFT", [200.0, 220.0, 198.0], 1).await;

    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &mock_server.uri(), &["AAPL", "MSFT"]);

    let command = marketgrid::AppCommand::Dashboard {
        period: "1mo".parse().unwrap(),
    };
    let result = marketgrid::run_command(command.clone(), config_path.to_str()).await;
    assert!(result.is_ok(), "First run failed with: {:?}", result.err());

    let cache_dir = dir.path().join("data").join("cache");
    assert!(cache_dir.join("ledger.json").exists());
    assert!(cache_dir.join("1mo").join("AAPL.csv").exists());
    assert!(cache_dir.join("1mo").join("MSFT.csv").exists());

    let result = marketgrid::run_command(command, config_path.to_str()).await;
    assert!(result.is_ok(), "Second run failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_sectors_and_status_flow() {
    let mock_server = wiremock::MockServer::start().await;
    test_utils::mount_chart_mock(&mock_server, "AAPL", [100.0, 110.0, 99.0], 1).await;
    test_utils::mount_chart_mock(&mock_server, "MSFT", [200.0, 220.0, 198.0], 1).await;

    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &mock_server.uri(), &["AAPL", "MSFT"]);

    let result = marketgrid::run_command(
        marketgrid::AppCommand::Sectors {
            period: "1mo".parse().unwrap(),
        },
        config_path.to_str(),
    )
    .await;
    assert!(result.is_ok(), "Sectors run failed with: {:?}", result.err());

    // The status page only reads; no further provider calls expected.
    let result = marketgrid::run_command(
        marketgrid::AppCommand::Status {
            period: "1mo".parse().unwrap(),
        },
        config_path.to_str(),
    )
    .await;
    assert!(result.is_ok(), "Status run failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_refresh_always_hits_provider() {
    let mock_server = wiremock::MockServer::start().await;
    test_utils::mount_chart_mock(&mock_server, "AAPL", [100.0, 110.0, 99.0], 2).await;

    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &mock_server.uri(), &["AAPL"]);

    for _ in 0..2 {
        let result = marketgrid::run_command(
            marketgrid::AppCommand::Refresh {
                period: "1y".parse().unwrap(),
            },
            config_path.to_str(),
        )
        .await;
        assert!(result.is_ok(), "Refresh failed with: {:?}", result.err());
    }

    let cache_dir = dir.path().join("data").join("cache");
    assert!(cache_dir.join("1y").join("AAPL.csv").exists());
}

#[test_log::test(tokio::test)]
async fn test_clear_removes_cached_data() {
    let mock_server = wiremock::MockServer::start().await;
    test_utils::mount_chart_mock(&mock_server, "AAPL", [100.0, 110.0, 99.0], 1).await;

    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &mock_server.uri(), &["AAPL"]);

    let result = marketgrid::run_command(
        marketgrid::AppCommand::Refresh {
            period: "1mo".parse().unwrap(),
        },
        config_path.to_str(),
    )
    .await;
    assert!(result.is_ok(), "Refresh failed with: {:?}", result.err());

    let cache_dir = dir.path().join("data").join("cache");
    assert!(cache_dir.exists());

    let result = marketgrid::run_command(marketgrid::AppCommand::Clear, config_path.to_str()).await;
    assert!(result.is_ok(), "Clear failed with: {:?}", result.err());
    assert!(!cache_dir.exists());
}

#[test_log::test(tokio::test)]
async fn test_etf_page_fetches_holdings_outside_universe() {
    let mock_server = wiremock::MockServer::start().await;
    // The ETF itself plus its top holdings; none are in the configured
    // universe, so everything comes through the forced download path.
    for symbol in ["GDX", "NEM", "AEM", "GOLD", "WPM", "FNV"] {
        test_utils::mount_chart_mock(&mock_server, symbol, [100.0, 110.0, 99.0], 1).await;
    }

    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &mock_server.uri(), &["AAPL"]);

    // AAPL is never requested by the ETF page.
    let result = marketgrid::run_command(
        marketgrid::AppCommand::Etf {
            symbol: "GDX".to_string(),
            period: "1y".parse().unwrap(),
        },
        config_path.to_str(),
    )
    .await;
    assert!(result.is_ok(), "Etf run failed with: {:?}", result.err());
}

#[test_log::test(tokio::test)]
async fn test_dashboard_recovers_after_etf_page_replaces_bucket() {
    let mock_server = wiremock::MockServer::start().await;
    for symbol in ["GDX", "NEM", "AEM", "GOLD", "WPM", "FNV"] {
        test_utils::mount_chart_mock(&mock_server, symbol, [100.0, 110.0, 99.0], 1).await;
    }
    // The universe symbol is absent from the ETF basket, so the dashboard
    // has to fetch it even though the period's bucket is fresh.
    test_utils::mount_chart_mock(&mock_server, "AAPL", [50.0, 55.0, 49.5], 1).await;

    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &mock_server.uri(), &["AAPL"]);

    let result = marketgrid::run_command(
        marketgrid::AppCommand::Etf {
            symbol: "GDX".to_string(),
            period: "1y".parse().unwrap(),
        },
        config_path.to_str(),
    )
    .await;
    assert!(result.is_ok(), "Etf run failed with: {:?}", result.err());

    // The ETF page replaced the 1y bucket with its own basket.
    let bucket = dir.path().join("data").join("cache").join("1y");
    assert!(bucket.join("GDX.csv").exists());
    assert!(!bucket.join("AAPL.csv").exists());

    let result = marketgrid::run_command(
        marketgrid::AppCommand::Dashboard {
            period: "1y".parse().unwrap(),
        },
        config_path.to_str(),
    )
    .await;
    assert!(result.is_ok(), "Dashboard run failed with: {:?}", result.err());
    assert!(bucket.join("AAPL.csv").exists());
}

#[test_log::test(tokio::test)]
async fn test_unsupported_etf_is_an_error() {
    let mock_server = wiremock::MockServer::start().await;
    let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
    let config_path = write_config(&dir, &mock_server.uri(), &["AAPL"]);

    let result = marketgrid::run_command(
        marketgrid::AppCommand::Etf {
            symbol: "SPY".to_string(),
            period: "1y".parse().unwrap(),
        },
        config_path.to_str(),
    )
    .await;
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Unsupported ETF"));
}

#[test_log::test(tokio::test)]
#[ignore = "hits the live Yahoo Finance API"]
async fn test_real_yahoo_chart_api() {
    use marketgrid::core::provider::HistoryProvider;
    use marketgrid::providers::yahoo_chart::YahooChartProvider;

    let provider = YahooChartProvider::new("https://query1.finance.yahoo.com");
    let symbol = "AAPL";
    info!(?symbol, "Fetching history from Yahoo Finance");

    let result = provider
        .fetch_history(symbol, "1mo".parse().unwrap())
        .await;

    match result {
        Ok(bars) => {
            info!("Real API Response - {}: {} bars", symbol, bars.len());
            assert!(!bars.is_empty(), "History should not be empty");
            assert!(bars[0].adj_close > 0.0, "Prices should be positive");
        }
        Err(e) => {
            error!("API request failed: {e}\n{e:?}");
            panic!("API request failed: {e}");
        }
    }
}
