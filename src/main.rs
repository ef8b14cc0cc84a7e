use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use marketgrid::core::log::init_logging;
use marketgrid::core::series::Period;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display the cross-sector correlation matrix
    Dashboard {
        /// Lookback window (5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, max)
        #[arg(short, long, default_value = "1mo")]
        period: String,
    },
    /// Rank sectors by average daily change
    Sectors {
        /// Lookback window (5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, max)
        #[arg(short, long, default_value = "1mo")]
        period: String,
    },
    /// Compare an ETF against its top holdings
    Etf {
        /// ETF ticker (GDXJ, XRT, GDX, SMH, XHB, XLK, IWM)
        symbol: String,
        /// Lookback window (5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, max)
        #[arg(short, long, default_value = "1y")]
        period: String,
    },
    /// Show cache freshness and sector coverage
    Status {
        /// Period for the coverage breakdown
        #[arg(short, long, default_value = "1y")]
        period: String,
    },
    /// Force-refetch the universe for one period
    Refresh {
        /// Lookback window (5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, max)
        #[arg(short, long, default_value = "1y")]
        period: String,
    },
    /// Delete all cached price data
    Clear,
}

impl TryFrom<Commands> for marketgrid::AppCommand {
    type Error = anyhow::Error;

    fn try_from(cmd: Commands) -> Result<marketgrid::AppCommand> {
        Ok(match cmd {
            Commands::Dashboard { period } => marketgrid::AppCommand::Dashboard {
                period: period.parse::<Period>()?,
            },
            Commands::Sectors { period } => marketgrid::AppCommand::Sectors {
                period: period.parse::<Period>()?,
            },
            Commands::Etf { symbol, period } => marketgrid::AppCommand::Etf {
                symbol: symbol.to_uppercase(),
                period: period.parse::<Period>()?,
            },
            Commands::Status { period } => marketgrid::AppCommand::Status {
                period: period.parse::<Period>()?,
            },
            Commands::Refresh { period } => marketgrid::AppCommand::Refresh {
                period: period.parse::<Period>()?,
            },
            Commands::Clear => marketgrid::AppCommand::Clear,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => marketgrid::cli::setup::setup(),
        Some(cmd) => marketgrid::run_command(cmd.try_into()?, cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
