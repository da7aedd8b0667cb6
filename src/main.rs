use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use marketflow::application::market_data::{Market, SmartFetchOrchestrator, SmartFetchRequest};
use marketflow::application::simulation::simulate;
use marketflow::config::Config;
use marketflow::domain::market::{CoverageResult, Interval};
use marketflow::domain::ports::DatasetLocator;
use marketflow::domain::simulation::SimulationRequest;
use marketflow::infrastructure::binance::BinanceKlinesFetcher;
use marketflow::infrastructure::core::rate_limiter::RateLimiter;
use marketflow::infrastructure::twelvedata::TwelveDataFetcher;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "marketflow", about = "Historical candle pipeline and risk simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and enrich historical candles for one symbol.
    Fetch {
        #[arg(long)]
        symbol: String,
        /// crypto or forex
        #[arg(long, default_value = "crypto")]
        market: String,
        #[arg(long, default_value = "1h")]
        interval: String,
        /// UTC start date, YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// UTC end date, YYYY-MM-DD
        #[arg(long)]
        end: String,
    },
    /// Run a bootstrap risk simulation over a trade-return list.
    Simulate {
        /// Comma-separated fractional returns, e.g. "0.02,-0.015,0.03"
        #[arg(long)]
        trades: String,
        #[arg(long, default_value_t = 1000)]
        sims: usize,
        #[arg(long, default_value_t = 1.0)]
        risk: f64,
    },
}

/// The catalog is an external collaborator; the demo binary runs without one.
struct NoLocalCatalog;

impl DatasetLocator for NoLocalCatalog {
    fn find_local_dataset(&self, _: &str, _: Interval, _: i64, _: i64) -> CoverageResult {
        CoverageResult::None
    }
}

fn parse_date_ms(s: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").context("dates must be YYYY-MM-DD")?;
    Ok(date
        .and_hms_opt(0, 0, 0)
        .context("invalid date")?
        .and_utc()
        .timestamp_millis())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Fetch {
            symbol,
            market,
            interval,
            start,
            end,
        } => {
            let market = match market.as_str() {
                "crypto" => Market::Crypto,
                "forex" => Market::Forex,
                other => anyhow::bail!("Unknown market: {}", other),
            };
            let interval: Interval = interval.parse()?;
            let start_ms = parse_date_ms(&start)?;
            let end_ms = parse_date_ms(&end)?;

            let binance_limiter = Arc::new(RateLimiter::new(
                "binance",
                config.binance_calls_per_minute,
                Duration::from_secs(60),
            ));
            let twelvedata_limiter = Arc::new(RateLimiter::new(
                "twelvedata",
                config.twelvedata_calls_per_minute,
                Duration::from_secs(60),
            ));

            let orchestrator = SmartFetchOrchestrator::new(
                Arc::new(BinanceKlinesFetcher::new(
                    config.binance_base_url.clone(),
                    binance_limiter,
                    config.binance_min_page_delay,
                )),
                Arc::new(TwelveDataFetcher::new(
                    config.twelvedata_base_url.clone(),
                    config.twelvedata_api_key.clone(),
                    twelvedata_limiter,
                )),
                Arc::new(NoLocalCatalog),
            );

            let req = SmartFetchRequest::new(symbol.clone(), market, interval, start_ms, end_ms);
            let candles = orchestrator.fetch_enriched(&req).await?;
            info!("Fetched {} enriched candles for {}", candles.len(), symbol);
            if let Some(last) = candles.last() {
                println!(
                    "{} {} last close {:.4} rsi14 {:?} adx14 {:?}",
                    symbol,
                    interval,
                    last.candle.close,
                    last.rsi14,
                    last.adx14
                );
            }
        }

        Command::Simulate { trades, sims, risk } => {
            let trades: Vec<f64> = trades
                .split(',')
                .map(|t| t.trim().parse::<f64>().context("trades must be numbers"))
                .collect::<Result<_>>()?;

            let report = simulate(SimulationRequest {
                trades,
                sim_count: sims,
                risk_percent: risk,
            })
            .await;

            println!(
                "ruin {:.2}%  equity p5/p50/p95: {:.1}/{:.1}/{:.1}  drawdown p50: {:.1}%",
                report.ruin_probability,
                report.equity_percentiles.p5,
                report.equity_percentiles.p50,
                report.equity_percentiles.p95,
                report.drawdown_percentiles.p50,
            );
        }
    }

    Ok(())
}
