use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use common::{AccountApi, Config};
use engine::{close_all_positions, Engine, HyperliquidInfo};
use paper::PaperClient;

/// ALMA slope strategy on a simulated Hyperliquid perpetual account.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Read settings from this file instead of `.env`
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Flatten the paper account with reduce-only orders after shutdown
    #[arg(long)]
    close_on_exit: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Config ────────────────────────────────────────────────────────────────
    if let Some(path) = &cli.env_file {
        dotenvy::from_path(path)
            .with_context(|| format!("Failed to load env file {}", path.display()))?;
    }
    let cfg = Config::from_env();

    // ── Logging ───────────────────────────────────────────────────────────────
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&cfg.log_file)
        .with_context(|| format!("Failed to open log file {}", cfg.log_file))?;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(log_file)))
        .init();

    cfg.validate()?;

    // ── Exchange clients ──────────────────────────────────────────────────────
    let market_data = Arc::new(HyperliquidInfo::new(&cfg.hyperliquid_api_url)?);
    let paper = Arc::new(PaperClient::new(cfg.paper_balance_usd, cfg.paper_slippage_bps));

    log_parameters(&cfg, cli.close_on_exit);

    // ── Engine ────────────────────────────────────────────────────────────────
    let (engine, handle) = Engine::new(&cfg, market_data, paper.clone())?;

    // Paper fills follow the live trade stream
    let mut trades = handle.subscribe_trades();
    let symbol = cfg.symbol.clone();
    let pricer = paper.clone();
    tokio::spawn(async move {
        loop {
            match trades.recv().await {
                Ok(trade) => pricer.update_price(&symbol, trade.price).await,
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Paper price feed lagging"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut engine_task = tokio::spawn(engine.run());
    info!("All subsystems started. Waiting for shutdown signal.");

    tokio::select! {
        res = &mut engine_task => {
            // Only a failed bootstrap ends the engine on its own
            res.context("Engine task panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
            handle.stop().await;
            engine_task.await.context("Engine task panicked")??;
        }
    }

    if cli.close_on_exit {
        flatten(&cfg, &paper).await?;
    }
    let balance = paper.fetch_balance().await?;
    info!(total = balance.total, free = balance.free, "Final paper balance");

    info!("=== ALMA SLOPE STRATEGY COMPLETED ===");
    Ok(())
}

fn log_parameters(cfg: &Config, close_on_exit: bool) {
    info!("=== STARTING ALMA SLOPE STRATEGY ===");
    info!(symbol = %cfg.symbol, coin = %cfg.coin, timeframe = %cfg.timeframe, "Market");
    info!(
        window = cfg.alma_window,
        offset = cfg.alma_offset,
        sigma = cfg.alma_sigma,
        slope_lookback = cfg.slope_lookback,
        "ALMA parameters"
    );
    info!(
        levels = cfg.num_levels,
        spacing_pct = cfg.level_spacing_percent * 100.0,
        base_order_size = cfg.base_order_size,
        min_order_value = cfg.min_order_value,
        leverage = cfg.leverage,
        "Order parameters"
    );
    info!(
        balance = cfg.paper_balance_usd,
        slippage_bps = cfg.paper_slippage_bps,
        close_on_exit,
        "Paper account"
    );
}

/// Close whatever the session left open at the last streamed price.
async fn flatten(cfg: &Config, paper: &PaperClient) -> anyhow::Result<()> {
    let Some(price) = paper.last_price(&cfg.symbol).await else {
        warn!("No price seen this session, nothing to close against");
        return Ok(());
    };
    let report = close_all_positions(paper, &cfg.symbol, price, Duration::from_secs(2)).await?;
    info!(
        submitted = report.submitted.len(),
        remaining = report.remaining,
        "Close-all finished"
    );
    Ok(())
}
