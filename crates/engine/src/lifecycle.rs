use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{error, info, warn};

use common::{Config, EngineState, Error, ExchangeClient, MarketDataApi, Result, Trade};
use strategy::{TrendConfig, TrendTracker};

use crate::control::ControlLoop;
use crate::executor::OrderExecutor;
use crate::feed::{FeedLoop, SharedMarket};
use crate::hyperliquid::HyperliquidStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Stop,
}

/// Cloneable handle for the binary: shutdown, state, trade subscription.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    trade_tx: broadcast::Sender<Trade>,
}

impl EngineHandle {
    pub async fn stop(&self) {
        let _ = self.command_tx.send(EngineCommand::Stop).await;
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Subscribe to the live trade broadcast.
    pub fn subscribe_trades(&self) -> broadcast::Receiver<Trade> {
        self.trade_tx.subscribe()
    }
}

/// Owns startup, the three long-running tasks (stream, feed, control) and
/// shutdown.
pub struct Engine {
    coin: String,
    symbol: String,
    timeframe: String,
    lookback_periods: usize,
    ws_url: String,
    market: SharedMarket,
    market_data: Arc<dyn MarketDataApi>,
    client: Arc<dyn ExchangeClient>,
    control: ControlLoop,
    state: Arc<RwLock<EngineState>>,
    trade_tx: broadcast::Sender<Trade>,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl Engine {
    pub fn new(
        cfg: &Config,
        market_data: Arc<dyn MarketDataApi>,
        client: Arc<dyn ExchangeClient>,
    ) -> Result<(Self, EngineHandle)> {
        let (command_tx, command_rx) = mpsc::channel(8);
        let (trade_tx, _) = broadcast::channel(1024);
        let state = Arc::new(RwLock::new(EngineState::Stopped));

        let market: SharedMarket = Arc::new(Mutex::new(TrendTracker::new(
            &TrendConfig::from_config(cfg),
        )?));
        let control = ControlLoop::new(cfg, market.clone(), client.clone());

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
            trade_tx: trade_tx.clone(),
        };

        let engine = Engine {
            coin: cfg.coin.clone(),
            symbol: cfg.symbol.clone(),
            timeframe: cfg.timeframe.clone(),
            lookback_periods: cfg.lookback_periods,
            ws_url: cfg.hyperliquid_ws_url.clone(),
            market,
            market_data,
            client,
            control,
            state,
            trade_tx,
            command_rx,
        };

        Ok((engine, handle))
    }

    /// Seed candles and slope, then prepare the account. Failure here means
    /// the loops never start.
    pub async fn bootstrap(&mut self) -> Result<()> {
        *self.state.write().await = EngineState::Bootstrapping;
        info!(coin = %self.coin, timeframe = %self.timeframe, "Fetching initial market data");

        let candles = self
            .market_data
            .fetch_candles(&self.coin, &self.timeframe, self.lookback_periods)
            .await?;
        if candles.is_empty() {
            return Err(Error::Exchange(format!("no candles returned for {}", self.coin)));
        }
        info!(candles = candles.len(), symbol = %self.symbol, "Fetched candles");

        {
            let mut market = self.market.lock().await;
            match market.bootstrap(candles) {
                Ok(_) => {}
                // Not fatal: the slope appears once enough candles close
                Err(e) if e.is_insufficient_data() => {
                    warn!(error = %e, "Initial slope unavailable")
                }
                Err(e) => return Err(e),
            }
            info!(price = market.latest_price(), "Current price");
        }

        self.control.prepare().await
    }

    /// Bootstrap, run until `Stop`, then shut down and cancel open orders.
    /// Call from `tokio::spawn`.
    pub async fn run(mut self) -> Result<()> {
        if let Err(e) = self.bootstrap().await {
            error!(error = %e, "Bootstrap failed, not starting");
            *self.state.write().await = EngineState::Stopped;
            return Err(e);
        }

        info!(coin = %self.coin, "Starting trade stream and control loops");
        let feed = FeedLoop::new(self.market.clone(), self.trade_tx.subscribe());
        let stream = HyperliquidStream::new(
            self.ws_url.clone(),
            self.coin.clone(),
            self.trade_tx.clone(),
        );
        let tasks = vec![
            tokio::spawn(feed.run()),
            tokio::spawn(stream.run()),
            tokio::spawn(self.control.run()),
        ];
        *self.state.write().await = EngineState::Running;

        match self.command_rx.recv().await {
            Some(EngineCommand::Stop) => info!("Engine stopping"),
            None => warn!("Engine command channel closed, shutting down"),
        }

        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            let _ = task.await;
        }
        *self.state.write().await = EngineState::Stopped;

        match OrderExecutor::new(self.client.clone(), self.symbol.clone())
            .cancel_all()
            .await
        {
            Ok(cancelled) => info!(cancelled, "Open orders cancelled on shutdown"),
            Err(e) => error!(error = %e, "Failed to cancel open orders on shutdown"),
        }
        Ok(())
    }
}
