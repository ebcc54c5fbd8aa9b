use std::time::Duration;

use tracing::{error, info, warn};

use common::{ExchangeClient, OrderHandle, OrderSide, OrderType, Result};
use risk::{normalize_positions, CLOSE_PRICE_OFFSET};

/// Outcome of a close-all run.
#[derive(Debug, Clone)]
pub struct CloseReport {
    pub submitted: Vec<OrderHandle>,
    /// Positions still open after the settle wait.
    pub remaining: usize,
}

/// Close every open position on `symbol` with reduce-only orders priced
/// 0.1% through `price`, wait `settle`, then re-check the account.
pub async fn close_all_positions<C>(
    client: &C,
    symbol: &str,
    price: f64,
    settle: Duration,
) -> Result<CloseReport>
where
    C: ExchangeClient + ?Sized,
{
    info!(symbol, "Closing all positions");
    let positions = normalize_positions(client.fetch_positions(symbol).await?);
    if positions.is_empty() {
        info!("No positions to close");
        return Ok(CloseReport {
            submitted: Vec::new(),
            remaining: 0,
        });
    }

    let mut submitted = Vec::new();
    for p in &positions {
        let Some(side) = p.side.closing_side() else {
            continue;
        };
        let limit = match side {
            OrderSide::Sell => price * (1.0 - CLOSE_PRICE_OFFSET),
            OrderSide::Buy => price * (1.0 + CLOSE_PRICE_OFFSET),
        };
        info!(position = %p.side, size = p.size, %side, price = limit, "Closing position");
        match client
            .create_order(symbol, OrderType::Market, side, p.size, limit, true)
            .await
        {
            Ok(handle) => submitted.push(handle),
            Err(e) => error!(position = %p.side, error = %e, "Failed to close position"),
        }
    }

    tokio::time::sleep(settle).await;
    let remaining = normalize_positions(client.fetch_positions(symbol).await?).len();
    if remaining == 0 {
        info!("All positions closed");
    } else {
        warn!(remaining, "Positions still open after close-all");
    }

    Ok(CloseReport {
        submitted,
        remaining,
    })
}
