use std::sync::Arc;

use tracing::{error, info, warn};

use common::{ExchangeClient, OrderHandle, OrderIntent, OrderType, Result};

/// Places decision intents and cancels resting orders for one symbol.
///
/// This is the ONLY component that calls `OrderApi::create_order` during
/// normal operation.
pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
    symbol: String,
}

impl OrderExecutor {
    pub fn new(client: Arc<dyn ExchangeClient>, symbol: impl Into<String>) -> Self {
        Self {
            client,
            symbol: symbol.into(),
        }
    }

    /// Submit every intent as a limit order. A failed submission is logged
    /// and the rest of the batch still goes out.
    pub async fn submit(&self, intents: &[OrderIntent]) -> Vec<OrderHandle> {
        let mut placed = Vec::with_capacity(intents.len());
        for intent in intents {
            info!(
                symbol = %self.symbol,
                side = %intent.side,
                size = intent.size,
                price = intent.price,
                reduce_only = intent.reduce_only,
                "Executing order"
            );

            match self
                .client
                .create_order(
                    &self.symbol,
                    OrderType::Limit,
                    intent.side,
                    intent.size,
                    intent.price,
                    intent.reduce_only,
                )
                .await
            {
                Ok(handle) => {
                    info!(id = %handle.id, side = %handle.side, size = handle.size, "Order placed");
                    placed.push(handle);
                }
                Err(e) => {
                    error!(
                        symbol = %self.symbol,
                        side = %intent.side,
                        error = %e,
                        "Order submission failed"
                    );
                }
            }
        }
        placed
    }

    /// Cancel every resting order for the symbol. Individual cancel failures
    /// are logged; listing failures are returned.
    pub async fn cancel_all(&self) -> Result<usize> {
        let open = self.client.fetch_open_orders(&self.symbol).await?;
        let mut cancelled = 0;
        for order in &open {
            match self.client.cancel_order(&order.id, &self.symbol).await {
                Ok(()) => cancelled += 1,
                Err(e) => warn!(id = %order.id, error = %e, "Failed to cancel order"),
            }
        }
        if cancelled > 0 {
            info!(cancelled, symbol = %self.symbol, "Cancelled open orders");
        }
        Ok(cancelled)
    }
}
