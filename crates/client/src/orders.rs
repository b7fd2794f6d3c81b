//! Order placement and history.

use petmart_core::OrderId;
use tracing::{info, instrument};

use crate::client::PetmartClient;
use crate::error::{ClientError, Result};
use crate::http::ApiRequest;
use crate::types::{Order, PlaceOrder};

impl PetmartClient {
    /// Place an order from the provider's cart.
    ///
    /// On success the provider's cart mirror is emptied and refetched, since
    /// the server consumes the cart when the order is created.
    ///
    /// # Errors
    ///
    /// Returns an API error if the order is rejected (e.g., empty cart).
    #[instrument(skip(self, order), fields(provider_id = %order.provider_id))]
    pub async fn place_order(&self, order: &PlaceOrder) -> Result<Order> {
        let placed: Order = self
            .fetch(ApiRequest::post("api/orders").json(serde_json::to_value(order)?))
            .await?;

        info!(order_id = %placed.id, total = %placed.total, "Order placed");

        self.forget_cart(&order.provider_id).await;
        if let Err(e) = self.refresh_cart(&order.provider_id).await {
            tracing::warn!(error = %e, "Cart refetch after order failed");
        }

        Ok(placed)
    }

    /// The signed-in user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn orders(&self) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .fetch_optional(ApiRequest::get("api/orders"))
            .await?
            .unwrap_or_default();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    /// Get one order.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` or any API error.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn order(&self, id: &OrderId) -> Result<Order> {
        self.fetch(ApiRequest::get(format!("api/orders/{id}"))).await
    }

    /// Cancel an order that has not started being prepared.
    ///
    /// The current status is fetched first; orders past confirmation are
    /// rejected locally without a cancel call.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidInput` if the order can no longer be
    /// cancelled, or any API error.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn cancel_order(&self, id: &OrderId) -> Result<Order> {
        let current = self.order(id).await?;
        if !current.status.is_cancellable() {
            return Err(ClientError::InvalidInput(format!(
                "order {id} is {} and can no longer be cancelled",
                current.status
            )));
        }

        let cancelled: Order = self
            .fetch(ApiRequest::put(format!("api/orders/{id}/cancel")))
            .await?;

        info!("Order cancelled");
        Ok(cancelled)
    }
}
