//! Provider administration: staff and incoming orders.
//!
//! These endpoints are only available to users who work for the provider.
//! Permission checks happen on the server; the client only rejects status
//! transitions out of a terminal state.

use petmart_core::{OrderId, OrderStatus, ProviderId, StaffId};
use tracing::{info, instrument};

use crate::client::PetmartClient;
use crate::error::{ClientError, Result};
use crate::http::ApiRequest;
use crate::types::{NewStaff, Order, StaffMember};

/// Whether an order may move from `from` to `to`.
fn is_allowed_transition(from: OrderStatus, to: OrderStatus) -> bool {
    !from.is_terminal() && from != to
}

impl PetmartClient {
    /// Staff members of `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(provider_id = %provider))]
    pub async fn staff(&self, provider: &ProviderId) -> Result<Vec<StaffMember>> {
        Ok(self
            .fetch_optional(ApiRequest::get(format!("api/providers/{provider}/staff")))
            .await?
            .unwrap_or_default())
    }

    /// Add a staff member.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidInput` for an empty name, or any API error.
    #[instrument(skip(self, staff), fields(provider_id = %provider, role = %staff.role))]
    pub async fn add_staff(&self, provider: &ProviderId, staff: &NewStaff) -> Result<StaffMember> {
        if staff.name.trim().is_empty() {
            return Err(ClientError::InvalidInput(
                "staff name cannot be empty".to_string(),
            ));
        }

        let member: StaffMember = self
            .fetch(
                ApiRequest::post(format!("api/providers/{provider}/staff"))
                    .json(serde_json::to_value(staff)?),
            )
            .await?;

        info!(staff_id = %member.id, "Staff member added");
        Ok(member)
    }

    /// Remove a staff member.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` or any API error.
    #[instrument(skip(self), fields(provider_id = %provider, staff_id = %staff))]
    pub async fn remove_staff(&self, provider: &ProviderId, staff: &StaffId) -> Result<()> {
        self.execute(ApiRequest::delete(format!(
            "api/providers/{provider}/staff/{staff}"
        )))
        .await?;

        info!("Staff member removed");
        Ok(())
    }

    /// Orders received by `provider`, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self), fields(provider_id = %provider))]
    pub async fn provider_orders(
        &self,
        provider: &ProviderId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<Order>> {
        Ok(self
            .fetch_optional(
                ApiRequest::get(format!("api/providers/{provider}/orders"))
                    .query_opt("status", status),
            )
            .await?
            .unwrap_or_default())
    }

    /// Move an order to `status`.
    ///
    /// The order's current status is read from the provider's order list;
    /// terminal orders and no-op transitions are rejected locally.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the order is not the provider's,
    /// `ClientError::InvalidInput` for a disallowed transition, or any API error.
    #[instrument(skip(self), fields(provider_id = %provider, order_id = %order, status = %status))]
    pub async fn update_order_status(
        &self,
        provider: &ProviderId,
        order: &OrderId,
        status: OrderStatus,
    ) -> Result<Order> {
        let current = self
            .provider_orders(provider, None)
            .await?
            .into_iter()
            .find(|o| &o.id == order)
            .ok_or_else(|| ClientError::NotFound(format!("order {order}")))?;

        if !is_allowed_transition(current.status, status) {
            return Err(ClientError::InvalidInput(format!(
                "cannot move order {order} from {} to {status}",
                current.status
            )));
        }

        let updated: Order = self
            .fetch(
                ApiRequest::put(format!("api/providers/{provider}/orders/{order}/status"))
                    .json(serde_json::json!({ "status": status })),
            )
            .await?;

        info!("Order status updated");
        Ok(updated)
    }
}
