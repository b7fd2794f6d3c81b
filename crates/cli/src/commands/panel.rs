//! `petmart panel` - provider staff and incoming orders.

use clap::Subcommand;
use petmart_client::{NewStaff, PetmartClient};
use petmart_core::{OrderId, OrderStatus, PhoneNumber, ProviderId, StaffId, StaffRole};
use serde_json::json;

use super::{CliError, print_json};

#[derive(Subcommand)]
pub enum PanelAction {
    /// List a provider's staff
    Staff { provider: String },
    /// Add a staff member
    AddStaff {
        provider: String,
        name: String,
        phone: PhoneNumber,
        /// `owner`, `manager` or `staff`
        #[arg(long, default_value = "staff")]
        role: StaffRole,
    },
    /// Remove a staff member
    RemoveStaff { provider: String, staff: String },
    /// List orders received by a provider
    Orders {
        provider: String,
        #[arg(long)]
        status: Option<OrderStatus>,
    },
    /// Move an order to a new status
    SetStatus {
        provider: String,
        order: String,
        status: OrderStatus,
    },
}

pub async fn run(client: &PetmartClient, action: PanelAction) -> Result<(), CliError> {
    match action {
        PanelAction::Staff { provider } => {
            print_json(&client.staff(&ProviderId::new(provider)).await?)
        }
        PanelAction::AddStaff {
            provider,
            name,
            phone,
            role,
        } => {
            let staff = NewStaff { name, phone, role };
            print_json(&client.add_staff(&ProviderId::new(provider), &staff).await?)
        }
        PanelAction::RemoveStaff { provider, staff } => {
            client
                .remove_staff(&ProviderId::new(provider), &StaffId::new(staff))
                .await?;
            print_json(&json!({ "removed": true }))
        }
        PanelAction::Orders { provider, status } => {
            print_json(&client.provider_orders(&ProviderId::new(provider), status).await?)
        }
        PanelAction::SetStatus {
            provider,
            order,
            status,
        } => {
            let order = client
                .update_order_status(&ProviderId::new(provider), &OrderId::new(order), status)
                .await?;
            print_json(&order)
        }
    }
}
