//! `petmart order` - place and track orders.

use clap::Subcommand;
use petmart_client::{PaymentMethod, PetmartClient, PlaceOrder};
use petmart_core::{AddressId, OrderId, ProviderId};

use super::{CliError, print_json};

#[derive(Subcommand)]
pub enum OrderAction {
    /// List your orders, newest first
    List,
    /// Show one order
    Show { id: String },
    /// Order everything in a provider's cart
    Place {
        provider: String,
        address: String,
        /// `cod` or `card`
        #[arg(long, default_value = "cod")]
        payment: PaymentMethod,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Cancel an order that is still pending or confirmed
    Cancel { id: String },
}

pub async fn run(client: &PetmartClient, action: OrderAction) -> Result<(), CliError> {
    match action {
        OrderAction::List => print_json(&client.orders().await?),
        OrderAction::Show { id } => print_json(&client.order(&OrderId::new(id)).await?),
        OrderAction::Place {
            provider,
            address,
            payment,
            notes,
        } => {
            let order = PlaceOrder {
                provider_id: ProviderId::new(provider),
                address_id: AddressId::new(address),
                payment_method: payment,
                notes,
            };
            print_json(&client.place_order(&order).await?)
        }
        OrderAction::Cancel { id } => print_json(&client.cancel_order(&OrderId::new(id)).await?),
    }
}
