//! `petmart cart` - per-provider carts.
//!
//! The CLI starts with an empty mirror, so commands that edit existing
//! lines refresh the cart first.

use clap::Subcommand;
use petmart_client::PetmartClient;
use petmart_core::{CartItemId, ProductId, ProviderId};
use serde_json::json;

use super::{CliError, print_json};

#[derive(Subcommand)]
pub enum CartAction {
    /// Show a provider's cart
    Show { provider: String },
    /// Add a product
    Add {
        provider: String,
        product: String,
        #[arg(short, long, default_value_t = 1)]
        quantity: u32,
    },
    /// Set a line's quantity (0 removes it)
    Set {
        provider: String,
        item: String,
        quantity: u32,
    },
    /// Remove a line
    Remove { provider: String, item: String },
    /// Empty the cart
    Clear { provider: String },
}

pub async fn run(client: &PetmartClient, action: CartAction) -> Result<(), CliError> {
    match action {
        CartAction::Show { provider } => {
            let provider = ProviderId::new(provider);
            let cart = client.refresh_cart(&provider).await?;
            print_json(&json!({
                "cart": cart,
                "count": cart.count(),
                "subtotal": cart.subtotal(),
            }))
        }
        CartAction::Add {
            provider,
            product,
            quantity,
        } => {
            let cart = client
                .add_to_cart(&ProviderId::new(provider), &ProductId::new(product), quantity)
                .await?;
            print_json(&cart)
        }
        CartAction::Set {
            provider,
            item,
            quantity,
        } => {
            let provider = ProviderId::new(provider);
            client.refresh_cart(&provider).await?;
            let cart = client
                .set_cart_quantity(&provider, &CartItemId::new(item), quantity)
                .await?;
            print_json(&cart)
        }
        CartAction::Remove { provider, item } => {
            let provider = ProviderId::new(provider);
            client.refresh_cart(&provider).await?;
            let cart = client
                .remove_from_cart(&provider, &CartItemId::new(item))
                .await?;
            print_json(&cart)
        }
        CartAction::Clear { provider } => {
            client.clear_cart(&ProviderId::new(provider)).await?;
            print_json(&json!({ "cleared": true }))
        }
    }
}
