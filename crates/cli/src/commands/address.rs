//! `petmart address` - saved delivery addresses.

use clap::Subcommand;
use petmart_client::{NewAddress, PetmartClient};
use petmart_core::AddressId;
use serde_json::json;

use super::{CliError, print_json};

#[derive(Subcommand)]
pub enum AddressAction {
    /// List addresses, default first
    List,
    /// Save a new address
    Add {
        /// Label such as "Home"
        name: String,
        /// Human-readable address
        formatted: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Make it the default address
        #[arg(long)]
        default: bool,
    },
    /// Delete an address
    Remove { id: String },
    /// Make an address the default
    Default { id: String },
}

pub async fn run(client: &PetmartClient, action: AddressAction) -> Result<(), CliError> {
    match action {
        AddressAction::List => print_json(&client.addresses().await?),
        AddressAction::Add {
            name,
            formatted,
            lat,
            lon,
            default,
        } => {
            let address = NewAddress {
                name,
                formatted_address: formatted,
                latitude: lat,
                longitude: lon,
                is_default: default,
            };
            print_json(&client.create_address(&address).await?)
        }
        AddressAction::Remove { id } => {
            client.delete_address(&AddressId::new(id)).await?;
            print_json(&json!({ "deleted": true }))
        }
        AddressAction::Default { id } => {
            client.set_default_address(&AddressId::new(id)).await?;
            print_json(&json!({ "default": true }))
        }
    }
}
