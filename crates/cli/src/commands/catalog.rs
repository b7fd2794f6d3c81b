//! `petmart catalog` - products, categories and providers.

use clap::Subcommand;
use petmart_client::{PetmartClient, ProductQuery};
use petmart_core::{CategoryId, ProductId, ProviderId};

use super::{CliError, print_json};

#[derive(Subcommand)]
pub enum CatalogAction {
    /// List products
    Products {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        /// Free-text search
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show one product
    Product { id: String },
    /// List categories
    Categories,
    /// List providers
    Providers {
        #[arg(long)]
        category: Option<String>,
    },
    /// Show one provider
    Provider { id: String },
}

pub async fn run(client: &PetmartClient, action: CatalogAction) -> Result<(), CliError> {
    match action {
        CatalogAction::Products {
            category,
            provider,
            search,
            page,
            limit,
        } => {
            let query = ProductQuery {
                category: category.map(CategoryId::new),
                provider: provider.map(ProviderId::new),
                search,
                page,
                limit,
            };
            print_json(&client.products(&query).await?)
        }
        CatalogAction::Product { id } => print_json(&client.product(&ProductId::new(id)).await?),
        CatalogAction::Categories => print_json(&client.categories().await?),
        CatalogAction::Providers { category } => {
            let category = category.map(CategoryId::new);
            print_json(&client.providers(category.as_ref()).await?)
        }
        CatalogAction::Provider { id } => {
            print_json(&client.provider(&ProviderId::new(id)).await?)
        }
    }
}
