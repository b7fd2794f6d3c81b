//! Cache types for catalog responses.

use std::time::Duration;

use moka::future::Cache;
use petmart_core::{CategoryId, Language, ProductId, ProviderId};

use crate::types::{Category, Page, Product, Provider};

/// Upper bound on cached catalog responses.
const MAX_ENTRIES: u64 = 1000;

/// Cache key for catalog responses.
///
/// Every key carries the language the response was fetched in, so switching
/// language never serves stale translations.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CatalogKey {
    Product(Language, ProductId),
    Products {
        language: Language,
        category: Option<CategoryId>,
        provider: Option<ProviderId>,
        page: Option<u32>,
        limit: Option<u32>,
    },
    Categories(Language),
    Provider(Language, ProviderId),
    Providers(Language, Option<CategoryId>),
}

/// Cached value types.
#[derive(Debug, Clone)]
pub enum CatalogValue {
    Product(Box<Product>),
    Products(Page<Product>),
    Categories(Vec<Category>),
    Provider(Box<Provider>),
    Providers(Vec<Provider>),
}

/// Build the catalog cache with the configured time-to-live.
pub(crate) fn build_cache(ttl: Duration) -> Cache<CatalogKey, CatalogValue> {
    Cache::builder()
        .max_capacity(MAX_ENTRIES)
        .time_to_live(ttl)
        .build()
}
