//! Product, category and provider listings.
//!
//! Catalog responses are cached in memory via `moka` (default 5 minute TTL).
//! Free-text search results are never cached.

mod cache;

pub use cache::{CatalogKey, CatalogValue};
pub(crate) use cache::build_cache;

use petmart_core::{CategoryId, ProductId, ProviderId};
use tracing::{debug, instrument};

use crate::client::PetmartClient;
use crate::error::Result;
use crate::http::{ApiRequest, AuthMode};
use crate::types::{Category, Page, Product, ProductQuery, Provider};

impl PetmartClient {
    // =========================================================================
    // Product Methods
    // =========================================================================

    /// List products matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let language = self.language().await;
        let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let cache_key = CatalogKey::Products {
            language,
            category: query.category.clone(),
            provider: query.provider.clone(),
            page: query.page,
            limit: query.limit,
        };

        // Check cache (only for queries without search)
        if search.is_none()
            && let Some(CatalogValue::Products(page)) = self.catalog_cache().get(&cache_key).await
        {
            debug!("Cache hit for products");
            return Ok(page);
        }

        let page: Page<Product> = self
            .fetch(
                ApiRequest::get("api/products")
                    .auth(AuthMode::Optional)
                    .query_opt("categoryId", query.category.as_ref())
                    .query_opt("providerId", query.provider.as_ref())
                    .query_opt("search", search)
                    .query_opt("page", query.page)
                    .query_opt("limit", query.limit),
            )
            .await?;

        if search.is_none() {
            self.catalog_cache()
                .insert(cache_key, CatalogValue::Products(page.clone()))
                .await;
        }

        Ok(page)
    }

    /// Get a single product.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the product does not exist, or any
    /// other API error.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: &ProductId) -> Result<Product> {
        let cache_key = CatalogKey::Product(self.language().await, id.clone());

        if let Some(CatalogValue::Product(product)) = self.catalog_cache().get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Product = self
            .fetch(ApiRequest::get(format!("api/products/{id}")).auth(AuthMode::Optional))
            .await?;

        self.catalog_cache()
            .insert(cache_key, CatalogValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    // =========================================================================
    // Category Methods
    // =========================================================================

    /// List all categories.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>> {
        let cache_key = CatalogKey::Categories(self.language().await);

        if let Some(CatalogValue::Categories(categories)) =
            self.catalog_cache().get(&cache_key).await
        {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories: Vec<Category> = self
            .fetch_optional(ApiRequest::get("api/categories").auth(AuthMode::Optional))
            .await?
            .unwrap_or_default();

        self.catalog_cache()
            .insert(cache_key, CatalogValue::Categories(categories.clone()))
            .await;

        Ok(categories)
    }

    // =========================================================================
    // Provider Methods
    // =========================================================================

    /// List providers, optionally only those serving `category`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn providers(&self, category: Option<&CategoryId>) -> Result<Vec<Provider>> {
        let cache_key = CatalogKey::Providers(self.language().await, category.cloned());

        if let Some(CatalogValue::Providers(providers)) = self.catalog_cache().get(&cache_key).await
        {
            debug!("Cache hit for providers");
            return Ok(providers);
        }

        let providers: Vec<Provider> = self
            .fetch_optional(
                ApiRequest::get("api/providers")
                    .auth(AuthMode::Optional)
                    .query_opt("categoryId", category),
            )
            .await?
            .unwrap_or_default();

        self.catalog_cache()
            .insert(cache_key, CatalogValue::Providers(providers.clone()))
            .await;

        Ok(providers)
    }

    /// Get a single provider.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the provider does not exist, or any
    /// other API error.
    #[instrument(skip(self), fields(provider_id = %id))]
    pub async fn provider(&self, id: &ProviderId) -> Result<Provider> {
        let cache_key = CatalogKey::Provider(self.language().await, id.clone());

        if let Some(CatalogValue::Provider(provider)) = self.catalog_cache().get(&cache_key).await
        {
            debug!("Cache hit for provider");
            return Ok(*provider);
        }

        let provider: Provider = self
            .fetch(ApiRequest::get(format!("api/providers/{id}")).auth(AuthMode::Optional))
            .await?;

        self.catalog_cache()
            .insert(cache_key, CatalogValue::Provider(Box::new(provider.clone())))
            .await;

        Ok(provider)
    }

    /// Drop every cached catalog response.
    pub fn invalidate_catalog(&self) {
        self.catalog_cache().invalidate_all();
    }
}
