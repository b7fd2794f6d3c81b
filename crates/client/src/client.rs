//! The marketplace client.
//!
//! `PetmartClient` is cheaply cloneable via `Arc` and shares one HTTP
//! connection pool, one session, one catalog cache, one cart mirror and one
//! image cache between clones. Endpoint groups are implemented in their own
//! modules (`auth`, `catalog`, `cart`, `addresses`, `orders`, `panel`).

use std::collections::HashMap;
use std::sync::Arc;

use moka::future::Cache;
use petmart_core::{Language, ProviderId};
use tokio::sync::RwLock;
use tracing::info;
use url::Url;

use crate::cart::CartSlot;
use crate::catalog::{CatalogKey, CatalogValue, build_cache};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::image_cache::ImageCache;
use crate::session::{FileSessionStorage, SessionManager, SessionStorage};

const USER_AGENT: &str = concat!("petmart-client/", env!("CARGO_PKG_VERSION"));

/// Client for the Petmart marketplace API.
#[derive(Clone)]
pub struct PetmartClient {
    inner: Arc<PetmartClientInner>,
}

struct PetmartClientInner {
    http: reqwest::Client,
    base_url: Url,
    language: RwLock<Language>,
    session: SessionManager,
    catalog_cache: Cache<CatalogKey, CatalogValue>,
    carts: RwLock<HashMap<ProviderId, CartSlot>>,
    images: ImageCache,
}

impl std::fmt::Debug for PetmartClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PetmartClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("session", &self.inner.session)
            .finish_non_exhaustive()
    }
}

impl PetmartClient {
    /// Create a client that persists its session to `config.session_file`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the persisted
    /// session or image cache index cannot be read.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let storage = Arc::new(FileSessionStorage::new(&config.session_file));
        Self::with_storage(config, storage)
    }

    /// Create a client with a custom session storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the session or
    /// image cache index cannot be read.
    pub fn with_storage(config: &ClientConfig, storage: Arc<dyn SessionStorage>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;

        let refresh_url = config.base_url.join("api/auth/refresh")?;
        let session = SessionManager::new(
            storage,
            http.clone(),
            refresh_url,
            config.token_leeway_secs,
        )?;

        let images = ImageCache::open(
            http.clone(),
            &config.image_cache_dir,
            config.image_cache_max_bytes,
        )?;

        info!(base_url = %config.base_url, language = %config.language, "Marketplace client ready");

        Ok(Self {
            inner: Arc::new(PetmartClientInner {
                http,
                base_url: config.base_url.clone(),
                language: RwLock::new(config.language),
                session,
                catalog_cache: build_cache(config.catalog_cache_ttl),
                carts: RwLock::new(HashMap::new()),
                images,
            }),
        })
    }

    /// Session manager holding the signed-in user's tokens.
    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    /// Disk cache for product and provider images.
    #[must_use]
    pub fn images(&self) -> &ImageCache {
        &self.inner.images
    }

    /// Base URL of the API.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    // =========================================================================
    // Language
    // =========================================================================

    /// Language currently sent as `Accept-Language`.
    pub async fn language(&self) -> Language {
        *self.inner.language.read().await
    }

    /// Switch the content language for subsequent requests.
    ///
    /// Catalog cache entries are keyed by language, so entries fetched in the
    /// previous language are simply not reused.
    pub async fn set_language(&self, language: Language) {
        let mut current = self.inner.language.write().await;
        let previous = *current;
        if previous != language {
            info!(from = %previous, to = %language, "Language changed");
            *current = language;
        }
    }

    // =========================================================================
    // Crate-internal accessors
    // =========================================================================

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.inner.base_url.join(path.trim_start_matches('/'))?)
    }

    pub(crate) fn catalog_cache(&self) -> &Cache<CatalogKey, CatalogValue> {
        &self.inner.catalog_cache
    }

    pub(crate) fn carts(&self) -> &RwLock<HashMap<ProviderId, CartSlot>> {
        &self.inner.carts
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStorage;

    fn client() -> (PetmartClient, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ClientConfig::new("http://127.0.0.1:9/prefix").unwrap();
        config.image_cache_dir = dir.path().join("images");
        let client =
            PetmartClient::with_storage(&config, Arc::new(MemorySessionStorage::new())).unwrap();
        (client, dir)
    }

    #[tokio::test]
    async fn test_endpoint_joins_under_base_path() {
        let (client, _dir) = client();
        assert_eq!(
            client.endpoint("/api/cart").unwrap().as_str(),
            "http://127.0.0.1:9/prefix/api/cart"
        );
        assert_eq!(
            client.endpoint("api/products/p-1").unwrap().as_str(),
            "http://127.0.0.1:9/prefix/api/products/p-1"
        );
    }

    #[tokio::test]
    async fn test_language_switch() {
        let (client, _dir) = client();
        assert_eq!(client.language().await, Language::En);

        client.set_language(Language::Ar).await;
        assert_eq!(client.language().await, Language::Ar);

        // Clones share state
        let clone = client.clone();
        assert_eq!(clone.language().await, Language::Ar);
    }
}
