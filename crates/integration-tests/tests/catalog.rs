//! Integration tests for catalog caching and language switching.

use petmart_client::{ClientError, ProductQuery};
use petmart_core::{CategoryId, Language, ProductId, ProviderId};
use petmart_integration_tests::MockBackend;

#[tokio::test]
async fn test_listing_is_cached_per_query() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.client();

    let page = client.products(&ProductQuery::default()).await.expect("products");
    assert_eq!(page.items.len(), 3);
    client.products(&ProductQuery::default()).await.expect("cached");
    assert_eq!(backend.product_list_calls(), 1);

    let by_provider = ProductQuery {
        provider: Some(ProviderId::new("prov-1")),
        ..ProductQuery::default()
    };
    let page = client.products(&by_provider).await.expect("filtered");
    assert_eq!(page.items.len(), 2);
    assert_eq!(backend.product_list_calls(), 2);

    client.invalidate_catalog();
    client.products(&ProductQuery::default()).await.expect("refetched");
    assert_eq!(backend.product_list_calls(), 3);
}

#[tokio::test]
async fn test_search_is_never_cached() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.client();

    let query = ProductQuery {
        search: Some("toy".to_string()),
        ..ProductQuery::default()
    };
    let page = client.products(&query).await.expect("search");
    assert_eq!(page.items.len(), 1);
    client.products(&query).await.expect("search again");

    assert_eq!(backend.product_list_calls(), 2);
}

#[tokio::test]
async fn test_language_switch_changes_header_and_cache_key() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.client();
    let id = ProductId::new("prod-1");

    let english = client.product(&id).await.expect("product");
    assert_eq!(english.name, "Dog Food");

    client.set_language(Language::Ar).await;
    let arabic = client.product(&id).await.expect("product");
    assert_eq!(arabic.name, "طعام الكلاب");

    let languages = backend.languages().await;
    assert_eq!(languages, vec!["en".to_string(), "ar".to_string()]);

    // Switching back reuses the English entry
    client.set_language(Language::En).await;
    let again = client.product(&id).await.expect("cached");
    assert_eq!(again.name, "Dog Food");
    assert_eq!(backend.languages().await.len(), 2);
}

#[tokio::test]
async fn test_categories_and_providers() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.client();

    let categories = client.categories().await.expect("categories");
    assert_eq!(categories.len(), 3);

    let grooming = CategoryId::new("grooming");
    let providers = client.providers(Some(&grooming)).await.expect("providers");
    assert_eq!(providers.len(), 1);
    assert_eq!(providers.first().map(|p| p.id.as_str()), Some("prov-2"));

    let all = client.providers(None).await.expect("providers");
    assert_eq!(all.len(), 2);

    let provider = client
        .provider(&ProviderId::new("prov-1"))
        .await
        .expect("provider");
    assert_eq!(provider.name, "Happy Paws");
    assert_eq!(provider.category_ids.len(), 2);
}

#[tokio::test]
async fn test_missing_product_is_not_found() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.client();

    let err = client
        .product(&ProductId::new("ghost"))
        .await
        .expect_err("missing");
    assert!(matches!(err, ClientError::NotFound(_)));
}

#[tokio::test]
async fn test_catalog_sends_token_when_signed_in() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.client_with_session(-60).await;

    // Optional auth still refreshes an expired session
    client.categories().await.expect("categories");
    assert_eq!(backend.refresh_calls(), 1);
}
