//! Integration tests for the optimistic cart mirror.

use std::time::Duration;

use petmart_client::ClientError;
use petmart_core::{CartItemId, ProductId, ProviderId};
use petmart_integration_tests::MockBackend;
use rust_decimal::Decimal;

fn provider() -> ProviderId {
    ProviderId::new("prov-1")
}

/// Add `quantity` of prod-1 and return the created line's ID.
async fn seed_line(client: &petmart_client::PetmartClient, quantity: u32) -> CartItemId {
    let cart = client
        .add_to_cart(&provider(), &ProductId::new("prod-1"), quantity)
        .await
        .expect("add to cart");
    cart.items.first().expect("one line").id.clone()
}

#[tokio::test]
async fn test_add_to_cart_refetches_server_state() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;

    client
        .add_to_cart(&provider(), &ProductId::new("prod-1"), 2)
        .await
        .expect("add");
    let cart = client
        .add_to_cart(&provider(), &ProductId::new("prod-2"), 1)
        .await
        .expect("add");

    assert_eq!(cart.count(), 3);
    assert_eq!(cart.subtotal().amount, Decimal::new(4550, 2));
    assert_eq!(client.cart_count(&provider()).await, 3);
    assert_eq!(client.total_cart_count().await, 3);
    assert_eq!(backend.cart_mutations(), 2);
}

#[tokio::test]
async fn test_zero_quantity_add_is_rejected_locally() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;

    let err = client
        .add_to_cart(&provider(), &ProductId::new("prod-1"), 0)
        .await
        .expect_err("zero quantity");

    assert!(matches!(err, ClientError::InvalidInput(_)));
    assert_eq!(backend.cart_mutations(), 0);
}

#[tokio::test]
async fn test_quantity_change_makes_exactly_one_call() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    let line = seed_line(&client, 1).await;
    let before = backend.cart_mutations();

    let cart = client
        .set_cart_quantity(&provider(), &line, 4)
        .await
        .expect("increase");
    assert_eq!(cart.count(), 4);
    assert_eq!(backend.cart_mutations(), before + 1);
    assert_eq!(backend.server_quantity("prov-1", "prod-1").await, Some(4));

    let cart = client
        .set_cart_quantity(&provider(), &line, 2)
        .await
        .expect("reduce");
    assert_eq!(cart.count(), 2);
    assert_eq!(backend.cart_mutations(), before + 2);

    // Setting the same quantity is a no-op
    client
        .set_cart_quantity(&provider(), &line, 2)
        .await
        .expect("unchanged");
    assert_eq!(backend.cart_mutations(), before + 2);
}

#[tokio::test]
async fn test_zero_quantity_removes_line() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    let line = seed_line(&client, 3).await;

    let cart = client
        .remove_from_cart(&provider(), &line)
        .await
        .expect("remove");

    assert!(cart.is_empty());
    assert_eq!(backend.server_quantity("prov-1", "prod-1").await, None);
}

#[tokio::test]
async fn test_failed_mutation_reverts_optimistic_change() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    let line = seed_line(&client, 2).await;

    backend.fail_cart_mutations(true);
    let err = client
        .set_cart_quantity(&provider(), &line, 5)
        .await
        .expect_err("server failure");

    assert!(matches!(err, ClientError::Api { status: 500, .. }));
    assert_eq!(client.cart_count(&provider()).await, 2);
    assert_eq!(backend.server_quantity("prov-1", "prod-1").await, Some(2));
}

#[tokio::test]
async fn test_failed_clear_restores_cart() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    seed_line(&client, 2).await;

    backend.fail_cart_mutations(true);
    client.clear_cart(&provider()).await.expect_err("server failure");
    assert_eq!(client.cart_count(&provider()).await, 2);

    backend.fail_cart_mutations(false);
    client.clear_cart(&provider()).await.expect("clear");
    assert_eq!(client.cart_count(&provider()).await, 0);
    assert_eq!(backend.server_quantity("prov-1", "prod-1").await, None);
}

#[tokio::test]
async fn test_unknown_line_is_not_found() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    seed_line(&client, 1).await;

    let err = client
        .set_cart_quantity(&provider(), &CartItemId::new("nope"), 2)
        .await
        .expect_err("unknown line");
    assert!(matches!(err, ClientError::NotFound(_)));
}

#[tokio::test]
async fn test_stale_refetch_does_not_overwrite_newer_change() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    let line = seed_line(&client, 1).await;

    // This fetch captures quantity 1, then stalls
    backend.delay_next_cart_fetch(Duration::from_millis(300)).await;
    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.refresh_cart(&ProviderId::new("prov-1")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    client
        .set_cart_quantity(&provider(), &line, 3)
        .await
        .expect("increase");

    let after_slow = slow.await.expect("join").expect("refresh");
    assert_eq!(after_slow.count(), 3);
    assert_eq!(client.cart_count(&provider()).await, 3);
}

#[tokio::test]
async fn test_logout_forgets_carts() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    seed_line(&client, 2).await;

    client.logout().await.expect("logout");
    assert_eq!(client.total_cart_count().await, 0);
}

#[tokio::test]
async fn test_concurrent_failures_each_revert_their_own_line() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    client
        .add_to_cart(&provider(), &ProductId::new("prod-1"), 1)
        .await
        .expect("add");
    let cart = client
        .add_to_cart(&provider(), &ProductId::new("prod-2"), 1)
        .await
        .expect("add");
    let line_id = |product: &str| {
        cart.items
            .iter()
            .find(|line| line.product.id.as_str() == product)
            .expect("line")
            .id
            .clone()
    };
    let (food, toy) = (line_id("prod-1"), line_id("prod-2"));

    backend.fail_cart_mutations(true);
    let prov = provider();
    let (first, second) = tokio::join!(
        client.set_cart_quantity(&prov, &food, 5),
        client.set_cart_quantity(&prov, &toy, 7),
    );
    assert!(first.is_err());
    assert!(second.is_err());

    let mirror = client.cart_snapshot(&provider()).await;
    assert_eq!(mirror.item(&food).map(|line| line.quantity), Some(1));
    assert_eq!(mirror.item(&toy).map(|line| line.quantity), Some(1));
    assert_eq!(client.cart_count(&provider()).await, 2);
    assert_eq!(backend.server_quantity("prov-1", "prod-1").await, Some(1));
}

#[tokio::test]
async fn test_repeated_failures_on_one_line_restore_server_quantity() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    let line = seed_line(&client, 1).await;

    backend.fail_cart_mutations(true);
    let prov = provider();
    let (first, second) = tokio::join!(
        client.set_cart_quantity(&prov, &line, 5),
        client.set_cart_quantity(&prov, &line, 7),
    );
    assert!(first.is_err());
    assert!(second.is_err());
    assert_eq!(client.cart_count(&provider()).await, 1);
}

#[tokio::test]
async fn test_logout_drops_refetch_in_flight() {
    let backend = MockBackend::start().await;
    let (other, _other_dir) = backend.signed_in_client().await;
    seed_line(&other, 3).await;

    let (client, _dir) = backend.signed_in_client().await;
    backend.delay_next_cart_fetch(Duration::from_millis(300)).await;
    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.refresh_cart(&ProviderId::new("prov-1")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    client.logout().await.expect("logout");
    slow.await.expect("join").expect("refresh");

    assert!(!client.session().is_authenticated().await);
    assert_eq!(client.cart_count(&provider()).await, 0);
    assert_eq!(client.total_cart_count().await, 0);
}
