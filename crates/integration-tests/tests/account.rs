//! Integration tests for sign-in, addresses, orders and the provider panel.

use petmart_client::{ClientError, NewAddress, NewStaff, PaymentMethod, PetmartClient, PlaceOrder};
use petmart_core::{
    AddressId, OrderId, OrderStatus, PhoneNumber, ProductId, ProviderId, StaffRole,
};
use petmart_integration_tests::{MockBackend, VALID_OTP};

fn phone() -> PhoneNumber {
    PhoneNumber::parse("+971 50 123 4567").expect("valid phone")
}

fn address(name: &str, is_default: bool) -> NewAddress {
    NewAddress {
        name: name.to_string(),
        formatted_address: "Villa 12, Jumeirah, Dubai".to_string(),
        latitude: 25.2048,
        longitude: 55.2708,
        is_default,
    }
}

async fn place_order(client: &PetmartClient, address: &AddressId) -> OrderId {
    let provider = ProviderId::new("prov-1");
    client
        .add_to_cart(&provider, &ProductId::new("prod-2"), 2)
        .await
        .expect("add to cart");

    client
        .place_order(&PlaceOrder {
            provider_id: provider,
            address_id: address.clone(),
            payment_method: PaymentMethod::CashOnDelivery,
            notes: Some("Ring twice".to_string()),
        })
        .await
        .expect("place order")
        .id
}

// =============================================================================
// OTP sign-in
// =============================================================================

#[tokio::test]
async fn test_otp_sign_in_and_out() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.client();

    client.request_otp(&phone()).await.expect("request otp");

    let err = client
        .verify_otp(&phone(), "000000")
        .await
        .expect_err("wrong code");
    assert!(matches!(err, ClientError::Api { status: 400, .. }));
    assert!(!client.session().is_authenticated().await);

    let user = client.verify_otp(&phone(), VALID_OTP).await.expect("verify");
    assert_eq!(user.phone, phone());
    assert!(client.session().is_authenticated().await);
    assert_eq!(client.me().await.expect("me").id, user.id);

    client.logout().await.expect("logout");
    assert!(!client.session().is_authenticated().await);
    assert!(matches!(
        client.me().await.expect_err("signed out"),
        ClientError::NoSession
    ));
}

#[tokio::test]
async fn test_non_numeric_otp_is_rejected_locally() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.client();

    let err = client
        .verify_otp(&phone(), "12ab")
        .await
        .expect_err("letters");
    assert!(matches!(err, ClientError::InvalidInput(_)));
}

#[tokio::test]
async fn test_logout_succeeds_when_server_rejects() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;

    backend.always_unauthorized(true);
    client.logout().await.expect("local logout");
    assert!(!client.session().is_authenticated().await);
}

#[tokio::test]
async fn test_delete_account_ends_session() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;

    client.delete_account().await.expect("delete account");
    assert!(!client.session().is_authenticated().await);
}

// =============================================================================
// Addresses
// =============================================================================

#[tokio::test]
async fn test_address_lifecycle() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;

    let work = client
        .create_address(&address("Work", false))
        .await
        .expect("create");
    let home = client
        .create_address(&address("Home", true))
        .await
        .expect("create");

    let listed = client.addresses().await.expect("list");
    let names: Vec<_> = listed.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, ["Home", "Work"]);

    client.set_default_address(&work.id).await.expect("default");
    let listed = client.addresses().await.expect("list");
    assert_eq!(listed.first().map(|a| &a.id), Some(&work.id));
    assert!(listed.iter().filter(|a| a.is_default).count() == 1);

    let mut renamed = address("Home sweet home", false);
    renamed.latitude = 24.45;
    let updated = client
        .update_address(&home.id, &renamed)
        .await
        .expect("update");
    assert_eq!(updated.name, "Home sweet home");

    client.delete_address(&home.id).await.expect("delete");
    assert_eq!(client.addresses().await.expect("list").len(), 1);

    let err = client
        .delete_address(&home.id)
        .await
        .expect_err("already deleted");
    assert!(matches!(err, ClientError::NotFound(_)));
}

#[tokio::test]
async fn test_out_of_range_coordinates_are_rejected() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;

    let mut bad = address("Moon base", false);
    bad.latitude = 123.0;
    let err = client.create_address(&bad).await.expect_err("bad latitude");

    assert!(matches!(err, ClientError::InvalidInput(_)));
    assert!(client.addresses().await.expect("list").is_empty());
}

// =============================================================================
// Orders
// =============================================================================

#[tokio::test]
async fn test_place_order_empties_cart() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    let home = client
        .create_address(&address("Home", true))
        .await
        .expect("address");

    let id = place_order(&client, &home.id).await;

    assert_eq!(client.cart_count(&ProviderId::new("prov-1")).await, 0);

    let order = client.order(&id).await.expect("order");
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.items.len(), 1);
    assert_eq!(order.total.to_string(), "AED 51.00");
    assert_eq!(order.notes.as_deref(), Some("Ring twice"));

    let orders = client.orders().await.expect("orders");
    assert_eq!(orders.len(), 1);
}

#[tokio::test]
async fn test_order_with_empty_cart_is_rejected() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;

    let err = client
        .place_order(&PlaceOrder {
            provider_id: ProviderId::new("prov-1"),
            address_id: AddressId::new("addr-x"),
            payment_method: PaymentMethod::Card,
            notes: None,
        })
        .await
        .expect_err("empty cart");
    assert!(matches!(err, ClientError::Api { status: 400, .. }));
}

#[tokio::test]
async fn test_cancel_only_while_cancellable() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    let id = place_order(&client, &AddressId::new("addr-1")).await;

    let cancelled = client.cancel_order(&id).await.expect("cancel");
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let err = client.cancel_order(&id).await.expect_err("already cancelled");
    assert!(matches!(err, ClientError::InvalidInput(_)));
}

// =============================================================================
// Provider panel
// =============================================================================

#[tokio::test]
async fn test_staff_management() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    let provider = ProviderId::new("prov-1");

    let member = client
        .add_staff(
            &provider,
            &NewStaff {
                name: "Omar".to_string(),
                phone: PhoneNumber::parse("+971509876543").expect("phone"),
                role: StaffRole::Manager,
            },
        )
        .await
        .expect("add staff");
    assert_eq!(member.role, StaffRole::Manager);

    let staff = client.staff(&provider).await.expect("staff");
    assert_eq!(staff.len(), 1);
    assert!(
        client
            .staff(&ProviderId::new("prov-2"))
            .await
            .expect("staff")
            .is_empty()
    );

    client
        .remove_staff(&provider, &member.id)
        .await
        .expect("remove");
    assert!(client.staff(&provider).await.expect("staff").is_empty());
}

#[tokio::test]
async fn test_order_status_updates() {
    let backend = MockBackend::start().await;
    let (client, _dir) = backend.signed_in_client().await;
    let provider = ProviderId::new("prov-1");
    let id = place_order(&client, &AddressId::new("addr-1")).await;

    let pending = client
        .provider_orders(&provider, Some(OrderStatus::Pending))
        .await
        .expect("orders");
    assert_eq!(pending.len(), 1);

    for status in [
        OrderStatus::Confirmed,
        OrderStatus::Preparing,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
    ] {
        let order = client
            .update_order_status(&provider, &id, status)
            .await
            .expect("advance");
        assert_eq!(order.status, status);
    }

    let err = client
        .update_order_status(&provider, &id, OrderStatus::Pending)
        .await
        .expect_err("delivered is terminal");
    assert!(matches!(err, ClientError::InvalidInput(_)));

    let err = client
        .update_order_status(&ProviderId::new("prov-2"), &id, OrderStatus::Confirmed)
        .await
        .expect_err("other provider");
    assert!(matches!(err, ClientError::NotFound(_)));
}
