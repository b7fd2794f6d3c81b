//! Integration tests for the Petmart client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p petmart-integration-tests
//! ```
//!
//! No external services are needed. [`MockBackend`] serves an in-process
//! `axum` imitation of the marketplace API on `127.0.0.1:0`, counts the
//! calls tests care about and can be told to fail.
//!
//! # Test Categories
//!
//! - `auth_refresh` - Token refresh, single-flight and 401 handling
//! - `cart_sync` - Optimistic cart updates, reverts and stale responses
//! - `catalog` - Caching and language switching
//! - `account` - OTP sign-in, addresses, orders and the provider panel
//! - `image_cache` - Download dedupe and eviction

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use petmart_client::session::MemorySessionStorage;
use petmart_client::{ClientConfig, PetmartClient, REQUEST_ID_HEADER, SessionTokens};
use serde::Deserialize;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::Mutex;

/// The OTP the mock accepts.
pub const VALID_OTP: &str = "123456";

/// Size of every image the mock serves.
pub const IMAGE_SIZE: usize = 10;

/// Build an unsigned JWT with the given `exp`.
#[must_use]
pub fn jwt(exp: i64, jti: u64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": "user-1", "exp": exp, "jti": jti }).to_string());
    format!("{header}.{payload}.signature")
}

/// Current Unix time in seconds.
#[must_use]
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn ok(data: Value) -> Response {
    Json(json!({ "success": true, "data": data })).into_response()
}

fn ok_empty() -> Response {
    Json(json!({ "success": true })).into_response()
}

fn fail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "success": false, "message": message }))).into_response()
}

fn money(cents: i64) -> Value {
    json!({ "amount": format!("{}.{:02}", cents / 100, cents % 100), "currencyCode": "AED" })
}

fn is_arabic(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("ar"))
}

// =============================================================================
// Fixture catalog
// =============================================================================

struct FixtureProduct {
    id: &'static str,
    name_en: &'static str,
    name_ar: &'static str,
    cents: i64,
    provider: &'static str,
    category: &'static str,
    kind: &'static str,
}

const PRODUCTS: &[FixtureProduct] = &[
    FixtureProduct {
        id: "prod-1",
        name_en: "Dog Food",
        name_ar: "طعام الكلاب",
        cents: 1000,
        provider: "prov-1",
        category: "food",
        kind: "product",
    },
    FixtureProduct {
        id: "prod-2",
        name_en: "Chew Toy",
        name_ar: "لعبة مضغ",
        cents: 2550,
        provider: "prov-1",
        category: "toys",
        kind: "product",
    },
    FixtureProduct {
        id: "prod-3",
        name_en: "Full Grooming",
        name_ar: "تجميل كامل",
        cents: 8000,
        provider: "prov-2",
        category: "grooming",
        kind: "service",
    },
];

const CATEGORIES: &[(&str, &str, &str)] = &[
    ("food", "Food", "طعام"),
    ("toys", "Toys", "ألعاب"),
    ("grooming", "Grooming", "تجميل"),
];

const PROVIDERS: &[(&str, &str, &str, &[&str])] = &[
    ("prov-1", "Happy Paws", "مخالب سعيدة", &["food", "toys"]),
    ("prov-2", "Groom Room", "غرفة التجميل", &["grooming"]),
];

impl FixtureProduct {
    fn to_json(&self, arabic: bool) -> Value {
        json!({
            "id": self.id,
            "name": if arabic { self.name_ar } else { self.name_en },
            "price": money(self.cents),
            "image": format!("/images/{}.jpg", self.id),
            "providerId": self.provider,
            "categoryId": self.category,
            "inStock": true,
            "kind": self.kind,
        })
    }
}

fn find_product(id: &str) -> Option<&'static FixtureProduct> {
    PRODUCTS.iter().find(|p| p.id == id)
}

fn provider_json(provider: &(&str, &str, &str, &[&str]), arabic: bool) -> Value {
    let (id, en, ar, categories) = provider;
    json!({
        "id": id,
        "name": if arabic { ar } else { en },
        "rating": 4.5,
        "latitude": 25.2,
        "longitude": 55.3,
        "categoryIds": categories,
    })
}

// =============================================================================
// Mock state
// =============================================================================

#[derive(Debug, Clone)]
struct Line {
    id: String,
    product: &'static str,
    quantity: u32,
}

impl Line {
    fn to_json(&self) -> Value {
        let product = find_product(self.product);
        json!({
            "id": self.id,
            "product": {
                "id": self.product,
                "name": product.map_or("", |p| p.name_en),
            },
            "quantity": self.quantity,
            "price": money(product.map_or(0, |p| p.cents)),
        })
    }

    fn cents(&self) -> i64 {
        find_product(self.product).map_or(0, |p| p.cents) * i64::from(self.quantity)
    }
}

fn cart_json(provider: &str, lines: &[Line]) -> Value {
    json!({
        "providerId": provider,
        "items": lines.iter().map(Line::to_json).collect::<Vec<_>>(),
    })
}

/// Shared state behind the mock routes.
#[derive(Default)]
pub struct MockState {
    access_token: Mutex<String>,
    refresh_token: Mutex<String>,
    issued: AtomicU64,
    next_id: AtomicU64,

    refresh_calls: AtomicUsize,
    refresh_delay_ms: AtomicU64,
    reject_refresh: AtomicBool,
    reject_next_auth: AtomicBool,
    always_unauthorized: AtomicBool,

    cart_mutations: AtomicUsize,
    fail_cart_mutations: AtomicBool,
    cart_fetch_delays: Mutex<VecDeque<u64>>,
    carts: Mutex<HashMap<String, Vec<Line>>>,

    product_list_calls: AtomicUsize,
    image_downloads: AtomicUsize,
    image_delay_ms: AtomicU64,

    languages: Mutex<Vec<String>>,
    request_ids: Mutex<Vec<String>>,

    addresses: Mutex<Vec<Value>>,
    orders: Mutex<Vec<Value>>,
    staff: Mutex<Vec<Value>>,
}

impl MockState {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn issue_tokens(&self, ttl_secs: i64) -> (String, String) {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let access = jwt(now() + ttl_secs, n);
        let refresh = format!("refresh-{n}");
        access.clone_into(&mut *self.access_token.lock().await);
        refresh.clone_into(&mut *self.refresh_token.lock().await);
        (access, refresh)
    }

    async fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        let unauthorized = || fail(StatusCode::UNAUTHORIZED, "unauthorized");

        if self.always_unauthorized.load(Ordering::SeqCst)
            || self.reject_next_auth.swap(false, Ordering::SeqCst)
        {
            return Err(unauthorized());
        }

        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let current = self.access_token.lock().await;
        match bearer {
            Some(token) if !current.is_empty() && token == current.as_str() => Ok(()),
            _ => Err(unauthorized()),
        }
    }

    async fn find_line(&self, item: &str) -> Option<(String, usize)> {
        let carts = self.carts.lock().await;
        carts.iter().find_map(|(provider, lines)| {
            lines
                .iter()
                .position(|l| l.id == item)
                .map(|index| (provider.clone(), index))
        })
    }
}

type Shared = Arc<MockState>;

macro_rules! authorize {
    ($state:expr, $headers:expr) => {
        if let Err(response) = $state.authorize(&$headers).await {
            return response;
        }
    };
}

async fn record(State(state): State<Shared>, request: Request, next: Next) -> Response {
    if let Some(language) = request
        .headers()
        .get(header::ACCEPT_LANGUAGE)
        .and_then(|v| v.to_str().ok())
    {
        state.languages.lock().await.push(language.to_string());
    }
    if let Some(id) = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        state.request_ids.lock().await.push(id.to_string());
    }
    next.run(request).await
}

// =============================================================================
// Auth routes
// =============================================================================

#[derive(Deserialize)]
struct OtpRequest {
    phone: String,
    #[serde(default)]
    otp: Option<String>,
}

async fn request_otp(Json(body): Json<OtpRequest>) -> Response {
    if body.phone.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "phone is required");
    }
    ok_empty()
}

async fn verify_otp(State(state): State<Shared>, Json(body): Json<OtpRequest>) -> Response {
    if body.otp.as_deref() != Some(VALID_OTP) {
        return fail(StatusCode::BAD_REQUEST, "invalid otp");
    }

    let (access, refresh) = state.issue_tokens(3600).await;
    ok(json!({
        "accessToken": access,
        "refreshToken": refresh,
        "user": { "id": "user-1", "name": "Sara", "phone": body.phone },
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh(State(state): State<Shared>, Json(body): Json<RefreshRequest>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if state.reject_refresh.load(Ordering::SeqCst)
        || body.refresh_token != *state.refresh_token.lock().await
    {
        return fail(StatusCode::UNAUTHORIZED, "refresh token rejected");
    }

    let (access, refresh) = state.issue_tokens(3600).await;
    ok(json!({ "accessToken": access, "refreshToken": refresh }))
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Response {
    authorize!(state, headers);
    ok(json!({ "id": "user-1", "name": "Sara", "phone": "+971501234567" }))
}

async fn logout(State(state): State<Shared>, headers: HeaderMap) -> Response {
    authorize!(state, headers);
    state.access_token.lock().await.clear();
    ok_empty()
}

async fn delete_account(State(state): State<Shared>, headers: HeaderMap) -> Response {
    authorize!(state, headers);
    state.access_token.lock().await.clear();
    state.refresh_token.lock().await.clear();
    ok_empty()
}

// =============================================================================
// Catalog routes
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductParams {
    category_id: Option<String>,
    provider_id: Option<String>,
    search: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn products(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<ProductParams>,
) -> Response {
    state.product_list_calls.fetch_add(1, Ordering::SeqCst);
    let arabic = is_arabic(&headers);

    let matching: Vec<Value> = PRODUCTS
        .iter()
        .filter(|p| params.category_id.as_deref().is_none_or(|c| p.category == c))
        .filter(|p| params.provider_id.as_deref().is_none_or(|v| p.provider == v))
        .filter(|p| {
            params.search.as_deref().is_none_or(|s| {
                p.name_en.to_lowercase().contains(&s.to_lowercase()) || p.name_ar.contains(s)
            })
        })
        .map(|p| p.to_json(arabic))
        .collect();

    let page = params.page.unwrap_or(1).max(1);
    let limit = params.limit.unwrap_or(20).max(1);
    let total = matching.len();
    let items: Vec<Value> = matching
        .into_iter()
        .skip(((page - 1) * limit) as usize)
        .take(limit as usize)
        .collect();

    ok(json!({ "items": items, "page": page, "total": total }))
}

async fn product(headers: HeaderMap, Path(id): Path<String>) -> Response {
    find_product(&id).map_or_else(
        || fail(StatusCode::NOT_FOUND, "product not found"),
        |p| ok(p.to_json(is_arabic(&headers))),
    )
}

async fn categories(headers: HeaderMap) -> Response {
    let arabic = is_arabic(&headers);
    let categories: Vec<Value> = CATEGORIES
        .iter()
        .map(|(id, en, ar)| json!({ "id": id, "name": if arabic { ar } else { en } }))
        .collect();
    ok(json!(categories))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderParams {
    category_id: Option<String>,
}

async fn providers(headers: HeaderMap, Query(params): Query<ProviderParams>) -> Response {
    let arabic = is_arabic(&headers);
    let providers: Vec<Value> = PROVIDERS
        .iter()
        .filter(|(_, _, _, categories)| {
            params
                .category_id
                .as_deref()
                .is_none_or(|c| categories.contains(&c))
        })
        .map(|p| provider_json(p, arabic))
        .collect();
    ok(json!(providers))
}

async fn provider(headers: HeaderMap, Path(id): Path<String>) -> Response {
    PROVIDERS.iter().find(|p| p.0 == id).map_or_else(
        || fail(StatusCode::NOT_FOUND, "provider not found"),
        |p| ok(provider_json(p, is_arabic(&headers))),
    )
}

// =============================================================================
// Cart routes
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CartParams {
    provider_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddItem {
    provider_id: String,
    product_id: String,
    quantity: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeQuantity {
    item_id: String,
    quantity: u32,
}

/// Count a mutation and apply the failure switch.
fn begin_mutation(state: &MockState) -> Result<(), Response> {
    state.cart_mutations.fetch_add(1, Ordering::SeqCst);
    if state.fail_cart_mutations.load(Ordering::SeqCst) {
        return Err(fail(StatusCode::INTERNAL_SERVER_ERROR, "cart service unavailable"));
    }
    Ok(())
}

async fn get_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<CartParams>,
) -> Response {
    authorize!(state, headers);

    // Snapshot before the delay so a slow response carries old data
    let body = {
        let carts = state.carts.lock().await;
        let lines = carts.get(&params.provider_id).cloned().unwrap_or_default();
        cart_json(&params.provider_id, &lines)
    };

    let delay = state.cart_fetch_delays.lock().await.pop_front().unwrap_or(0);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    ok(body)
}

async fn add_item(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<AddItem>) -> Response {
    authorize!(state, headers);
    if let Err(response) = begin_mutation(&state) {
        return response;
    }

    let Some(product) = find_product(&body.product_id) else {
        return fail(StatusCode::NOT_FOUND, "product not found");
    };
    if product.provider != body.provider_id {
        return fail(StatusCode::BAD_REQUEST, "product belongs to another provider");
    }

    let id = state.next_id("line");
    let mut carts = state.carts.lock().await;
    let lines = carts.entry(body.provider_id).or_default();
    if let Some(line) = lines.iter_mut().find(|l| l.product == product.id) {
        line.quantity += body.quantity;
    } else {
        lines.push(Line {
            id,
            product: product.id,
            quantity: body.quantity,
        });
    }
    ok_empty()
}

async fn change_quantity(state: &MockState, body: ChangeQuantity, increase: bool) -> Response {
    if let Err(response) = begin_mutation(state) {
        return response;
    }

    let Some((provider, index)) = state.find_line(&body.item_id).await else {
        return fail(StatusCode::NOT_FOUND, "cart item not found");
    };

    let mut carts = state.carts.lock().await;
    let Some(lines) = carts.get_mut(&provider) else {
        return fail(StatusCode::NOT_FOUND, "cart item not found");
    };
    let Some(line) = lines.get_mut(index) else {
        return fail(StatusCode::NOT_FOUND, "cart item not found");
    };

    if increase {
        line.quantity += body.quantity;
    } else if line.quantity > body.quantity {
        line.quantity -= body.quantity;
    } else {
        lines.remove(index);
    }
    ok_empty()
}

async fn increase(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<ChangeQuantity>) -> Response {
    authorize!(state, headers);
    change_quantity(&state, body, true).await
}

async fn reduce(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<ChangeQuantity>) -> Response {
    authorize!(state, headers);
    change_quantity(&state, body, false).await
}

async fn remove_item(State(state): State<Shared>, headers: HeaderMap, Path(item): Path<String>) -> Response {
    authorize!(state, headers);
    if let Err(response) = begin_mutation(&state) {
        return response;
    }

    let mut carts = state.carts.lock().await;
    for lines in carts.values_mut() {
        if let Some(index) = lines.iter().position(|l| l.id == item) {
            lines.remove(index);
            return ok_empty();
        }
    }
    fail(StatusCode::NOT_FOUND, "cart item not found")
}

async fn clear_cart(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<CartParams>,
) -> Response {
    authorize!(state, headers);
    if let Err(response) = begin_mutation(&state) {
        return response;
    }

    state.carts.lock().await.remove(&params.provider_id);
    ok_empty()
}

// =============================================================================
// Address routes
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressBody {
    name: String,
    formatted_address: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    is_default: bool,
}

fn set_only_default(addresses: &mut [Value], id: &str) {
    for address in addresses {
        address["isDefault"] = json!(address["id"] == id);
    }
}

async fn list_addresses(State(state): State<Shared>, headers: HeaderMap) -> Response {
    authorize!(state, headers);
    ok(json!(state.addresses.lock().await.clone()))
}

async fn create_address(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<AddressBody>,
) -> Response {
    authorize!(state, headers);

    let id = state.next_id("addr");
    let address = json!({
        "id": id,
        "name": body.name,
        "formattedAddress": body.formatted_address,
        "latitude": body.latitude,
        "longitude": body.longitude,
        "isDefault": body.is_default,
    });

    let mut addresses = state.addresses.lock().await;
    addresses.push(address.clone());
    if body.is_default {
        set_only_default(&mut addresses, &id);
    }
    ok(address)
}

async fn update_address(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<AddressBody>,
) -> Response {
    authorize!(state, headers);

    let mut addresses = state.addresses.lock().await;
    let Some(address) = addresses.iter_mut().find(|a| a["id"] == id.as_str()) else {
        return fail(StatusCode::NOT_FOUND, "address not found");
    };
    address["name"] = json!(body.name);
    address["formattedAddress"] = json!(body.formatted_address);
    address["latitude"] = json!(body.latitude);
    address["longitude"] = json!(body.longitude);
    let updated = address.clone();

    if body.is_default {
        set_only_default(&mut addresses, &id);
        return ok(addresses.iter().find(|a| a["id"] == id.as_str()).cloned().unwrap_or(updated));
    }
    ok(updated)
}

async fn delete_address(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    authorize!(state, headers);

    let mut addresses = state.addresses.lock().await;
    let before = addresses.len();
    addresses.retain(|a| a["id"] != id.as_str());
    if addresses.len() == before {
        return fail(StatusCode::NOT_FOUND, "address not found");
    }
    ok_empty()
}

async fn default_address(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    authorize!(state, headers);

    let mut addresses = state.addresses.lock().await;
    if !addresses.iter().any(|a| a["id"] == id.as_str()) {
        return fail(StatusCode::NOT_FOUND, "address not found");
    }
    set_only_default(&mut addresses, &id);
    ok_empty()
}

// =============================================================================
// Order routes
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderBody {
    provider_id: String,
    address_id: String,
    payment_method: String,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

#[derive(Deserialize)]
struct StatusParams {
    status: Option<String>,
}

async fn place_order(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<PlaceOrderBody>,
) -> Response {
    authorize!(state, headers);

    let lines = state
        .carts
        .lock()
        .await
        .remove(&body.provider_id)
        .unwrap_or_default();
    if lines.is_empty() {
        return fail(StatusCode::BAD_REQUEST, "cart is empty");
    }

    let total: i64 = lines.iter().map(Line::cents).sum();
    let items: Vec<Value> = lines
        .iter()
        .map(|l| {
            json!({
                "productId": l.product,
                "name": find_product(l.product).map_or("", |p| p.name_en),
                "quantity": l.quantity,
                "price": money(find_product(l.product).map_or(0, |p| p.cents)),
            })
        })
        .collect();

    let order = json!({
        "id": state.next_id("order"),
        "providerId": body.provider_id,
        "status": "pending",
        "items": items,
        "total": money(total),
        "addressId": body.address_id,
        "paymentMethod": body.payment_method,
        "notes": body.notes,
        "createdAt": chrono::Utc::now().to_rfc3339(),
    });

    state.orders.lock().await.push(order.clone());
    ok(order)
}

async fn list_orders(State(state): State<Shared>, headers: HeaderMap) -> Response {
    authorize!(state, headers);
    ok(json!(state.orders.lock().await.clone()))
}

async fn get_order(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    authorize!(state, headers);
    state
        .orders
        .lock()
        .await
        .iter()
        .find(|o| o["id"] == id.as_str())
        .cloned()
        .map_or_else(|| fail(StatusCode::NOT_FOUND, "order not found"), ok)
}

async fn cancel_order(State(state): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    authorize!(state, headers);

    let mut orders = state.orders.lock().await;
    let Some(order) = orders.iter_mut().find(|o| o["id"] == id.as_str()) else {
        return fail(StatusCode::NOT_FOUND, "order not found");
    };
    if order["status"] != "pending" && order["status"] != "confirmed" {
        return fail(StatusCode::BAD_REQUEST, "order can no longer be cancelled");
    }
    order["status"] = json!("cancelled");
    ok(order.clone())
}

// =============================================================================
// Provider panel routes
// =============================================================================

#[derive(Deserialize)]
struct StaffBody {
    name: String,
    phone: String,
    role: String,
}

async fn list_staff(State(state): State<Shared>, headers: HeaderMap, Path(provider): Path<String>) -> Response {
    authorize!(state, headers);
    let staff: Vec<Value> = state
        .staff
        .lock()
        .await
        .iter()
        .filter(|s| s["providerId"] == provider.as_str())
        .cloned()
        .collect();
    ok(json!(staff))
}

async fn add_staff(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    Json(body): Json<StaffBody>,
) -> Response {
    authorize!(state, headers);
    let member = json!({
        "id": state.next_id("staff"),
        "providerId": provider,
        "name": body.name,
        "phone": body.phone,
        "role": body.role,
    });
    state.staff.lock().await.push(member.clone());
    ok(member)
}

async fn remove_staff(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((provider, id)): Path<(String, String)>,
) -> Response {
    authorize!(state, headers);
    let mut staff = state.staff.lock().await;
    let before = staff.len();
    staff.retain(|s| !(s["providerId"] == provider.as_str() && s["id"] == id.as_str()));
    if staff.len() == before {
        return fail(StatusCode::NOT_FOUND, "staff member not found");
    }
    ok_empty()
}

async fn provider_orders(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(provider): Path<String>,
    Query(params): Query<StatusParams>,
) -> Response {
    authorize!(state, headers);
    let orders: Vec<Value> = state
        .orders
        .lock()
        .await
        .iter()
        .filter(|o| o["providerId"] == provider.as_str())
        .filter(|o| params.status.as_deref().is_none_or(|s| o["status"] == s))
        .cloned()
        .collect();
    ok(json!(orders))
}

async fn set_order_status(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((provider, id)): Path<(String, String)>,
    Json(body): Json<StatusBody>,
) -> Response {
    authorize!(state, headers);
    let mut orders = state.orders.lock().await;
    let Some(order) = orders
        .iter_mut()
        .find(|o| o["providerId"] == provider.as_str() && o["id"] == id.as_str())
    else {
        return fail(StatusCode::NOT_FOUND, "order not found");
    };
    order["status"] = json!(body.status);
    ok(order.clone())
}

// =============================================================================
// Images
// =============================================================================

async fn image(State(state): State<Shared>, Path(name): Path<String>) -> Response {
    if name.starts_with("missing") {
        return StatusCode::NOT_FOUND.into_response();
    }

    state.image_downloads.fetch_add(1, Ordering::SeqCst);
    let delay = state.image_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    ([(header::CONTENT_TYPE, "image/jpeg")], vec![b'i'; IMAGE_SIZE]).into_response()
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/api/auth/request-otp", post(request_otp))
        .route("/api/auth/verify-otp", post(verify_otp))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/me", get(me))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/account", axum::routing::delete(delete_account))
        .route("/api/products", get(products))
        .route("/api/products/{id}", get(product))
        .route("/api/categories", get(categories))
        .route("/api/providers", get(providers))
        .route("/api/providers/{id}", get(provider))
        .route("/api/providers/{id}/staff", get(list_staff).post(add_staff))
        .route(
            "/api/providers/{id}/staff/{staff}",
            axum::routing::delete(remove_staff),
        )
        .route("/api/providers/{id}/orders", get(provider_orders))
        .route("/api/providers/{id}/orders/{order}/status", put(set_order_status))
        .route("/api/cart", get(get_cart).delete(clear_cart))
        .route("/api/cart/items", post(add_item))
        .route("/api/cart/items/increase", put(increase))
        .route("/api/cart/items/reduce", put(reduce))
        .route("/api/cart/items/{id}", axum::routing::delete(remove_item))
        .route("/api/addresses", get(list_addresses).post(create_address))
        .route(
            "/api/addresses/{id}",
            put(update_address).delete(delete_address),
        )
        .route("/api/addresses/{id}/default", put(default_address))
        .route("/api/orders", get(list_orders).post(place_order))
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/cancel", put(cancel_order))
        .route("/images/{name}", get(image))
        .layer(middleware::from_fn_with_state(state.clone(), record))
        .with_state(state)
}

// =============================================================================
// MockBackend
// =============================================================================

/// A running mock marketplace backend.
pub struct MockBackend {
    state: Shared,
    base_url: String,
}

impl MockBackend {
    /// Bind to an ephemeral port and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");

        let app = router(Arc::clone(&state));
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            state,
            base_url: format!("http://{addr}"),
        }
    }

    /// Base URL the client should be configured with.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of an image served by the mock.
    #[must_use]
    pub fn image_url(&self, name: &str) -> String {
        format!("{}/images/{name}", self.base_url)
    }

    /// Client configuration with scratch directories under `dir`.
    ///
    /// # Panics
    ///
    /// Panics if the base URL does not parse.
    #[must_use]
    pub fn config(&self, dir: &TempDir) -> ClientConfig {
        let mut config = ClientConfig::new(&self.base_url).expect("mock base URL");
        config.session_file = dir.path().join("session.json");
        config.image_cache_dir = dir.path().join("images");
        config
    }

    /// A signed-out client.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn client(&self) -> (PetmartClient, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = PetmartClient::with_storage(
            &self.config(&dir),
            Arc::new(MemorySessionStorage::new()),
        )
        .expect("client");
        (client, dir)
    }

    /// A client holding a session whose access token expires in `ttl_secs`
    /// (negative for an already expired token).
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    pub async fn client_with_session(&self, ttl_secs: i64) -> (PetmartClient, TempDir) {
        let (access, refresh) = self.state.issue_tokens(ttl_secs).await;
        let storage = MemorySessionStorage::with_tokens(SessionTokens::new(access, Some(refresh)));

        let dir = tempfile::tempdir().expect("tempdir");
        let client =
            PetmartClient::with_storage(&self.config(&dir), Arc::new(storage)).expect("client");
        (client, dir)
    }

    /// A client with a fresh one-hour session.
    pub async fn signed_in_client(&self) -> (PetmartClient, TempDir) {
        self.client_with_session(3600).await
    }

    // -------------------------------------------------------------------------
    // Failure injection
    // -------------------------------------------------------------------------

    /// Delay every refresh response.
    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state
            .refresh_delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    /// Answer refresh calls with 401.
    pub fn reject_refresh(&self, reject: bool) {
        self.state.reject_refresh.store(reject, Ordering::SeqCst);
    }

    /// Answer the next authenticated request with 401 regardless of token.
    pub fn reject_next_auth(&self) {
        self.state.reject_next_auth.store(true, Ordering::SeqCst);
    }

    /// Answer every authenticated request with 401.
    pub fn always_unauthorized(&self, reject: bool) {
        self.state.always_unauthorized.store(reject, Ordering::SeqCst);
    }

    /// Invalidate the current access token server-side.
    pub async fn revoke_access_token(&self) {
        "revoked".clone_into(&mut *self.state.access_token.lock().await);
    }

    /// Fail every cart mutation with a 500.
    pub fn fail_cart_mutations(&self, fail: bool) {
        self.state.fail_cart_mutations.store(fail, Ordering::SeqCst);
    }

    /// Delay the next cart fetch; its body is captured before the delay.
    pub async fn delay_next_cart_fetch(&self, delay: Duration) {
        self.state
            .cart_fetch_delays
            .lock()
            .await
            .push_back(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
    }

    /// Delay every image download.
    pub fn set_image_delay(&self, delay: Duration) {
        self.state
            .image_delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), Ordering::SeqCst);
    }

    // -------------------------------------------------------------------------
    // Observations
    // -------------------------------------------------------------------------

    /// Number of refresh calls received.
    #[must_use]
    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    /// Number of cart mutation calls received (failed ones included).
    #[must_use]
    pub fn cart_mutations(&self) -> usize {
        self.state.cart_mutations.load(Ordering::SeqCst)
    }

    /// Number of product listing calls received.
    #[must_use]
    pub fn product_list_calls(&self) -> usize {
        self.state.product_list_calls.load(Ordering::SeqCst)
    }

    /// Number of image downloads served.
    #[must_use]
    pub fn image_downloads(&self) -> usize {
        self.state.image_downloads.load(Ordering::SeqCst)
    }

    /// `Accept-Language` values seen, in order.
    pub async fn languages(&self) -> Vec<String> {
        self.state.languages.lock().await.clone()
    }

    /// `x-request-id` values seen, in order.
    pub async fn request_ids(&self) -> Vec<String> {
        self.state.request_ids.lock().await.clone()
    }

    /// Access token the backend currently accepts.
    pub async fn access_token(&self) -> String {
        self.state.access_token.lock().await.clone()
    }

    /// Server-side quantity of `product` in the provider's cart.
    pub async fn server_quantity(&self, provider: &str, product: &str) -> Option<u32> {
        self.state
            .carts
            .lock()
            .await
            .get(provider)
            .and_then(|lines| lines.iter().find(|l| l.product == product))
            .map(|l| l.quantity)
    }
}
