//! Wire types for the marketplace REST API.
//!
//! Field names follow the backend's camelCase JSON. Optional fields default
//! so older backend versions that omit them still parse.

use chrono::{DateTime, Utc};
use petmart_core::{
    AddressId, CartItemId, CategoryId, CurrencyCode, OrderId, OrderStatus, PhoneNumber, Price,
    ProductId, ProviderId, StaffId, StaffRole, UserId,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// Users
// =============================================================================

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: Option<String>,
    pub phone: PhoneNumber,
    #[serde(default)]
    pub email: Option<String>,
    /// Set when the user works for a provider.
    #[serde(default)]
    pub role: Option<StaffRole>,
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
}

// =============================================================================
// Catalog
// =============================================================================

/// Whether a listing is a physical product or a bookable service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    #[default]
    Product,
    Service,
}

/// A product or service sold by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub image: Option<String>,
    pub provider_id: ProviderId,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default = "default_true")]
    pub in_stock: bool,
    #[serde(default)]
    pub kind: ProductKind,
}

const fn default_true() -> bool {
    true
}

/// A catalog category (e.g., grooming, food, toys).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// A pet shop or service vendor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub total: u64,
}

const fn first_page() -> u32 {
    1
}

impl<T> Page<T> {
    /// Whether more items exist past this page, given the page size used.
    #[must_use]
    pub fn has_more(&self, limit: u32) -> bool {
        u64::from(self.page) * u64::from(limit) < self.total
    }
}

/// Filters for a product listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProductQuery {
    pub category: Option<CategoryId>,
    pub provider: Option<ProviderId>,
    /// Free-text search. Search results are never cached.
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// =============================================================================
// Cart
// =============================================================================

/// The product summary embedded in a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProduct {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// One cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: CartItemId,
    pub product: CartProduct,
    pub quantity: u32,
    /// Unit price.
    pub price: Price,
}

impl CartItem {
    /// Price of the whole line.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.times(self.quantity)
    }
}

/// A user's cart with one provider.
///
/// The item count is derived from the lines and never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
    #[serde(default)]
    pub items: Vec<CartItem>,
}

impl Cart {
    /// An empty cart for `provider`.
    #[must_use]
    pub fn empty(provider: ProviderId) -> Self {
        Self {
            provider_id: Some(provider),
            items: Vec::new(),
        }
    }

    /// Total quantity across all lines.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        let currency = self
            .items
            .first()
            .map_or_else(CurrencyCode::default, |item| item.price.currency_code);

        self.items.iter().fold(Price::zero(currency), |acc, item| {
            Price::new(acc.amount + item.line_total().amount, currency)
        })
    }

    /// Look up a line by ID.
    #[must_use]
    pub fn item(&self, id: &CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// =============================================================================
// Addresses
// =============================================================================

/// A saved delivery location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: AddressId,
    pub name: String,
    pub formatted_address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub is_default: bool,
}

/// Fields for creating or replacing an address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAddress {
    pub name: String,
    pub formatted_address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub is_default: bool,
}

// =============================================================================
// Orders
// =============================================================================

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    CashOnDelivery,
    Card,
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash_on_delivery" | "cash" | "cod" => Ok(Self::CashOnDelivery),
            "card" => Ok(Self::Card),
            _ => Err(format!("invalid payment method: {s}")),
        }
    }
}

/// A line of a placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub price: Price,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub provider_id: ProviderId,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    pub total: Price,
    #[serde(default)]
    pub address_id: Option<AddressId>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Request body for placing an order from the provider's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    pub provider_id: ProviderId,
    pub address_id: AddressId,
    pub payment_method: PaymentMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

// =============================================================================
// Provider staff
// =============================================================================

/// Someone working for a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
    pub id: StaffId,
    pub name: String,
    pub phone: PhoneNumber,
    pub role: StaffRole,
}

/// Fields for adding a staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStaff {
    pub name: String,
    pub phone: PhoneNumber,
    pub role: StaffRole,
}
