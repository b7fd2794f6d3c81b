//! Saved delivery addresses.
//!
//! CRUD is delegated to the backend. The only client-side rule is display
//! order: the default address first, then by name.

use std::cmp::Ordering;

use petmart_core::AddressId;
use tracing::instrument;

use crate::client::PetmartClient;
use crate::error::{ClientError, Result};
use crate::http::ApiRequest;
use crate::types::{Address, NewAddress};

/// Display order: default first, then case-insensitive by name.
fn display_order(a: &Address, b: &Address) -> Ordering {
    b.is_default
        .cmp(&a.is_default)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

fn validate(address: &NewAddress) -> Result<()> {
    if address.name.trim().is_empty() {
        return Err(ClientError::InvalidInput(
            "address name cannot be empty".to_string(),
        ));
    }
    if address.formatted_address.trim().is_empty() {
        return Err(ClientError::InvalidInput(
            "formatted address cannot be empty".to_string(),
        ));
    }
    if !(-90.0..=90.0).contains(&address.latitude) {
        return Err(ClientError::InvalidInput(format!(
            "latitude {} is outside [-90, 90]",
            address.latitude
        )));
    }
    if !(-180.0..=180.0).contains(&address.longitude) {
        return Err(ClientError::InvalidInput(format!(
            "longitude {} is outside [-180, 180]",
            address.longitude
        )));
    }
    Ok(())
}

impl PetmartClient {
    /// List saved addresses in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the API request fails.
    #[instrument(skip(self))]
    pub async fn addresses(&self) -> Result<Vec<Address>> {
        let mut addresses: Vec<Address> = self
            .fetch_optional(ApiRequest::get("api/addresses"))
            .await?
            .unwrap_or_default();

        addresses.sort_by(display_order);
        Ok(addresses)
    }

    /// Save a new address.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidInput` for empty names or out-of-range
    /// coordinates, or any API error.
    #[instrument(skip(self, address), fields(name = %address.name))]
    pub async fn create_address(&self, address: &NewAddress) -> Result<Address> {
        validate(address)?;
        self.fetch(ApiRequest::post("api/addresses").json(serde_json::to_value(address)?))
            .await
    }

    /// Replace an existing address.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_address`], plus `ClientError::NotFound`.
    #[instrument(skip(self, address), fields(address_id = %id))]
    pub async fn update_address(&self, id: &AddressId, address: &NewAddress) -> Result<Address> {
        validate(address)?;
        self.fetch(
            ApiRequest::put(format!("api/addresses/{id}")).json(serde_json::to_value(address)?),
        )
        .await
    }

    /// Delete an address.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` or any API error.
    #[instrument(skip(self), fields(address_id = %id))]
    pub async fn delete_address(&self, id: &AddressId) -> Result<()> {
        self.execute(ApiRequest::delete(format!("api/addresses/{id}")))
            .await
    }

    /// Make an address the default.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` or any API error.
    #[instrument(skip(self), fields(address_id = %id))]
    pub async fn set_default_address(&self, id: &AddressId) -> Result<()> {
        self.execute(ApiRequest::put(format!("api/addresses/{id}/default")))
            .await
    }
}
