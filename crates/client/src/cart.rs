//! Local cart mirror with optimistic updates.
//!
//! The server owns the cart, keyed by (user, provider). The client keeps a
//! mirror per provider so counts and totals can be shown immediately.
//!
//! # Quantity updates
//!
//! 1. The mirror is changed right away (optimistic).
//! 2. Exactly one call is made: increase, reduce or remove by the sign of
//!    the change.
//! 3. On success the cart is refetched from the server. On failure the
//!    optimistic change is reverted.
//!
//! # Ordering
//!
//! Every mutation bumps the provider's generation. A refetch only replaces
//! the mirror if no mutation started after the refetch did. Responses that
//! land out of order are dropped instead of overwriting newer state.
//!
//! # Reverts
//!
//! Undo is tracked per line. The first pending change to a line records
//! the line as the server last had it; later changes to the same line keep
//! that baseline and adjust it as earlier calls succeed. When a call fails,
//! its line goes back to the baseline unless a newer change to the same
//! line is still pending, in which case that change owns the restore.

use std::collections::HashMap;

use petmart_core::{CartItemId, ProductId, ProviderId};
use tracing::{debug, instrument, warn};

use crate::client::PetmartClient;
use crate::error::{ClientError, Result};
use crate::http::ApiRequest;
use crate::types::{Cart, CartItem};

/// Mirror of one provider's cart.
#[derive(Debug, Clone, Default)]
pub(crate) struct CartSlot {
    cart: Cart,
    generation: u64,
    pending: HashMap<CartItemId, PendingLine>,
}

/// A line with at least one unconfirmed change.
#[derive(Debug, Clone)]
struct PendingLine {
    /// Position and contents the server is known to have; `None` if absent.
    base: Option<(usize, CartItem)>,
    /// Generation of the newest change to this line.
    generation: u64,
}

impl CartSlot {
    /// Record that the mutation at `generation` changes `item`.
    fn touch(&mut self, item: &CartItemId, generation: u64) {
        if let Some(pending) = self.pending.get_mut(item) {
            pending.generation = generation;
            return;
        }

        let base = self
            .cart
            .items
            .iter()
            .enumerate()
            .find(|(_, line)| &line.id == item)
            .map(|(index, line)| (index, line.clone()));
        self.pending
            .insert(item.clone(), PendingLine { base, generation });
    }

    /// The server applied `mutation` to `item`; move the baseline with it.
    fn settle(&mut self, item: &CartItemId, generation: u64, mutation: CartMutation) {
        let Some(pending) = self.pending.get_mut(item) else {
            return;
        };

        pending.base = match (pending.base.take(), mutation) {
            (Some((index, mut line)), CartMutation::Increase(by)) => {
                line.quantity = line.quantity.saturating_add(by);
                Some((index, line))
            }
            (Some((index, mut line)), CartMutation::Reduce(by)) if line.quantity > by => {
                line.quantity -= by;
                Some((index, line))
            }
            (Some((index, line)), CartMutation::Unchanged) => Some((index, line)),
            _ => None,
        };

        if pending.generation == generation {
            self.pending.remove(item);
        }
    }

    /// The call at `generation` for `item` failed; restore the baseline if
    /// no newer change to the line is pending.
    fn rollback(&mut self, item: &CartItemId, generation: u64) {
        let owns_revert = self
            .pending
            .get(item)
            .is_some_and(|pending| pending.generation == generation);
        if !owns_revert {
            debug!(item_id = %item, "Newer change pending, leaving revert to it");
            return;
        }

        let Some(pending) = self.pending.remove(item) else {
            return;
        };
        debug!(item_id = %item, "Reverting optimistic cart change");

        let existing = self.cart.items.iter().position(|line| &line.id == item);
        match (pending.base, existing) {
            (Some((_, line)), Some(index)) => {
                if let Some(slot) = self.cart.items.get_mut(index) {
                    *slot = line;
                }
            }
            (Some((index, line)), None) => {
                let index = index.min(self.cart.items.len());
                self.cart.items.insert(index, line);
            }
            (None, Some(index)) => {
                self.cart.items.remove(index);
            }
            (None, None) => {}
        }
    }

    /// Drop everything mirrored and invalidate in-flight work.
    fn reset(&mut self, provider: &ProviderId) {
        self.cart = Cart::empty(provider.clone());
        self.pending.clear();
        self.generation += 1;
    }
}

/// The single network call a quantity change maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CartMutation {
    Increase(u32),
    Reduce(u32),
    Remove,
    Unchanged,
}

impl CartMutation {
    const fn plan(current: u32, target: u32) -> Self {
        if target == 0 {
            Self::Remove
        } else if target > current {
            Self::Increase(target - current)
        } else if target < current {
            Self::Reduce(current - target)
        } else {
            Self::Unchanged
        }
    }
}

impl PetmartClient {
    /// Cart as currently mirrored, without a network call.
    pub async fn cart_snapshot(&self, provider: &ProviderId) -> Cart {
        self.carts()
            .read()
            .await
            .get(provider)
            .map_or_else(|| Cart::empty(provider.clone()), |slot| slot.cart.clone())
    }

    /// Item count of the mirrored cart for `provider`.
    pub async fn cart_count(&self, provider: &ProviderId) -> u32 {
        self.carts()
            .read()
            .await
            .get(provider)
            .map_or(0, |slot| slot.cart.count())
    }

    /// Item count across every mirrored cart.
    pub async fn total_cart_count(&self) -> u32 {
        self.carts()
            .read()
            .await
            .values()
            .map(|slot| slot.cart.count())
            .sum()
    }

    /// Refetch the cart from the server and replace the mirror.
    ///
    /// If a mutation started while the fetch was in flight, the fetched cart
    /// is stale and the mirror is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails; the mirror is left unchanged.
    #[instrument(skip(self), fields(provider_id = %provider))]
    pub async fn refresh_cart(&self, provider: &ProviderId) -> Result<Cart> {
        let started_at = self.generation(provider).await;

        let fetched: Option<Cart> = self
            .fetch_optional(ApiRequest::get("api/cart").query("providerId", provider))
            .await?;

        let mut fetched = fetched.unwrap_or_else(|| Cart::empty(provider.clone()));
        fetched.provider_id.get_or_insert_with(|| provider.clone());

        let mut carts = self.carts().write().await;
        let slot = carts.entry(provider.clone()).or_default();

        if slot.generation == started_at {
            slot.cart = fetched;
        } else {
            debug!(
                started_at,
                current = slot.generation,
                "Dropping stale cart response"
            );
        }

        Ok(slot.cart.clone())
    }

    /// Add `quantity` of `product` to the provider's cart, then refetch.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidInput` for a zero quantity, or any API error.
    #[instrument(skip(self), fields(provider_id = %provider, product_id = %product))]
    pub async fn add_to_cart(
        &self,
        provider: &ProviderId,
        product: &ProductId,
        quantity: u32,
    ) -> Result<Cart> {
        if quantity == 0 {
            return Err(ClientError::InvalidInput(
                "quantity must be at least 1".to_string(),
            ));
        }

        self.bump_generation(provider).await;

        self.execute(ApiRequest::post("api/cart/items").json(serde_json::json!({
            "providerId": provider,
            "productId": product,
            "quantity": quantity,
        })))
        .await?;

        Ok(self.refetch_after_mutation(provider).await)
    }

    /// Set a line's quantity; zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if the line is not in the mirror (call
    /// [`Self::refresh_cart`] first), or the API error that caused the
    /// optimistic change to be reverted.
    #[instrument(skip(self), fields(provider_id = %provider, item_id = %item))]
    pub async fn set_cart_quantity(
        &self,
        provider: &ProviderId,
        item: &CartItemId,
        target: u32,
    ) -> Result<Cart> {
        // Optimistic update
        let (generation, mutation) = {
            let mut carts = self.carts().write().await;
            let slot = carts
                .get_mut(provider)
                .ok_or_else(|| ClientError::NotFound(format!("no cart for provider {provider}")))?;

            let current = slot
                .cart
                .item(item)
                .map(|line| line.quantity)
                .ok_or_else(|| ClientError::NotFound(format!("cart item {item}")))?;

            let mutation = CartMutation::plan(current, target);
            if mutation == CartMutation::Unchanged {
                return Ok(slot.cart.clone());
            }

            slot.generation += 1;
            let generation = slot.generation;
            slot.touch(item, generation);

            if target == 0 {
                slot.cart.items.retain(|line| &line.id != item);
            } else if let Some(line) = slot.cart.items.iter_mut().find(|line| &line.id == item) {
                line.quantity = target;
            }

            (generation, mutation)
        };

        let request = match mutation {
            CartMutation::Increase(by) => ApiRequest::put("api/cart/items/increase")
                .json(serde_json::json!({ "itemId": item, "quantity": by })),
            CartMutation::Reduce(by) => ApiRequest::put("api/cart/items/reduce")
                .json(serde_json::json!({ "itemId": item, "quantity": by })),
            CartMutation::Remove | CartMutation::Unchanged => {
                ApiRequest::delete(format!("api/cart/items/{item}"))
            }
        };

        let outcome = self.execute(request).await;

        if let Some(slot) = self.carts().write().await.get_mut(provider) {
            if outcome.is_ok() {
                slot.settle(item, generation, mutation);
            } else {
                slot.rollback(item, generation);
            }
        }
        outcome?;

        Ok(self.refetch_after_mutation(provider).await)
    }

    /// Remove a line from the cart.
    ///
    /// # Errors
    ///
    /// Same as [`Self::set_cart_quantity`].
    pub async fn remove_from_cart(&self, provider: &ProviderId, item: &CartItemId) -> Result<Cart> {
        self.set_cart_quantity(provider, item, 0).await
    }

    /// Empty the provider's cart on the server and locally.
    ///
    /// # Errors
    ///
    /// Returns an API error; the mirror is restored in that case.
    #[instrument(skip(self), fields(provider_id = %provider))]
    pub async fn clear_cart(&self, provider: &ProviderId) -> Result<()> {
        let (lines, generation) = {
            let mut carts = self.carts().write().await;
            let slot = carts.entry(provider.clone()).or_default();
            slot.generation += 1;
            let generation = slot.generation;

            let lines: Vec<CartItemId> =
                slot.cart.items.iter().map(|line| line.id.clone()).collect();
            for line in &lines {
                slot.touch(line, generation);
            }
            slot.cart.items.clear();
            (lines, generation)
        };

        let outcome = self
            .execute(ApiRequest::delete("api/cart").query("providerId", provider))
            .await;

        if let Some(slot) = self.carts().write().await.get_mut(provider) {
            for line in &lines {
                if outcome.is_ok() {
                    slot.settle(line, generation, CartMutation::Remove);
                } else {
                    slot.rollback(line, generation);
                }
            }
        }

        outcome
    }

    /// Forget the mirror for `provider` without touching the server.
    pub(crate) async fn forget_cart(&self, provider: &ProviderId) {
        self.carts()
            .write()
            .await
            .entry(provider.clone())
            .or_default()
            .reset(provider);
    }

    /// Forget every mirrored cart, e.g. when the signed-in user changes.
    ///
    /// Slots are kept so refetches that started under the old session see a
    /// newer generation and drop their response.
    pub(crate) async fn forget_all_carts(&self) {
        for (provider, slot) in self.carts().write().await.iter_mut() {
            slot.reset(provider);
        }
    }

    /// Refetch after a successful mutation. A failed refetch keeps the
    /// optimistic state; the next refresh reconciles it.
    async fn refetch_after_mutation(&self, provider: &ProviderId) -> Cart {
        match self.refresh_cart(provider).await {
            Ok(cart) => cart,
            Err(e) => {
                warn!(error = %e, "Cart refetch failed, keeping local state");
                self.cart_snapshot(provider).await
            }
        }
    }

    /// Current generation, creating the slot so a later session reset can
    /// invalidate this caller.
    async fn generation(&self, provider: &ProviderId) -> u64 {
        self.carts()
            .write()
            .await
            .entry(provider.clone())
            .or_default()
            .generation
    }

    async fn bump_generation(&self, provider: &ProviderId) {
        self.carts()
            .write()
            .await
            .entry(provider.clone())
            .or_default()
            .generation += 1;
    }
}
