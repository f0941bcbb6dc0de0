//! Cart and line item types.
//!
//! A [`Cart`] is an ordered list of [`LineItem`]s with at most one line per
//! product. Quantities are [`NonZeroU32`], so a zero-quantity line cannot be
//! represented: setting a quantity to zero removes the line instead.

use core::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use super::id::ProductId;

/// A catalog product as captured at the moment it is put in a cart.
///
/// Display fields are cached copies of the catalog entry. They are not
/// authoritative and may go stale; they exist so a cart can render before
/// the next refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSnapshot {
    /// Product identifier, stable across device and backend carts.
    #[serde(rename = "productId")]
    pub id: ProductId,
    /// Product title.
    pub title: String,
    /// Unit price in the catalog's currency unit.
    pub unit_price: u64,
    /// Primary image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Short secondary line (material, dimensions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
}

impl ProductSnapshot {
    /// Create a snapshot with no image or subtitle.
    #[must_use]
    pub fn new(id: ProductId, title: impl Into<String>, unit_price: u64) -> Self {
        Self {
            id,
            title: title.into(),
            unit_price,
            image: None,
            subtitle: None,
        }
    }
}

/// One product and its quantity within a [`Cart`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// The product snapshot taken when the line was created.
    #[serde(flatten)]
    pub product: ProductSnapshot,
    /// Number of units, always at least one.
    pub quantity: NonZeroU32,
}

impl LineItem {
    /// Create a line item.
    ///
    /// Returns `None` when `quantity` is zero.
    #[must_use]
    pub fn new(product: ProductSnapshot, quantity: u32) -> Option<Self> {
        NonZeroU32::new(quantity).map(|quantity| Self { product, quantity })
    }

    /// The product identifier of this line.
    #[must_use]
    pub const fn product_id(&self) -> &ProductId {
        &self.product.id
    }

    /// `unit_price * quantity`, saturating at `u64::MAX`.
    #[must_use]
    pub fn line_total(&self) -> u64 {
        self.product
            .unit_price
            .saturating_mul(u64::from(self.quantity.get()))
    }
}

/// An ordered collection of line items keyed by product.
///
/// ## Invariants
///
/// - Every line has `quantity >= 1`
/// - No two lines share a product id
///
/// Deserializing a cart folds duplicate product ids into one line (summing
/// quantities) so the invariants hold for data written by older clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<LineItem>", into = "Vec<LineItem>")]
pub struct Cart {
    items: Vec<LineItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Line items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    /// Iterate over line items in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &LineItem> {
        self.items.iter()
    }

    /// Number of distinct products.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up the line for a product.
    #[must_use]
    pub fn get(&self, product_id: &ProductId) -> Option<&LineItem> {
        self.items.iter().find(|item| item.product_id() == product_id)
    }

    /// Returns `true` if the product has a line in this cart.
    #[must_use]
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.get(product_id).is_some()
    }

    /// Add `quantity` units of a product.
    ///
    /// An existing line is incremented and keeps its original snapshot;
    /// otherwise a new line is appended.
    pub fn add(&mut self, product: ProductSnapshot, quantity: NonZeroU32) {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|item| item.product.id == product.id)
        {
            item.quantity = item.quantity.saturating_add(quantity.get());
        } else {
            self.items.push(LineItem { product, quantity });
        }
    }

    /// Remove the line for a product.
    ///
    /// Returns `true` if a line was removed. Removing an absent product is
    /// not an error.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.product_id() != product_id);
        self.items.len() != before
    }

    /// Replace the quantity of an existing line.
    ///
    /// A quantity of zero removes the line. Returns `true` if the cart
    /// changed; absent products are left alone.
    pub fn set_quantity(&mut self, product_id: &ProductId, quantity: u32) -> bool {
        let Some(quantity) = NonZeroU32::new(quantity) else {
            return self.remove(product_id);
        };

        match self
            .items
            .iter_mut()
            .find(|item| item.product_id() == product_id)
        {
            Some(item) if item.quantity != quantity => {
                item.quantity = quantity;
                true
            }
            _ => false,
        }
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Sum of `unit_price * quantity` over all lines, saturating.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.items
            .iter()
            .fold(0u64, |total, item| total.saturating_add(item.line_total()))
    }

    /// Sum of quantities over all lines (not the number of lines).
    #[must_use]
    pub fn count(&self) -> u64 {
        self.items
            .iter()
            .map(|item| u64::from(item.quantity.get()))
            .sum()
    }
}

impl From<Vec<LineItem>> for Cart {
    fn from(items: Vec<LineItem>) -> Self {
        let mut cart = Self::new();
        for item in items {
            cart.add(item.product, item.quantity);
        }
        cart
    }
}

impl From<Cart> for Vec<LineItem> {
    fn from(cart: Cart) -> Self {
        cart.items
    }
}

impl FromIterator<LineItem> for Cart {
    fn from_iter<I: IntoIterator<Item = LineItem>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl<'a> IntoIterator for &'a Cart {
    type Item = &'a LineItem;
    type IntoIter = core::slice::Iter<'a, LineItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
