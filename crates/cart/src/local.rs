//! Device-scoped cart persistence.
//!
//! [`LocalStore`] owns the cart while the session is anonymous. Every
//! operation reads the persisted cart, applies the change and writes the
//! whole cart back. There are no partial or delta writes.
//!
//! # Payload
//!
//! ```json
//! { "version": 1, "updatedAt": "2026-01-05T10:00:00Z", "items": [ ... ] }
//! ```
//!
//! Older storefront builds wrote a bare array of product objects with a
//! `quantity` field; that shape is still readable. Anything else is treated
//! as an empty cart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use furnish_core::{Cart, LineItem, ProductId, ProductSnapshot};

use crate::storage::{KeyValueStore, StorageError};

/// Current payload version.
const PAYLOAD_VERSION: u32 = 1;

/// Default storage key for the cart.
pub const DEFAULT_CART_KEY: &str = "cart";

/// A mutation was applied but could not be persisted.
///
/// Carries the updated cart so callers can keep showing it.
#[derive(Debug, Error)]
#[error("cart updated but not persisted: {source}")]
pub struct UnsavedCart {
    /// The cart after the mutation.
    pub cart: Cart,
    /// Why the write failed.
    #[source]
    pub source: StorageError,
}

/// Anonymous-session cart kept in device storage.
#[derive(Debug, Clone)]
pub struct LocalStore<S> {
    storage: S,
    key: String,
}

impl<S: KeyValueStore> LocalStore<S> {
    /// Create a store persisting under `key`.
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    /// Create a store persisting under [`DEFAULT_CART_KEY`].
    pub fn with_default_key(storage: S) -> Self {
        Self::new(storage, DEFAULT_CART_KEY)
    }

    /// The underlying storage backend.
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Read the persisted cart.
    ///
    /// Missing, unreadable or corrupt data yields an empty cart. Corruption
    /// is logged and never surfaced.
    #[instrument(skip(self), fields(key = %self.key))]
    pub fn load(&self) -> Cart {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Cart::new(),
            Err(e) => {
                error!(error = %e, "Failed to read stored cart, starting empty");
                return Cart::new();
            }
        };

        parse_payload(&raw).unwrap_or_else(|reason| {
            warn!(%reason, "Stored cart is corrupt, treating as empty");
            Cart::new()
        })
    }

    /// Persist the full cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend rejects the write.
    #[instrument(skip(self, cart), fields(key = %self.key, lines = cart.len()))]
    pub fn save(&self, cart: &Cart) -> Result<(), StorageError> {
        let payload = StoredCart {
            version: PAYLOAD_VERSION,
            updated_at: Utc::now(),
            items: cart.iter().map(StoredLine::from).collect(),
        };
        // Serializing plain owned data cannot fail
        let json = serde_json::to_string(&payload).unwrap_or_default();
        self.storage.set(&self.key, &json)?;
        debug!("Saved local cart");
        Ok(())
    }

    /// Add units of a product, incrementing an existing line.
    ///
    /// A quantity of zero leaves the cart unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`UnsavedCart`] if the result could not be persisted.
    pub fn add(&self, product: ProductSnapshot, quantity: u32) -> Result<Cart, UnsavedCart> {
        self.mutate(|cart| {
            if let Some(line) = LineItem::new(product, quantity) {
                cart.add(line.product, line.quantity);
            }
        })
    }

    /// Remove a product's line. Absent products are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`UnsavedCart`] if the result could not be persisted.
    pub fn remove(&self, product_id: &ProductId) -> Result<Cart, UnsavedCart> {
        self.mutate(|cart| {
            cart.remove(product_id);
        })
    }

    /// Replace a line's quantity; zero or less removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`UnsavedCart`] if the result could not be persisted.
    pub fn update_quantity(
        &self,
        product_id: &ProductId,
        quantity: i64,
    ) -> Result<Cart, UnsavedCart> {
        self.mutate(|cart| {
            cart.set_quantity(product_id, clamp_quantity(quantity));
        })
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns [`UnsavedCart`] if the result could not be persisted.
    pub fn clear(&self) -> Result<Cart, UnsavedCart> {
        self.mutate(Cart::clear)
    }

    /// Drop the lines whose products are in `merged`, keeping the rest.
    ///
    /// # Errors
    ///
    /// Returns [`UnsavedCart`] if the result could not be persisted.
    pub(crate) fn prune(&self, merged: &[ProductId]) -> Result<Cart, UnsavedCart> {
        self.mutate(|cart| {
            for id in merged {
                cart.remove(id);
            }
        })
    }

    fn mutate(&self, apply: impl FnOnce(&mut Cart)) -> Result<Cart, UnsavedCart> {
        let mut cart = self.load();
        apply(&mut cart);
        match self.save(&cart) {
            Ok(()) => Ok(cart),
            Err(source) => Err(UnsavedCart { cart, source }),
        }
    }
}

/// Clamp a caller-supplied quantity into `0..=u32::MAX`.
pub(crate) fn clamp_quantity(quantity: i64) -> u32 {
    if quantity <= 0 {
        0
    } else {
        u32::try_from(quantity).unwrap_or(u32::MAX)
    }
}

// =============================================================================
// Payload
// =============================================================================

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCart {
    version: u32,
    updated_at: DateTime<Utc>,
    items: Vec<StoredLine>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredLine {
    product_id: String,
    #[serde(default)]
    title: String,
    unit_price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subtitle: Option<String>,
    quantity: i64,
}

impl From<&LineItem> for StoredLine {
    fn from(item: &LineItem) -> Self {
        Self {
            product_id: item.product.id.to_string(),
            title: item.product.title.clone(),
            unit_price: item.product.unit_price,
            image: item.product.image.clone(),
            subtitle: item.product.subtitle.clone(),
            quantity: i64::from(item.quantity.get()),
        }
    }
}

/// Product object with a quantity, as written by older web storefront builds.
#[derive(Deserialize)]
struct LegacyLine {
    id: serde_json::Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    image: Option<serde_json::Value>,
    #[serde(default)]
    subtitle: Option<serde_json::Value>,
    quantity: i64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Envelope(StoredCart),
    Legacy(Vec<LegacyLine>),
}

fn parse_payload(raw: &str) -> Result<Cart, String> {
    let payload: Payload = serde_json::from_str(raw).map_err(|e| e.to_string())?;

    let lines: Vec<(String, ProductSnapshotParts, i64)> = match payload {
        Payload::Envelope(stored) => {
            if stored.version != PAYLOAD_VERSION {
                return Err(format!("unsupported payload version {}", stored.version));
            }
            stored
                .items
                .into_iter()
                .map(|line| {
                    (
                        line.product_id,
                        ProductSnapshotParts {
                            title: line.title,
                            unit_price: line.unit_price,
                            image: line.image,
                            subtitle: line.subtitle,
                        },
                        line.quantity,
                    )
                })
                .collect()
        }
        Payload::Legacy(items) => items
            .into_iter()
            .map(|line| {
                let id = match line.id {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (
                    id,
                    ProductSnapshotParts {
                        title: line.title,
                        unit_price: price_units(line.price),
                        image: line.image.and_then(|v| v.as_str().map(String::from)),
                        subtitle: line.subtitle.and_then(|v| v.as_str().map(String::from)),
                    },
                    line.quantity,
                )
            })
            .collect(),
    };

    Ok(lines
        .into_iter()
        .filter_map(|(id, parts, quantity)| {
            let id = ProductId::parse(&id).ok()?;
            LineItem::new(parts.into_snapshot(id), clamp_quantity(quantity))
        })
        .collect())
}

struct ProductSnapshotParts {
    title: String,
    unit_price: u64,
    image: Option<String>,
    subtitle: Option<String>,
}

impl ProductSnapshotParts {
    fn into_snapshot(self, id: ProductId) -> ProductSnapshot {
        ProductSnapshot {
            id,
            title: self.title,
            unit_price: self.unit_price,
            image: self.image,
            subtitle: self.subtitle,
        }
    }
}

/// Convert a JSON number price into whole units; negative or non-finite is zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // clamped to >= 0 and rounded
pub(crate) fn price_units(price: f64) -> u64 {
    if price.is_finite() && price > 0.0 {
        price.round() as u64
    } else {
        0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::storage::MemoryStore;

    fn store() -> LocalStore<Arc<MemoryStore>> {
        LocalStore::with_default_key(Arc::new(MemoryStore::new()))
    }

    fn product(id: &str, price: u64) -> ProductSnapshot {
        ProductSnapshot::new(ProductId::parse(id).unwrap(), format!("Product {id}"), price)
    }

    fn id(s: &str) -> ProductId {
        ProductId::parse(s).unwrap()
    }

    /// Storage that accepts reads but fails every write.
    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn set(&self, key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::other("disk full"),
            })
        }

        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn test_load_missing_is_empty() {
        assert!(store().load().is_empty());
    }

    #[test]
    fn test_add_persists_and_increments() {
        let local = store();
        local.add(product("sofa", 2_500_000), 1).unwrap();
        let cart = local.add(product("sofa", 2_500_000), 2).unwrap();

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.count(), 3);
        assert_eq!(local.load(), cart);
    }

    #[test]
    fn test_add_zero_is_noop() {
        let local = store();
        let cart = local.add(product("sofa", 10), 0).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_absent_leaves_cart_unchanged() {
        let local = store();
        let before = local.add(product("a", 10), 2).unwrap();
        let after = local.remove(&id("nope")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_update_quantity_replaces() {
        let local = store();
        local.add(product("a", 10), 2).unwrap();
        let cart = local.update_quantity(&id("a"), 5).unwrap();
        assert_eq!(cart.get(&id("a")).unwrap().quantity.get(), 5);
    }

    #[test]
    fn test_update_quantity_non_positive_removes() {
        let local = store();
        local.add(product("a", 10), 2).unwrap();
        local.add(product("b", 10), 1).unwrap();

        let cart = local.update_quantity(&id("a"), 0).unwrap();
        assert!(!cart.contains(&id("a")));

        let cart = local.update_quantity(&id("b"), -3).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_update_quantity_absent_is_noop() {
        let local = store();
        let before = local.add(product("a", 10), 2).unwrap();
        assert_eq!(local.update_quantity(&id("zzz"), 4).unwrap(), before);
    }

    #[test]
    fn test_clear() {
        let local = store();
        local.add(product("a", 10), 2).unwrap();
        assert!(local.clear().unwrap().is_empty());
        assert!(local.load().is_empty());
    }

    #[test]
    fn test_prune_keeps_unlisted_lines() {
        let local = store();
        local.add(product("a", 10), 2).unwrap();
        local.add(product("b", 10), 1).unwrap();

        let cart = local.prune(&[id("a")]).unwrap();
        assert_eq!(cart.len(), 1);
        assert!(cart.contains(&id("b")));
    }

    #[test]
    fn test_corrupt_payload_loads_empty() {
        let local = store();
        for garbage in ["{not json", "42", r#"{"version": 7, "updatedAt": "2026-01-01T00:00:00Z", "items": []}"#, ""] {
            local.storage().set(DEFAULT_CART_KEY, garbage).unwrap();
            assert!(local.load().is_empty(), "payload {garbage:?} should load empty");
        }
    }

    #[test]
    fn test_corrupt_payload_is_overwritten_on_next_add() {
        let local = store();
        local.storage().set(DEFAULT_CART_KEY, "][").unwrap();
        let cart = local.add(product("a", 10), 1).unwrap();
        assert_eq!(cart.count(), 1);
        assert_eq!(local.load(), cart);
    }

    #[test]
    fn test_loads_legacy_array() {
        let local = store();
        let legacy = r#"[
            {"id": "65a1", "_id": "65a1", "title": "Syltherine", "subtitle": "Stylish cafe chair",
             "price": 2500000, "image": "/images/syltherine.png", "quantity": 2, "category": "chairs"},
            {"id": 7, "title": "Lolito", "price": 7000000.4, "image": null, "quantity": 1},
            {"id": "dropped", "title": "Zero", "price": 1, "quantity": 0}
        ]"#;
        local.storage().set(DEFAULT_CART_KEY, legacy).unwrap();

        let cart = local.load();
        assert_eq!(cart.len(), 2);
        let chair = cart.get(&id("65a1")).unwrap();
        assert_eq!(chair.product.unit_price, 2_500_000);
        assert_eq!(chair.product.subtitle.as_deref(), Some("Stylish cafe chair"));
        assert_eq!(chair.product.image.as_deref(), Some("/images/syltherine.png"));
        let lolito = cart.get(&id("7")).unwrap();
        assert_eq!(lolito.product.unit_price, 7_000_000);
        assert_eq!(lolito.product.image, None);
    }

    #[test]
    fn test_load_normalizes_envelope() {
        let local = store();
        let raw = r#"{"version": 1, "updatedAt": "2026-01-01T00:00:00Z", "items": [
            {"productId": "a", "title": "A", "unitPrice": 5, "quantity": 1},
            {"productId": "a", "title": "A", "unitPrice": 5, "quantity": 2},
            {"productId": "b", "title": "B", "unitPrice": 5, "quantity": 0},
            {"productId": "  ", "title": "Blank", "unitPrice": 5, "quantity": 1}
        ]}"#;
        local.storage().set(DEFAULT_CART_KEY, raw).unwrap();

        let cart = local.load();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.count(), 3);
    }

    #[test]
    fn test_saved_payload_shape() {
        let local = store();
        local.add(product("a", 10), 1).unwrap();
        let raw = local.storage().get(DEFAULT_CART_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["version"], 1);
        assert!(value["updatedAt"].is_string());
        assert_eq!(value["items"][0]["productId"], "a");
        assert_eq!(value["items"][0]["quantity"], 1);
    }

    #[test]
    fn test_write_failure_returns_updated_cart() {
        let local = LocalStore::with_default_key(ReadOnlyStore);
        let err = local.add(product("a", 10), 2).unwrap_err();
        assert_eq!(err.cart.count(), 2);
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_clamp_quantity() {
        assert_eq!(clamp_quantity(-5), 0);
        assert_eq!(clamp_quantity(0), 0);
        assert_eq!(clamp_quantity(3), 3);
        assert_eq!(clamp_quantity(i64::MAX), u32::MAX);
    }
}
