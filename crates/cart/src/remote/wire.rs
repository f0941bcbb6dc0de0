//! Backend request and response shapes.
//!
//! The backend embeds the full product document in each cart item:
//!
//! ```json
//! { "items": [ { "product": { "_id": "65a1", "title": "Syltherine",
//!   "image": "/img/s.png", "price": 2500000 }, "quantity": 2, "price": 2500000 } ] }
//! ```
//!
//! The embedded product becomes the line's display snapshot. A line-level
//! `price` (the price captured when the item was added) wins over the
//! product's current price.

use serde::{Deserialize, Serialize};
use tracing::warn;

use furnish_core::{Cart, LineItem, ProductId, ProductSnapshot};

use crate::local::{clamp_quantity, price_units};

/// `GET /cart` response body.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CartResponse {
    /// Cart lines.
    #[serde(default)]
    pub items: Vec<CartItemResponse>,
}

/// One line in a [`CartResponse`].
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CartItemResponse {
    /// Embedded product; `null` when the product was deleted.
    pub product: Option<ProductRef>,
    /// Units in the cart.
    pub quantity: i64,
    /// Price captured when the item was added.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// Product reference embedded in a cart line.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProductRef {
    /// Document id.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// Virtual id some backends add alongside `_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Product title.
    #[serde(default)]
    pub title: String,
    /// Short secondary line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    /// Primary image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Current catalog price.
    #[serde(default)]
    pub price: f64,
}

/// `POST /cart/items` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    /// Product to add.
    pub product_id: String,
    /// Units to add.
    pub quantity: u32,
}

/// `PATCH /cart/items/{productId}` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateItemRequest {
    /// New quantity.
    pub quantity: u32,
}

/// Error body returned by the backend on failure.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub message: String,
}

impl CartItemResponse {
    /// Convert into a line item.
    ///
    /// Returns `None` for lines without a product, without an id, or with a
    /// non-positive quantity.
    #[must_use]
    pub fn into_line_item(self) -> Option<LineItem> {
        let product = self.product?;
        let raw_id = product.object_id.or(product.id)?;
        let id = ProductId::parse(&raw_id).ok()?;
        let unit_price = price_units(self.price.unwrap_or(product.price));

        let snapshot = ProductSnapshot {
            id,
            title: product.title,
            unit_price,
            image: product.image,
            subtitle: product.subtitle,
        };
        LineItem::new(snapshot, clamp_quantity(self.quantity))
    }
}

impl From<CartResponse> for Cart {
    fn from(response: CartResponse) -> Self {
        let total = response.items.len();
        let cart: Self = response
            .items
            .into_iter()
            .filter_map(CartItemResponse::into_line_item)
            .collect();

        let skipped = total.saturating_sub(cart.len());
        if skipped > 0 {
            warn!(skipped, "Dropped unusable lines from backend cart");
        }
        cart
    }
}
