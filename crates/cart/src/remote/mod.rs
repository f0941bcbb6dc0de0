//! Backend cart resource.
//!
//! # Architecture
//!
//! - [`RemoteCart`] is the seam the reconciler talks to; every call takes
//!   the session's [`AccessToken`] explicitly
//! - [`HttpCartClient`] implements it over `reqwest` against the REST API
//! - Mutations return nothing: callers re-fetch to learn the
//!   authoritative cart, except after `clear`
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | fetch | `GET /cart` |
//! | add | `POST /cart/items` `{ productId, quantity }` |
//! | update | `PATCH /cart/items/{productId}` `{ quantity }` |
//! | remove | `DELETE /cart/items/{productId}` |
//! | clear | `DELETE /cart` |

mod http;
pub mod wire;

pub use http::HttpCartClient;
pub(crate) use http::{endpoint, error_message};

use async_trait::async_trait;
use thiserror::Error;

use furnish_core::{AccessToken, Cart, ProductId};

use crate::error::ErrorKind;

/// Errors that can occur when calling the backend cart resource.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The credential was rejected (absent, expired or revoked).
    #[error("session rejected by backend (HTTP {status})")]
    SessionExpired {
        /// HTTP status returned (401 or 403).
        status: u16,
    },

    /// The call did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection or protocol failure before a response arrived.
    #[error("HTTP error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body.
        message: String,
    },

    /// Backend answered with a body that could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Client could not be constructed.
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl RemoteError {
    /// Map a transport error, separating timeouts from other failures.
    #[must_use]
    pub fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(error)
        }
    }

    /// Classification used by the reconciler and the UI.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionExpired { .. } => ErrorKind::SessionExpired,
            Self::Timeout => ErrorKind::Timeout,
            Self::Transport(_) | Self::Api { .. } | Self::Parse(_) | Self::Config(_) => {
                ErrorKind::RemoteUnavailable
            }
        }
    }
}

/// Authenticated-session cart held by the backend.
///
/// Implementations must be safe to call from any task; the reconciler
/// serializes calls per cart.
#[async_trait]
pub trait RemoteCart: Send + Sync {
    /// Read the current server-side cart.
    async fn fetch(&self, token: &AccessToken) -> Result<Cart, RemoteError>;

    /// Add units of a product; the backend increments an existing line.
    async fn add_item(
        &self,
        token: &AccessToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError>;

    /// Replace a line's quantity. Callers never pass zero.
    async fn update_item(
        &self,
        token: &AccessToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError>;

    /// Remove a product's line.
    async fn remove_item(&self, token: &AccessToken, product_id: &ProductId)
    -> Result<(), RemoteError>;

    /// Empty the cart.
    async fn clear(&self, token: &AccessToken) -> Result<(), RemoteError>;
}

#[async_trait]
impl<T: RemoteCart + ?Sized> RemoteCart for std::sync::Arc<T> {
    async fn fetch(&self, token: &AccessToken) -> Result<Cart, RemoteError> {
        (**self).fetch(token).await
    }

    async fn add_item(
        &self,
        token: &AccessToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        (**self).add_item(token, product_id, quantity).await
    }

    async fn update_item(
        &self,
        token: &AccessToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        (**self).update_item(token, product_id, quantity).await
    }

    async fn remove_item(
        &self,
        token: &AccessToken,
        product_id: &ProductId,
    ) -> Result<(), RemoteError> {
        (**self).remove_item(token, product_id).await
    }

    async fn clear(&self, token: &AccessToken) -> Result<(), RemoteError> {
        (**self).clear(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::Api {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 500 - boom");

        let err = RemoteError::SessionExpired { status: 401 };
        assert_eq!(err.to_string(), "session rejected by backend (HTTP 401)");
    }

    #[test]
    fn test_remote_error_kind() {
        assert_eq!(
            RemoteError::SessionExpired { status: 403 }.kind(),
            ErrorKind::SessionExpired
        );
        assert_eq!(RemoteError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(
            RemoteError::Parse("bad".to_string()).kind(),
            ErrorKind::RemoteUnavailable
        );
        assert_eq!(
            RemoteError::Api {
                status: 503,
                message: String::new()
            }
            .kind(),
            ErrorKind::RemoteUnavailable
        );
    }
}
