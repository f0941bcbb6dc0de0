//! REST implementation of [`RemoteCart`].

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use tracing::{debug, error, instrument};
use url::Url;

use furnish_core::{AccessToken, Cart, ProductId};

use super::wire::{AddItemRequest, ApiErrorBody, CartResponse, UpdateItemRequest};
use super::{RemoteCart, RemoteError};
use crate::config::ApiConfig;

/// Header carrying a per-call correlation id.
const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Client for the backend cart resource.
#[derive(Debug, Clone)]
pub struct HttpCartClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpCartClient {
    /// Create a new cart client.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL cannot carry a path or the HTTP
    /// client fails to build.
    pub fn new(config: &ApiConfig) -> Result<Self, RemoteError> {
        if config.base_url.cannot_be_a_base() {
            return Err(RemoteError::Config(format!(
                "base URL cannot carry a path: {}",
                config.base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| RemoteError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Build an endpoint URL from path segments, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        endpoint(&self.base_url, segments)
    }

    /// Send a request and map the status into a [`RemoteError`].
    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        url: Url,
        token: &AccessToken,
        body: Option<&B>,
    ) -> Result<String, RemoteError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(token.expose())
            .header(REQUEST_ID_HEADER, &request_id);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(RemoteError::from_transport)?;
        let status = response.status();
        let text = response.text().await.map_err(RemoteError::from_transport)?;

        debug!(%status, request_id, "Cart API responded");
        check_status(status, &text)?;
        Ok(text)
    }
}

/// Join path segments onto a base URL.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Classify a response status.
///
/// 401 and 403 mean the credential is no longer accepted; every other
/// non-success status is a backend failure.
pub(crate) fn check_status(status: StatusCode, body: &str) -> Result<(), RemoteError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RemoteError::SessionExpired {
            status: status.as_u16(),
        });
    }

    if !status.is_success() {
        error!(
            status = %status,
            body = %body.chars().take(500).collect::<String>(),
            "Cart API returned non-success status"
        );
        return Err(RemoteError::Api {
            status: status.as_u16(),
            message: error_message(body),
        });
    }

    Ok(())
}

/// Extract `message` from a JSON error body, falling back to the raw text.
pub(crate) fn error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body).map_or_else(
        |_| body.chars().take(200).collect(),
        |parsed| parsed.message,
    )
}

#[async_trait]
impl RemoteCart for HttpCartClient {
    #[instrument(skip(self, token))]
    async fn fetch(&self, token: &AccessToken) -> Result<Cart, RemoteError> {
        let url = self.endpoint(&["cart"]);
        let text = self.send::<()>(Method::GET, url, token, None).await?;

        let response: CartResponse = serde_json::from_str(&text).map_err(|e| {
            error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "Failed to parse cart response"
            );
            RemoteError::Parse(e.to_string())
        })?;

        Ok(Cart::from(response))
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn add_item(
        &self,
        token: &AccessToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["cart", "items"]);
        let body = AddItemRequest {
            product_id: product_id.to_string(),
            quantity,
        };
        self.send(Method::POST, url, token, Some(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn update_item(
        &self,
        token: &AccessToken,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["cart", "items", product_id.as_str()]);
        let body = UpdateItemRequest { quantity };
        self.send(Method::PATCH, url, token, Some(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self, token), fields(product_id = %product_id))]
    async fn remove_item(
        &self,
        token: &AccessToken,
        product_id: &ProductId,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["cart", "items", product_id.as_str()]);
        self.send::<()>(Method::DELETE, url, token, None).await?;
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn clear(&self, token: &AccessToken) -> Result<(), RemoteError> {
        let url = self.endpoint(&["cart"]);
        self.send::<()>(Method::DELETE, url, token, None).await?;
        Ok(())
    }
}
