//! In-process fake of the backend cart and auth resources.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use url::Url;

use furnish_cart::ApiConfig;

/// A catalog entry.
#[derive(Debug, Clone)]
struct Product {
    title: String,
    price: u64,
}

#[derive(Debug, Clone)]
struct Account {
    id: String,
    name: String,
    email: String,
    password: String,
}

#[derive(Default)]
struct Inner {
    accounts: Vec<Account>,
    tokens: HashMap<String, String>,
    carts: HashMap<String, Vec<(String, u32)>>,
    catalog: HashMap<String, Product>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    requests: Vec<String>,
    next_id: u64,
}

impl Inner {
    fn issue_token(&mut self, user_id: &str) -> String {
        let token = format!("tok-{}", uuid::Uuid::new_v4());
        self.tokens.insert(token.clone(), user_id.to_string());
        token
    }

    fn user_for(&self, headers: &HeaderMap) -> Result<String, ApiError> {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| self.tokens.get(token))
            .cloned()
            .ok_or(ApiError(StatusCode::UNAUTHORIZED, "Not authorized, token failed"))
    }

    fn account_json(account: &Account) -> Value {
        json!({
            "_id": account.id,
            "name": account.name,
            "email": account.email,
            "role": "customer",
            "isEmailVerified": true,
        })
    }

    fn cart_json(&self, user_id: &str) -> Value {
        let items: Vec<Value> = self
            .carts
            .get(user_id)
            .map(|lines| {
                lines
                    .iter()
                    .map(|(product_id, quantity)| match self.catalog.get(product_id) {
                        Some(product) => json!({
                            "product": {
                                "_id": product_id,
                                "title": product.title,
                                "price": product.price,
                                "image": format!("https://cdn.furnish.example/{product_id}.jpg"),
                            },
                            "quantity": quantity,
                        }),
                        None => json!({ "product": null, "quantity": quantity }),
                    })
                    .collect()
            })
            .unwrap_or_default();
        json!({ "user": user_id, "items": items })
    }
}

struct ApiError(StatusCode, &'static str);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "message": self.1 }))).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

/// Shared backend state, cheap to clone.
#[derive(Clone, Default)]
struct Backend {
    inner: Arc<Mutex<Inner>>,
}

impl Backend {
    /// Record the request and apply any configured delay.
    async fn enter(&self, request: String) {
        let delay = {
            let mut inner = self.inner.lock();
            inner.requests.push(request);
            inner.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

/// A running fake backend bound to an ephemeral local port.
///
/// The server stops when this value is dropped.
pub struct FakeBackend {
    base_url: Url,
    state: Backend,
    server: JoinHandle<()>,
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl FakeBackend {
    /// Start serving on `127.0.0.1:0`.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start() -> std::io::Result<Self> {
        let state = Backend::default();
        let app = router(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let base_url = Url::parse(&format!("http://{addr}/")).map_err(std::io::Error::other)?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self {
            base_url,
            state,
            server,
        })
    }

    /// Base URL of the fake API.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Client settings pointing at this backend.
    #[must_use]
    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(5),
        }
    }

    /// Register an account and return its user id.
    pub fn add_user(&self, email: &str, password: &str, name: &str) -> String {
        let mut inner = self.state.inner.lock();
        inner.next_id += 1;
        let id = format!("user{:04}", inner.next_id);
        inner.accounts.push(Account {
            id: id.clone(),
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        });
        id
    }

    /// Issue an access token for `user_id` without a login round-trip.
    pub fn issue_token(&self, user_id: &str) -> String {
        self.state.inner.lock().issue_token(user_id)
    }

    /// Add a catalog product.
    pub fn add_product(&self, id: &str, title: &str, price: u64) {
        self.state.inner.lock().catalog.insert(
            id.to_string(),
            Product {
                title: title.to_string(),
                price,
            },
        );
    }

    /// Replace a user's account cart.
    pub fn set_cart(&self, user_id: &str, lines: &[(&str, u32)]) {
        self.state.inner.lock().carts.insert(
            user_id.to_string(),
            lines.iter().map(|(p, q)| ((*p).to_string(), *q)).collect(),
        );
    }

    /// A user's account cart as `(product_id, quantity)` pairs.
    #[must_use]
    pub fn cart_lines(&self, user_id: &str) -> Vec<(String, u32)> {
        self.state
            .inner
            .lock()
            .carts
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Make every write for `product_id` fail with a 500.
    pub fn fail_product(&self, product_id: &str) {
        self.state
            .inner
            .lock()
            .failing
            .insert(product_id.to_string());
    }

    /// Stop failing writes.
    pub fn heal(&self) {
        self.state.inner.lock().failing.clear();
    }

    /// Invalidate every issued token.
    pub fn revoke_tokens(&self) {
        self.state.inner.lock().tokens.clear();
    }

    /// Delay every response by `delay`.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.inner.lock().delay = delay;
    }

    /// Requests received so far, as `"METHOD /path"`.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.state.inner.lock().requests.clone()
    }

    /// Requests made against the cart resource.
    #[must_use]
    pub fn cart_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.contains(" /cart"))
            .collect()
    }
}

fn router(state: Backend) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .route("/cart", get(fetch_cart).delete(clear_cart))
        .route("/cart/items", post(add_item))
        .route(
            "/cart/items/{product_id}",
            patch(update_item).delete(remove_item),
        )
        .with_state(state)
}

// =============================================================================
// Auth handlers
// =============================================================================

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
struct RegisterBody {
    name: String,
    email: String,
    password: String,
}

async fn login(State(backend): State<Backend>, Json(body): Json<LoginBody>) -> ApiResult {
    backend.enter("POST /auth/login".to_string()).await;
    let mut inner = backend.inner.lock();
    let account = inner
        .accounts
        .iter()
        .find(|a| a.email == body.email && a.password == body.password)
        .cloned()
        .ok_or(ApiError(StatusCode::UNAUTHORIZED, "Invalid email or password"))?;

    let token = inner.issue_token(&account.id);
    Ok(Json(json!({
        "accessToken": token,
        "refreshToken": format!("refresh-{token}"),
        "user": Inner::account_json(&account),
    }))
    .into_response())
}

async fn register(State(backend): State<Backend>, Json(body): Json<RegisterBody>) -> ApiResult {
    backend.enter("POST /auth/register".to_string()).await;
    let mut inner = backend.inner.lock();
    if inner.accounts.iter().any(|a| a.email == body.email) {
        return Err(ApiError(StatusCode::BAD_REQUEST, "User already exists"));
    }

    inner.next_id += 1;
    let account = Account {
        id: format!("user{:04}", inner.next_id),
        name: body.name,
        email: body.email,
        password: body.password,
    };
    inner.accounts.push(account.clone());
    let token = inner.issue_token(&account.id);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "accessToken": token,
            "refreshToken": format!("refresh-{token}"),
            "user": Inner::account_json(&account),
        })),
    )
        .into_response())
}

async fn me(State(backend): State<Backend>, headers: HeaderMap) -> ApiResult {
    backend.enter("GET /auth/me".to_string()).await;
    let inner = backend.inner.lock();
    let user_id = inner.user_for(&headers)?;
    let account = inner
        .accounts
        .iter()
        .find(|a| a.id == user_id)
        .ok_or(ApiError(StatusCode::NOT_FOUND, "User not found"))?;
    Ok(Json(Inner::account_json(account)).into_response())
}

async fn logout(State(backend): State<Backend>, headers: HeaderMap) -> ApiResult {
    backend.enter("POST /auth/logout".to_string()).await;
    let mut inner = backend.inner.lock();
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string);
    if let Some(token) = token {
        inner.tokens.remove(&token);
    }
    Ok(Json(json!({ "message": "Logged out successfully" })).into_response())
}

// =============================================================================
// Cart handlers
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddBody {
    product_id: String,
    quantity: i64,
}

#[derive(Deserialize)]
struct UpdateBody {
    quantity: i64,
}

async fn fetch_cart(State(backend): State<Backend>, headers: HeaderMap) -> ApiResult {
    backend.enter("GET /cart".to_string()).await;
    let inner = backend.inner.lock();
    let user_id = inner.user_for(&headers)?;
    Ok(Json(inner.cart_json(&user_id)).into_response())
}

async fn add_item(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(body): Json<AddBody>,
) -> ApiResult {
    backend.enter("POST /cart/items".to_string()).await;
    let mut inner = backend.inner.lock();
    let user_id = inner.user_for(&headers)?;
    if inner.failing.contains(&body.product_id) {
        return Err(ApiError(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update cart"));
    }
    if !inner.catalog.contains_key(&body.product_id) {
        return Err(ApiError(StatusCode::NOT_FOUND, "Product not found"));
    }
    let quantity = u32::try_from(body.quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or(ApiError(StatusCode::BAD_REQUEST, "Quantity must be at least 1"))?;

    let lines = inner.carts.entry(user_id.clone()).or_default();
    match lines.iter_mut().find(|(p, _)| *p == body.product_id) {
        Some((_, existing)) => *existing += quantity,
        None => lines.push((body.product_id, quantity)),
    }
    Ok(Json(inner.cart_json(&user_id)).into_response())
}

async fn update_item(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(product_id): Path<String>,
    Json(body): Json<UpdateBody>,
) -> ApiResult {
    backend.enter(format!("PATCH /cart/items/{product_id}")).await;
    let mut inner = backend.inner.lock();
    let user_id = inner.user_for(&headers)?;
    if inner.failing.contains(&product_id) {
        return Err(ApiError(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update cart"));
    }
    let quantity = u32::try_from(body.quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or(ApiError(StatusCode::BAD_REQUEST, "Quantity must be at least 1"))?;

    let lines = inner.carts.entry(user_id.clone()).or_default();
    let line = lines
        .iter_mut()
        .find(|(p, _)| *p == product_id)
        .ok_or(ApiError(StatusCode::NOT_FOUND, "Item not found in cart"))?;
    line.1 = quantity;
    Ok(Json(inner.cart_json(&user_id)).into_response())
}

async fn remove_item(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Path(product_id): Path<String>,
) -> ApiResult {
    backend.enter(format!("DELETE /cart/items/{product_id}")).await;
    let mut inner = backend.inner.lock();
    let user_id = inner.user_for(&headers)?;
    if inner.failing.contains(&product_id) {
        return Err(ApiError(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update cart"));
    }
    if let Some(lines) = inner.carts.get_mut(&user_id) {
        lines.retain(|(p, _)| *p != product_id);
    }
    Ok(Json(inner.cart_json(&user_id)).into_response())
}

async fn clear_cart(State(backend): State<Backend>, headers: HeaderMap) -> ApiResult {
    backend.enter("DELETE /cart".to_string()).await;
    let mut inner = backend.inner.lock();
    let user_id = inner.user_for(&headers)?;
    inner.carts.remove(&user_id);
    Ok(Json(inner.cart_json(&user_id)).into_response())
}
