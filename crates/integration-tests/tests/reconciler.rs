//! End-to-end tests for the reconciler over real HTTP.
//!
//! Each test runs a fresh fake backend, a device store in memory and the
//! real `HttpCartClient`.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::mpsc;

use furnish_cart::{
    AuthClient, CartError, CartHandle, ChannelNotifier, ErrorKind, HttpCartClient, LocalStore,
    MemoryStore, Notice, NoticeLevel, Reconciler, ReconcilerOptions, SessionProvider,
};
use furnish_core::{ProductId, ProductSnapshot, Session};
use furnish_integration_tests::FakeBackend;

struct Shop {
    backend: FakeBackend,
    auth: AuthClient,
    device: Arc<MemoryStore>,
    provider: SessionProvider,
    reconciler: Reconciler<Arc<MemoryStore>, HttpCartClient>,
    notices: mpsc::UnboundedReceiver<Notice>,
    user_id: String,
}

impl Shop {
    async fn open() -> Self {
        let backend = FakeBackend::start().await.unwrap();
        backend.add_product("sofa", "Asgaard sofa", 2_500_000);
        backend.add_product("lamp", "Bedside lamp", 500_000);
        backend.add_product("chair", "Syltherine chair", 2_500_000);
        let user_id = backend.add_user("ada@example.com", "hunter2", "Ada");

        let device = Arc::new(MemoryStore::new());
        let provider = SessionProvider::default();
        let (notifier, notices) = ChannelNotifier::new();
        let reconciler = Reconciler::new(
            LocalStore::with_default_key(Arc::clone(&device)),
            HttpCartClient::new(&backend.api_config()).unwrap(),
            ReconcilerOptions::default()
                .with_remote_timeout(Duration::from_secs(2))
                .with_notifier(notifier)
                .with_session_provider(provider.clone()),
        );
        let auth = AuthClient::new(&backend.api_config()).unwrap();

        Self {
            backend,
            auth,
            device,
            provider,
            reconciler,
            notices,
            user_id,
        }
    }

    async fn login(&mut self) -> Result<(), CartError> {
        let signed_in = self
            .auth
            .login("ada@example.com", &SecretString::from("hunter2".to_string()))
            .await
            .unwrap();
        self.provider.sign_in(signed_in.session.clone());
        self.reconciler
            .transition(Session::Authenticated(signed_in.session))
            .await
    }

    async fn add(&mut self, product: &str, price: u64, quantity: u32) -> Result<(), CartError> {
        let snapshot = ProductSnapshot::new(
            ProductId::parse(product).unwrap(),
            format!("{product} (cached)"),
            price,
        );
        self.reconciler
            .add_to_cart(snapshot, quantity)
            .await
            .map(drop)
    }

    fn device_lines(&self) -> Vec<(String, u32)> {
        lines(&LocalStore::with_default_key(Arc::clone(&self.device)).load())
    }

    fn observed(&self) -> Vec<(String, u32)> {
        lines(self.reconciler.cart())
    }

    fn notices(&mut self) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            out.push(notice);
        }
        out
    }
}

fn lines(cart: &furnish_core::Cart) -> Vec<(String, u32)> {
    cart.iter()
        .map(|line| (line.product_id().to_string(), line.quantity.get()))
        .collect()
}

fn owned(lines: &[(&str, u32)]) -> Vec<(String, u32)> {
    lines.iter().map(|(p, q)| ((*p).to_string(), *q)).collect()
}

fn id(s: &str) -> ProductId {
    ProductId::parse(s).unwrap()
}

// =============================================================================
// Anonymous session
// =============================================================================

#[tokio::test]
async fn test_anonymous_cart_never_touches_backend() {
    let mut shop = Shop::open().await;

    shop.add("sofa", 2_500_000, 2).await.unwrap();
    shop.add("lamp", 500_000, 1).await.unwrap();
    shop.reconciler.update_quantity(&id("lamp"), 3).await.unwrap();
    shop.reconciler.remove_from_cart(&id("ghost")).await.unwrap();
    shop.reconciler.refresh().await.unwrap();

    assert!(shop.backend.cart_requests().is_empty());
    assert_eq!(shop.device_lines(), owned(&[("sofa", 2), ("lamp", 3)]));
    assert_eq!(shop.reconciler.cart_total(), 6_500_000);
    assert_eq!(shop.reconciler.cart_count(), 5);
}

// =============================================================================
// Merge on login
// =============================================================================

#[tokio::test]
async fn test_merge_sums_quantities_and_empties_device() {
    let mut shop = Shop::open().await;
    shop.backend.set_cart(&shop.user_id, &[("sofa", 1)]);
    shop.add("sofa", 2_500_000, 2).await.unwrap();

    shop.login().await.unwrap();

    assert_eq!(
        shop.backend.cart_lines(&shop.user_id),
        owned(&[("sofa", 3)])
    );
    assert!(shop.device_lines().is_empty());
    assert_eq!(shop.observed(), owned(&[("sofa", 3)]));
    // Display fields now come from the backend
    let line = shop.reconciler.cart().get(&id("sofa")).unwrap();
    assert_eq!(line.product.title, "Asgaard sofa");
}

#[tokio::test]
async fn test_partial_merge_keeps_failed_line_on_device() {
    let mut shop = Shop::open().await;
    shop.add("sofa", 2_500_000, 1).await.unwrap();
    shop.add("lamp", 500_000, 2).await.unwrap();
    shop.notices();
    shop.backend.fail_product("lamp");

    let err = shop.login().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PartialMergeFailure);
    assert_eq!(shop.device_lines(), owned(&[("lamp", 2)]));
    assert_eq!(
        shop.backend.cart_lines(&shop.user_id),
        owned(&[("sofa", 1)])
    );
    assert!(shop.reconciler.session().is_authenticated());
    assert!(
        shop.notices()
            .iter()
            .any(|n| n.kind == Some(ErrorKind::PartialMergeFailure))
    );

    // Retrying sends only what never arrived
    shop.backend.heal();
    shop.reconciler.retry_merge().await.unwrap();
    assert_eq!(
        shop.backend.cart_lines(&shop.user_id),
        owned(&[("sofa", 1), ("lamp", 2)])
    );
    assert!(shop.device_lines().is_empty());
}

#[tokio::test]
async fn test_login_with_empty_device_only_fetches() {
    let mut shop = Shop::open().await;
    shop.backend.set_cart(&shop.user_id, &[("chair", 4)]);

    shop.login().await.unwrap();

    assert_eq!(shop.backend.cart_requests(), vec!["GET /cart"]);
    assert_eq!(shop.observed(), owned(&[("chair", 4)]));
}

// =============================================================================
// Authenticated session
// =============================================================================

#[tokio::test]
async fn test_authenticated_operations_go_to_backend_only() {
    let mut shop = Shop::open().await;
    shop.login().await.unwrap();
    let device_before = shop.device_lines();

    shop.add("sofa", 1, 2).await.unwrap();
    shop.reconciler.update_quantity(&id("sofa"), 5).await.unwrap();
    shop.add("lamp", 1, 1).await.unwrap();
    shop.reconciler.remove_from_cart(&id("lamp")).await.unwrap();

    assert_eq!(shop.device_lines(), device_before);
    assert_eq!(shop.observed(), owned(&[("sofa", 5)]));
    // Totals use backend prices, not the cached snapshot
    assert_eq!(shop.reconciler.cart_total(), 12_500_000);
    assert_eq!(
        shop.backend.cart_requests(),
        vec![
            "GET /cart",
            "POST /cart/items",
            "GET /cart",
            "PATCH /cart/items/sofa",
            "GET /cart",
            "POST /cart/items",
            "GET /cart",
            "DELETE /cart/items/lamp",
            "GET /cart",
        ]
    );
}

#[tokio::test]
async fn test_update_to_zero_removes_on_backend() {
    let mut shop = Shop::open().await;
    shop.backend.set_cart(&shop.user_id, &[("sofa", 2)]);
    shop.login().await.unwrap();

    shop.reconciler.update_quantity(&id("sofa"), 0).await.unwrap();

    assert!(shop.backend.cart_lines(&shop.user_id).is_empty());
    assert!(
        shop.backend
            .cart_requests()
            .contains(&"DELETE /cart/items/sofa".to_string())
    );
    assert!(
        !shop
            .backend
            .cart_requests()
            .iter()
            .any(|r| r.starts_with("PATCH"))
    );
}

#[tokio::test]
async fn test_clear_skips_refetch() {
    let mut shop = Shop::open().await;
    shop.backend.set_cart(&shop.user_id, &[("sofa", 2), ("lamp", 1)]);
    shop.login().await.unwrap();

    shop.reconciler.clear_cart().await.unwrap();

    assert!(shop.reconciler.cart().is_empty());
    assert_eq!(
        shop.backend.cart_requests(),
        vec!["GET /cart", "DELETE /cart"]
    );
}

#[tokio::test]
async fn test_remote_failure_is_reported_not_masked() {
    let mut shop = Shop::open().await;
    shop.backend.set_cart(&shop.user_id, &[("sofa", 1)]);
    shop.login().await.unwrap();
    shop.backend.fail_product("lamp");
    shop.notices();

    let err = shop.add("lamp", 500_000, 1).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
    assert_eq!(shop.observed(), owned(&[("sofa", 1)]));
    assert!(shop.device_lines().is_empty());
    let notices = shop.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
}

#[tokio::test]
async fn test_revoked_token_falls_back_to_device_cart() {
    let mut shop = Shop::open().await;
    shop.login().await.unwrap();
    shop.backend.revoke_tokens();

    let err = shop.add("sofa", 2_500_000, 1).await.unwrap_err();

    assert!(matches!(err, CartError::SessionExpired));
    assert!(!shop.reconciler.session().is_authenticated());
    assert!(!shop.provider.current().is_authenticated());

    shop.add("sofa", 2_500_000, 1).await.unwrap();
    assert_eq!(shop.device_lines(), owned(&[("sofa", 1)]));
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let mut shop = Shop::open().await;
    shop.login().await.unwrap();
    shop.backend.set_delay(Some(Duration::from_secs(4)));

    let err = shop.reconciler.refresh().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(!shop.reconciler.is_loading());
    assert!(shop.reconciler.session().is_authenticated());
}

// =============================================================================
// Logout
// =============================================================================

#[tokio::test]
async fn test_logout_leaves_account_cart_and_shows_device_cart() {
    let mut shop = Shop::open().await;
    shop.add("lamp", 500_000, 1).await.unwrap();
    shop.backend.fail_product("lamp");
    let _ = shop.login().await;
    shop.backend.heal();
    shop.add("sofa", 1, 1).await.unwrap();
    let requests = shop.backend.cart_requests().len();

    shop.provider.sign_out();
    shop.reconciler.transition(Session::Anonymous).await.unwrap();

    assert_eq!(shop.backend.cart_requests().len(), requests);
    assert_eq!(
        shop.backend.cart_lines(&shop.user_id),
        owned(&[("sofa", 1)])
    );
    // Unmerged leftovers are what the device shows after logout
    assert_eq!(shop.observed(), owned(&[("lamp", 1)]));
}

// =============================================================================
// Shared handle
// =============================================================================

#[tokio::test]
async fn test_handle_follows_provider() {
    let Shop {
        backend,
        auth,
        provider,
        reconciler,
        user_id,
        ..
    } = Shop::open().await;
    let cart = CartHandle::new(reconciler);
    let follower = cart.follow(&provider);

    cart.add_to_cart(
        ProductSnapshot::new(id("chair"), "Syltherine chair", 2_500_000),
        2,
    )
    .await
    .unwrap();

    let signed_in = auth
        .login("ada@example.com", &SecretString::from("hunter2".to_string()))
        .await
        .unwrap();
    provider.sign_in(signed_in.session);

    let mut merged = false;
    for _ in 0..200 {
        let view = cart.view().await;
        if view.session.is_authenticated() && view.count == 2 {
            merged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(merged, "cart never reached the merged account state");
    assert_eq!(backend.cart_lines(&user_id), owned(&[("chair", 2)]));

    drop(cart);
    drop(provider);
    tokio::time::timeout(Duration::from_secs(1), follower)
        .await
        .unwrap()
        .unwrap();
}
