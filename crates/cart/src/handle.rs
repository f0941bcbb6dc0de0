//! Shared cart handle.
//!
//! Wraps a [`Reconciler`] in `Arc<tokio::sync::Mutex<_>>` so UI tasks can
//! share one cart. Every operation holds the lock for its whole duration,
//! including backend round-trips, so responses are applied in request
//! order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use furnish_core::{Cart, ProductId, ProductSnapshot, Session};

use crate::error::Result;
use crate::reconciler::Reconciler;
use crate::remote::RemoteCart;
use crate::session::SessionProvider;
use crate::storage::KeyValueStore;

/// Point-in-time view of the cart for rendering.
#[derive(Debug, Clone)]
pub struct CartView {
    /// Lines in the cart.
    pub cart: Cart,
    /// Sum of `unit_price * quantity`.
    pub total: u64,
    /// Sum of quantities.
    pub count: u64,
    /// Session the cart belongs to.
    pub session: Session,
    /// Whether the cart drawer is open.
    pub drawer_open: bool,
}

/// Cloneable handle to one reconciler.
pub struct CartHandle<S, R> {
    inner: Arc<Mutex<Reconciler<S, R>>>,
    loading: Arc<AtomicBool>,
}

impl<S, R> Clone for CartHandle<S, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            loading: Arc::clone(&self.loading),
        }
    }
}

impl<S, R> CartHandle<S, R>
where
    S: KeyValueStore + 'static,
    R: RemoteCart + 'static,
{
    /// Share `reconciler`.
    pub fn new(reconciler: Reconciler<S, R>) -> Self {
        let loading = reconciler.loading_flag();
        Self {
            inner: Arc::new(Mutex::new(reconciler)),
            loading,
        }
    }

    /// True while a backend call is in flight. Never waits for the lock.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Snapshot the observed cart.
    pub async fn view(&self) -> CartView {
        let reconciler = self.inner.lock().await;
        CartView {
            cart: reconciler.cart().clone(),
            total: reconciler.cart_total(),
            count: reconciler.cart_count(),
            session: reconciler.session().clone(),
            drawer_open: reconciler.is_drawer_open(),
        }
    }

    /// See [`Reconciler::add_to_cart`].
    ///
    /// # Errors
    ///
    /// Propagates the reconciler's error.
    pub async fn add_to_cart(&self, product: ProductSnapshot, quantity: u32) -> Result<Cart> {
        let mut reconciler = self.inner.lock().await;
        reconciler.add_to_cart(product, quantity).await.cloned()
    }

    /// See [`Reconciler::remove_from_cart`].
    ///
    /// # Errors
    ///
    /// Propagates the reconciler's error.
    pub async fn remove_from_cart(&self, product_id: &ProductId) -> Result<Cart> {
        let mut reconciler = self.inner.lock().await;
        reconciler.remove_from_cart(product_id).await.cloned()
    }

    /// See [`Reconciler::update_quantity`].
    ///
    /// # Errors
    ///
    /// Propagates the reconciler's error.
    pub async fn update_quantity(&self, product_id: &ProductId, quantity: i64) -> Result<Cart> {
        let mut reconciler = self.inner.lock().await;
        reconciler.update_quantity(product_id, quantity).await.cloned()
    }

    /// See [`Reconciler::clear_cart`].
    ///
    /// # Errors
    ///
    /// Propagates the reconciler's error.
    pub async fn clear_cart(&self) -> Result<Cart> {
        let mut reconciler = self.inner.lock().await;
        reconciler.clear_cart().await.cloned()
    }

    /// See [`Reconciler::refresh`].
    ///
    /// # Errors
    ///
    /// Propagates the reconciler's error.
    pub async fn refresh(&self) -> Result<Cart> {
        let mut reconciler = self.inner.lock().await;
        reconciler.refresh().await.cloned()
    }

    /// See [`Reconciler::transition`].
    ///
    /// # Errors
    ///
    /// Propagates the reconciler's error.
    pub async fn transition(&self, next: Session) -> Result<()> {
        self.inner.lock().await.transition(next).await
    }

    /// See [`Reconciler::retry_merge`].
    ///
    /// # Errors
    ///
    /// Propagates the reconciler's error.
    pub async fn retry_merge(&self) -> Result<()> {
        self.inner.lock().await.retry_merge().await
    }

    /// Open or close the cart drawer.
    pub async fn set_drawer_open(&self, open: bool) {
        self.inner.lock().await.set_drawer_open(open);
    }

    /// Apply every session `provider` publishes, starting with its current
    /// one.
    ///
    /// The task holds the cart weakly. It ends when the provider closes, or
    /// at the next published session once every handle to the cart is gone.
    /// Transition failures were already notified and are only logged here.
    pub fn follow(&self, provider: &SessionProvider) -> JoinHandle<()> {
        let cart = Arc::downgrade(&self.inner);
        let mut sessions = provider.subscribe();
        tokio::spawn(async move {
            loop {
                let next = sessions.borrow_and_update().clone();
                let Some(reconciler) = cart.upgrade() else {
                    info!("Cart dropped, no longer following");
                    break;
                };
                let applied = reconciler.lock().await.transition(next).await;
                drop(reconciler);
                if let Err(e) = applied {
                    debug!(error = %e, "Session transition finished with an error");
                }
                if sessions.changed().await.is_err() {
                    info!("Session provider closed, no longer following");
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use furnish_core::AccessToken;

    use super::*;
    use crate::local::LocalStore;
    use crate::reconciler::ReconcilerOptions;
    use crate::reconciler::tests::{FakeRemote, id, product, signed_in};
    use crate::storage::MemoryStore;

    fn handle(remote: &FakeRemote) -> CartHandle<MemoryStore, FakeRemote> {
        let local = LocalStore::with_default_key(MemoryStore::new());
        CartHandle::new(Reconciler::new(
            local,
            remote.clone(),
            ReconcilerOptions::default(),
        ))
    }

    async fn wait_for(handle: &CartHandle<MemoryStore, FakeRemote>, authenticated: bool) {
        for _ in 0..100 {
            if handle.view().await.session.is_authenticated() == authenticated {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never became authenticated={authenticated}");
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_serialized() {
        let remote = FakeRemote::default();
        let cart = handle(&remote);
        cart.transition(signed_in("u1")).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cart = cart.clone();
                tokio::spawn(async move { cart.add_to_cart(product("a", 100), 1).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let view = cart.view().await;
        assert_eq!(view.count, 8);
        assert_eq!(remote.lines(), vec![("a".to_string(), 8)]);
        assert!(!cart.is_loading());
    }

    #[tokio::test]
    async fn test_follow_applies_provider_transitions() {
        let remote = FakeRemote::default();
        let cart = handle(&remote);
        cart.add_to_cart(product("a", 100), 2).await.unwrap();

        let provider = SessionProvider::default();
        let task = cart.follow(&provider);

        let session = signed_in("u1");
        provider.sign_in(session.auth().cloned().unwrap());
        wait_for(&cart, true).await;
        assert_eq!(remote.lines(), vec![("a".to_string(), 2)]);

        provider.sign_out();
        wait_for(&cart, false).await;
        assert!(cart.view().await.cart.is_empty());

        drop(provider);
        task.await.unwrap();
    }

    fn handle_with_provider(
        remote: &FakeRemote,
        provider: &SessionProvider,
    ) -> CartHandle<MemoryStore, FakeRemote> {
        let local = LocalStore::with_default_key(MemoryStore::new());
        CartHandle::new(Reconciler::new(
            local,
            remote.clone(),
            ReconcilerOptions::default().with_session_provider(provider.clone()),
        ))
    }

    #[tokio::test]
    async fn test_follow_ends_when_cart_and_provider_are_dropped() {
        let remote = FakeRemote::default();
        let provider = SessionProvider::default();
        let cart = handle_with_provider(&remote, &provider);
        let task = cart.follow(&provider);

        drop(cart);
        drop(provider);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_follow_ends_at_next_session_after_cart_is_dropped() {
        let remote = FakeRemote::default();
        let provider = SessionProvider::default();
        let cart = handle_with_provider(&remote, &provider);
        let task = cart.follow(&provider);

        drop(cart);
        provider.sign_in(signed_in("u1").auth().cloned().unwrap());

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_view_reflects_operations() {
        let remote = FakeRemote::default();
        let cart = handle(&remote);

        cart.add_to_cart(product("a", 250), 2).await.unwrap();
        cart.update_quantity(&id("a"), 3).await.unwrap();
        let view = cart.view().await;
        assert_eq!(view.total, 750);
        assert_eq!(view.count, 3);
        assert!(view.drawer_open);

        cart.set_drawer_open(false).await;
        assert!(!cart.view().await.drawer_open);

        cart.remove_from_cart(&id("a")).await.unwrap();
        assert!(cart.view().await.cart.is_empty());
    }

    #[tokio::test]
    async fn test_token_rotation_through_handle() {
        let remote = FakeRemote::default();
        let cart = handle(&remote);
        cart.transition(signed_in("u1")).await.unwrap();
        let rotated = Session::Authenticated(furnish_core::AuthSession::new(
            furnish_core::UserId::parse("u1").unwrap(),
            AccessToken::new("rotated"),
        ));
        cart.transition(rotated).await.unwrap();
        assert_eq!(remote.calls(), vec!["fetch"]);
    }
}
