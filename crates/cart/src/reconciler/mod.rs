//! Cart reconciler.
//!
//! Decides which store is authoritative for the current [`Session`] and
//! keeps the two consistent across login and logout.
//!
//! # States
//!
//! - `Anonymous`: every operation goes to the [`LocalStore`]; no backend
//!   call is ever made.
//! - `Authenticated`: every operation goes to the [`RemoteCart`] and is
//!   followed by a fetch, except `clear`. The device cart is only read by
//!   merge-on-login.
//!
//! # Transitions
//!
//! | From | To | Effect |
//! |------|----|--------|
//! | Anonymous | Authenticated | merge device lines into the account cart, then fetch |
//! | Authenticated | Anonymous | reload the device cart; the account cart is untouched |
//! | Authenticated(u1) | Authenticated(u2) | logout, then login as u2 |
//! | Authenticated(u1) | Authenticated(u1) | keep state, adopt the new token |
//!
//! A rejected credential on any backend call is an implicit transition to
//! `Anonymous`.

mod merge;

pub use merge::{MergeFailure, MergeReport};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use furnish_core::{AccessToken, AuthSession, Cart, ProductId, ProductSnapshot, Session};

use crate::config::DEFAULT_TIMEOUT;
use crate::error::{CartError, ErrorKind, Result};
use crate::local::{LocalStore, UnsavedCart, clamp_quantity};
use crate::notify::{Notice, Notifier, TracingNotifier};
use crate::remote::{RemoteCart, RemoteError};
use crate::session::SessionProvider;
use crate::storage::KeyValueStore;

/// Reconciler settings.
#[derive(Clone)]
pub struct ReconcilerOptions {
    /// Upper bound for any single backend call.
    pub remote_timeout: Duration,
    /// Receives a notice for every surfaced failure and successful add.
    pub notifier: Arc<dyn Notifier>,
    /// Told about expiries detected by backend calls.
    pub session_provider: Option<SessionProvider>,
}

impl Default for ReconcilerOptions {
    fn default() -> Self {
        Self {
            remote_timeout: DEFAULT_TIMEOUT,
            notifier: Arc::new(TracingNotifier),
            session_provider: None,
        }
    }
}

impl ReconcilerOptions {
    /// Use `timeout` for backend calls.
    #[must_use]
    pub const fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Deliver notices to `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    /// Publish detected expiries to `provider`.
    #[must_use]
    pub fn with_session_provider(mut self, provider: SessionProvider) -> Self {
        self.session_provider = Some(provider);
        self
    }
}

/// Single source of cart truth for the UI.
///
/// All methods take `&mut self`, so one reconciler applies one operation at
/// a time. Share it across tasks through [`crate::handle::CartHandle`].
pub struct Reconciler<S, R> {
    local: LocalStore<S>,
    remote: R,
    session: Session,
    cart: Cart,
    notifier: Arc<dyn Notifier>,
    session_provider: Option<SessionProvider>,
    remote_timeout: Duration,
    loading: Arc<AtomicBool>,
    drawer_open: bool,
    /// Units already on the account cart that the device still holds
    /// because dropping them after a merge failed.
    unsettled: HashMap<ProductId, u32>,
}

impl<S: KeyValueStore, R: RemoteCart> Reconciler<S, R> {
    /// Create a reconciler in the `Anonymous` state with the device cart
    /// loaded.
    pub fn new(local: LocalStore<S>, remote: R, options: ReconcilerOptions) -> Self {
        let cart = local.load();
        debug!(lines = cart.len(), "Loaded device cart");
        Self {
            local,
            remote,
            session: Session::Anonymous,
            cart,
            notifier: options.notifier,
            session_provider: options.session_provider,
            remote_timeout: options.remote_timeout,
            loading: Arc::new(AtomicBool::new(false)),
            drawer_open: false,
            unsettled: HashMap::new(),
        }
    }

    // =========================================================================
    // Observed state
    // =========================================================================

    /// The cart the UI shows.
    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    /// The session the reconciler is operating under.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Sum of `unit_price * quantity` over the observed cart.
    #[must_use]
    pub fn cart_total(&self) -> u64 {
        self.cart.total()
    }

    /// Sum of quantities over the observed cart.
    #[must_use]
    pub fn cart_count(&self) -> u64 {
        self.cart.count()
    }

    /// True while a backend call is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Shared loading flag, readable without borrowing the reconciler.
    pub(crate) fn loading_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.loading)
    }

    /// Whether the cart drawer is open.
    #[must_use]
    pub const fn is_drawer_open(&self) -> bool {
        self.drawer_open
    }

    /// Open or close the cart drawer.
    pub const fn set_drawer_open(&mut self, open: bool) {
        self.drawer_open = open;
    }

    // =========================================================================
    // Session transitions
    // =========================================================================

    /// Apply a session published by the auth flow.
    ///
    /// # Errors
    ///
    /// Returns the merge or fetch failure when entering `Authenticated`.
    /// The session change itself always takes effect.
    #[instrument(skip_all, fields(to = ?next.user_id()))]
    pub async fn transition(&mut self, next: Session) -> Result<()> {
        let same_identity = self.session.same_identity(&next);
        match next {
            Session::Anonymous => {
                if self.session.is_authenticated() {
                    info!("Logged out, switching to device cart");
                    self.enter_anonymous();
                }
                Ok(())
            }
            Session::Authenticated(auth) => {
                if let Some(current) = self.session.auth() {
                    if same_identity {
                        debug!("Session unchanged, adopting refreshed token");
                        self.session = Session::Authenticated(auth);
                        return Ok(());
                    }
                    info!(from = %current.user_id, to = %auth.user_id, "Switching accounts");
                    self.enter_anonymous();
                }
                self.login(auth).await
            }
        }
    }

    /// Retry merging whatever is still on the device.
    ///
    /// No-op while anonymous.
    ///
    /// # Errors
    ///
    /// Same as a login transition.
    pub async fn retry_merge(&mut self) -> Result<()> {
        match self.session.auth().cloned() {
            Some(auth) => self.login(auth).await,
            None => Ok(()),
        }
    }

    async fn login(&mut self, auth: AuthSession) -> Result<()> {
        let token = auth.access_token.clone();
        info!(user_id = %auth.user_id, "Logged in, switching to account cart");
        self.session = Session::Authenticated(auth);
        self.cart = Cart::new();

        let (report, settled) = self.merge_local_lines(&token).await;
        if report.aborted {
            self.expire_session();
            return Err(self.surface(CartError::SessionExpired));
        }

        let fetched = {
            let _busy = self.busy();
            bounded(self.remote_timeout, self.remote.fetch(&token)).await
        };
        let fetch_error = match fetched {
            Ok(cart) => {
                self.cart = cart;
                None
            }
            Err(e) => Some(CartError::from(e)),
        };

        // One login reports at most one failure
        let merged = report.merged.len();
        let summary = report.to_string();
        let failure = if matches!(fetch_error, Some(CartError::SessionExpired)) {
            self.expire_session();
            fetch_error
        } else if !report.is_complete() {
            let pending: Vec<&str> = report.pending_ids().map(ProductId::as_str).collect();
            warn!(merged, ?pending, "Merge finished with failures");
            if let Some(e) = &fetch_error {
                warn!(error = %e, "Failed to fetch account cart after merge");
            }
            Some(CartError::PartialMerge(report))
        } else if fetch_error.is_some() {
            fetch_error
        } else {
            settled.err().map(CartError::StorageUnavailable)
        };

        match failure {
            Some(err) => Err(self.surface(err)),
            None => {
                if merged > 0 {
                    info!(merged, "Merge complete");
                    self.notifier.notify(Notice::info(summary));
                }
                Ok(())
            }
        }
    }

    fn enter_anonymous(&mut self) {
        self.session = Session::Anonymous;
        self.cart = self.local.load();
    }

    /// Drop to `Anonymous` after the backend rejected the credential.
    fn expire_session(&mut self) {
        if let Some(auth) = self.session.auth() {
            warn!(user_id = %auth.user_id, "Credential rejected, falling back to device cart");
            if let Some(provider) = &self.session_provider {
                provider.expire(&auth.user_id);
            }
        }
        self.enter_anonymous();
    }

    // =========================================================================
    // Cart operations
    // =========================================================================

    /// Add `quantity` units of `product`.
    ///
    /// Quantity 0 is a no-op. Opens the cart drawer on success.
    ///
    /// # Errors
    ///
    /// Returns a remote failure, or `StorageUnavailable` when the device
    /// write failed (the observed cart is still updated).
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn add_to_cart(&mut self, product: ProductSnapshot, quantity: u32) -> Result<&Cart> {
        if quantity == 0 {
            debug!("Ignoring add with zero quantity");
            return Ok(&self.cart);
        }

        let title = product.title.clone();
        match self.token() {
            None => {
                let saved = self.local.add(product, quantity);
                self.apply_local(saved)?;
            }
            Some(token) => {
                let added = {
                    let _busy = self.busy();
                    bounded(
                        self.remote_timeout,
                        self.remote.add_item(&token, &product.id, quantity),
                    )
                    .await
                };
                self.remote_result(added)?;
                self.refetch(&token).await?;
            }
        }

        self.drawer_open = true;
        self.notifier
            .notify(Notice::success(format!("{title} added to cart")));
        Ok(&self.cart)
    }

    /// Remove the line for `product_id`. Removing an absent product is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns a remote failure, or `StorageUnavailable`.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_from_cart(&mut self, product_id: &ProductId) -> Result<&Cart> {
        match self.token() {
            None => {
                let saved = self.local.remove(product_id);
                if saved.is_ok() {
                    self.unsettled.remove(product_id);
                }
                self.apply_local(saved)?;
            }
            Some(token) => {
                let removed = {
                    let _busy = self.busy();
                    bounded(
                        self.remote_timeout,
                        self.remote.remove_item(&token, product_id),
                    )
                    .await
                };
                self.remote_result(removed)?;
                self.refetch(&token).await?;
            }
        }
        Ok(&self.cart)
    }

    /// Replace the quantity for `product_id`; `quantity <= 0` removes it.
    ///
    /// # Errors
    ///
    /// Returns a remote failure, or `StorageUnavailable`.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn update_quantity(&mut self, product_id: &ProductId, quantity: i64) -> Result<&Cart> {
        if quantity <= 0 {
            return self.remove_from_cart(product_id).await;
        }

        match self.token() {
            None => {
                let saved = self.local.update_quantity(product_id, quantity);
                self.apply_local(saved)?;
            }
            Some(token) => {
                let updated = {
                    let _busy = self.busy();
                    bounded(
                        self.remote_timeout,
                        self.remote
                            .update_item(&token, product_id, clamp_quantity(quantity)),
                    )
                    .await
                };
                self.remote_result(updated)?;
                self.refetch(&token).await?;
            }
        }
        Ok(&self.cart)
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns a remote failure, or `StorageUnavailable`.
    #[instrument(skip(self))]
    pub async fn clear_cart(&mut self) -> Result<&Cart> {
        match self.token() {
            None => {
                let saved = self.local.clear();
                if saved.is_ok() {
                    self.unsettled.clear();
                }
                self.apply_local(saved)?;
            }
            Some(token) => {
                let cleared = {
                    let _busy = self.busy();
                    bounded(self.remote_timeout, self.remote.clear(&token)).await
                };
                self.remote_result(cleared)?;
                self.cart = Cart::new();
            }
        }
        Ok(&self.cart)
    }

    /// Re-read the authoritative store.
    ///
    /// # Errors
    ///
    /// Returns a remote failure while authenticated.
    #[instrument(skip(self))]
    pub async fn refresh(&mut self) -> Result<&Cart> {
        match self.token() {
            None => self.cart = self.local.load(),
            Some(token) => self.refetch(&token).await?,
        }
        Ok(&self.cart)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn token(&self) -> Option<AccessToken> {
        self.session.auth().map(|auth| auth.access_token.clone())
    }

    fn busy(&self) -> Busy {
        Busy::set(&self.loading)
    }

    /// Replace the observed cart with the account cart.
    async fn refetch(&mut self, token: &AccessToken) -> Result<()> {
        let fetched = {
            let _busy = self.busy();
            bounded(self.remote_timeout, self.remote.fetch(token)).await
        };
        self.cart = self.remote_result(fetched)?;
        Ok(())
    }

    /// Map a backend failure, dropping the session when it was rejected.
    fn remote_result<T>(&mut self, result: std::result::Result<T, RemoteError>) -> Result<T> {
        result.map_err(|e| {
            let err = CartError::from(e);
            if matches!(err, CartError::SessionExpired) {
                self.expire_session();
            }
            self.surface(err)
        })
    }

    /// Adopt the result of a device mutation.
    ///
    /// A failed write still updates the observed cart.
    fn apply_local(&mut self, saved: std::result::Result<Cart, UnsavedCart>) -> Result<()> {
        match saved {
            Ok(cart) => {
                self.cart = cart;
                Ok(())
            }
            Err(UnsavedCart { cart, source }) => {
                self.cart = cart;
                Err(self.surface(CartError::StorageUnavailable(source)))
            }
        }
    }

    /// Log and notify a failure before handing it back to the caller.
    fn surface(&self, err: CartError) -> CartError {
        match err.kind() {
            ErrorKind::SessionExpired | ErrorKind::StorageUnavailable => {
                warn!(error = %err, "Cart operation failed");
            }
            _ => error!(error = %err, "Cart operation failed"),
        }
        self.notifier
            .notify(Notice::failure(err.kind(), err.user_message()));
        err
    }
}

/// Run a backend call under `limit`.
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = std::result::Result<T, RemoteError>>,
) -> std::result::Result<T, RemoteError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout),
    }
}

/// Raises the loading flag until dropped.
struct Busy(Arc<AtomicBool>);

impl Busy {
    fn set(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self(Arc::clone(flag))
    }
}

impl Drop for Busy {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
