//! Session provider.
//!
//! Holds the current [`Session`] in a `tokio::sync::watch` channel. The auth
//! flow publishes transitions here; carts subscribe and react.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use furnish_core::{AuthSession, Session, UserId};

/// Publishes session transitions to subscribers.
///
/// Cheap to clone; all clones share one channel.
#[derive(Debug, Clone)]
pub struct SessionProvider {
    tx: Arc<watch::Sender<Session>>,
}

impl Default for SessionProvider {
    fn default() -> Self {
        Self::new(Session::Anonymous)
    }
}

impl SessionProvider {
    /// Create a provider starting in `initial`.
    #[must_use]
    pub fn new(initial: Session) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// The current session.
    #[must_use]
    pub fn current(&self) -> Session {
        self.tx.borrow().clone()
    }

    /// Subscribe to transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Publish a successful login or registration.
    pub fn sign_in(&self, auth: AuthSession) {
        info!(user_id = %auth.user_id, "Session authenticated");
        self.tx.send_replace(Session::Authenticated(auth));
    }

    /// Publish a logout.
    pub fn sign_out(&self) {
        info!("Session signed out");
        self.tx.send_replace(Session::Anonymous);
    }

    /// Publish that `user_id`'s credential was rejected.
    ///
    /// Ignored when a different identity is current, so a late expiry
    /// cannot log out a newer login.
    pub fn expire(&self, user_id: &UserId) {
        let expired = self.tx.send_if_modified(|session| {
            if session.user_id() == Some(user_id) {
                *session = Session::Anonymous;
                true
            } else {
                false
            }
        });
        if expired {
            info!(%user_id, "Session expired");
        }
    }
}
