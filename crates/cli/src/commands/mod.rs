//! Command implementations.
//!
//! Each invocation opens device storage, restores the saved session and
//! builds a fresh reconciler. Restoring a signed-in session runs
//! merge-on-login, so device lines left behind by an earlier partial merge
//! are retried automatically.

pub mod account;
pub mod cart;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use furnish_cart::{
    AuthClient, AuthError, CartConfig, CartError, CartHandle, ChannelNotifier, ConfigError,
    FileStore, HttpCartClient, LocalStore, Notice, Reconciler, ReconcilerOptions, RemoteError,
    SessionProvider, StorageError,
};
use furnish_core::EmptyIdError;

use crate::persisted;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Device storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] EmptyIdError),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

type Store = Arc<FileStore>;

/// Everything a command needs.
pub struct Context {
    pub storage: Store,
    pub auth: AuthClient,
    pub cart: CartHandle<Store, HttpCartClient>,
    pub provider: SessionProvider,
    notices: mpsc::UnboundedReceiver<Notice>,
}

impl Context {
    /// Open storage and build the cart for the saved session.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be opened or a client cannot be
    /// built. A failed session restore is reported through notices only.
    pub async fn open(config: &CartConfig) -> Result<Self, CliError> {
        let storage = Arc::new(FileStore::open(config.storage_dir.clone())?);
        tracing::debug!(dir = %storage.dir().display(), "Opened device storage");
        let remote = HttpCartClient::new(&config.api)?;
        let auth = AuthClient::new(&config.api)?;

        let provider = SessionProvider::default();
        let (notifier, notices) = ChannelNotifier::new();
        let options = ReconcilerOptions::default()
            .with_remote_timeout(config.api.timeout)
            .with_notifier(notifier)
            .with_session_provider(provider.clone());
        let local = LocalStore::new(Arc::clone(&storage), config.cart_key.clone());
        let cart = CartHandle::new(Reconciler::new(local, remote, options));

        let saved = persisted::load(&storage);
        if let Some(auth_session) = saved.auth() {
            provider.sign_in(auth_session.clone());
            if let Err(e) = cart.transition(saved).await {
                tracing::debug!(error = %e, "Restoring saved session finished with an error");
            }
        }

        Ok(Self {
            storage,
            auth,
            cart,
            provider,
            notices,
        })
    }

    /// Notices raised since the last call.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut drained = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            drained.push(notice);
        }
        drained
    }

    /// Forget the saved session if the backend rejected it during this run.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the saved record cannot be removed.
    pub fn sync_saved_session(&self) -> Result<(), CliError> {
        let saved = persisted::load(&self.storage);
        if saved.is_authenticated() && !self.provider.current().is_authenticated() {
            tracing::info!("Saved session expired, signing out");
            persisted::save(&self.storage, &self.provider.current(), None)?;
        }
        Ok(())
    }
}
