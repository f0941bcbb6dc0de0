//! Furnish Cart - one shopping cart across anonymous and signed-in sessions.
//!
//! Shoppers fill a cart before they sign in. That cart lives on the device;
//! once they sign in, the backend holds the cart for their account. The
//! [`Reconciler`] picks the authoritative store for the current session and
//! moves device lines to the account on login.
//!
//! # Architecture
//!
//! ```text
//! SessionProvider ──► CartHandle ──► Reconciler ─┬─► LocalStore ──► KeyValueStore
//!                                                 └─► RemoteCart (HttpCartClient)
//! ```
//!
//! # Modules
//!
//! - [`storage`] - Device key-value storage (memory and file backed)
//! - [`local`] - Device cart persisted under a fixed key
//! - [`remote`] - Backend cart resource over HTTP
//! - [`auth`] - Backend login, registration and logout
//! - [`session`] - Publishes session transitions
//! - [`reconciler`] - Store selection and merge-on-login
//! - [`handle`] - Shared, serialized access to a reconciler
//! - [`notify`] - User-visible notices
//! - [`config`] - Environment configuration
//! - [`error`] - Error taxonomy

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod error;
pub mod handle;
pub mod local;
pub mod notify;
pub mod reconciler;
pub mod remote;
pub mod session;
pub mod storage;

pub use auth::{AuthClient, AuthError, Registration, SignedIn, UserProfile};
pub use config::{ApiConfig, CartConfig, ConfigError};
pub use error::{CartError, ErrorKind, Result};
pub use handle::{CartHandle, CartView};
pub use local::{LocalStore, UnsavedCart};
pub use notify::{ChannelNotifier, Notice, NoticeLevel, Notifier, TracingNotifier};
pub use reconciler::{MergeFailure, MergeReport, Reconciler, ReconcilerOptions};
pub use remote::{HttpCartClient, RemoteCart, RemoteError};
pub use session::SessionProvider;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
