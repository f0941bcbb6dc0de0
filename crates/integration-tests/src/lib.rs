//! Integration tests for Furnish.
//!
//! Tests run the cart against [`FakeBackend`], an axum server on an
//! ephemeral port that speaks the same REST shape as the real backend.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p furnish-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_client` - `HttpCartClient` against the fake cart resource
//! - `auth_client` - `AuthClient` login, registration and logout
//! - `reconciler` - Session transitions and merge-on-login end to end
//! - `device_storage` - File-backed device cart

#![cfg_attr(not(test), forbid(unsafe_code))]

mod backend;

pub use backend::FakeBackend;
