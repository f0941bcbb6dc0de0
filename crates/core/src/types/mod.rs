//! Core types for Furnish.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod id;
pub mod session;

pub use cart::{Cart, LineItem, ProductSnapshot};
pub use id::*;
pub use session::{AccessToken, AuthSession, Session};
