//! Furnish Core - Shared cart and session types.
//!
//! This crate provides the types shared by every Furnish component:
//! - `cart` - Cart reconciliation between device storage and the backend
//! - `cli` - Command-line driver for the cart
//! - `integration-tests` - End-to-end tests against a fake backend
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no storage access, no HTTP
//! clients. Every invariant of a cart (positive quantities, one line per
//! product) is enforced here so both backing stores share it.
//!
//! # Modules
//!
//! - [`types`] - Identifiers, line items, carts and sessions

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
