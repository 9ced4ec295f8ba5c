//! Keyward Core: shared types, errors, and the grant-set algebra.
//!
//! This crate provides the foundational types used across all Keyward crates.
//! It has no internal Keyward dependencies (dependency level 0).
//!
//! # Modules
//!
//! - [`error`]: Error types and Result alias
//! - [`policy`]: [`GrantSet`] with its merge/subtract algebra
//! - [`tag`]: Reverse-index entries and the ownership wildcard
//! - [`credential`]: Credential records
//! - [`keygen`]: Random access/secret key generation

pub mod credential;
pub mod error;
pub mod keygen;
pub mod policy;
pub mod tag;

// Re-export key types at crate root for convenience
pub use credential::CredentialRecord;
pub use error::{Error, Result};
pub use keygen::{ACCESS_KEY_LENGTH, KeyGenerator, SECRET_KEY_LENGTH, validate_key};
pub use policy::GrantSet;
pub use tag::{GrantAction, GrantTag, SEPARATOR, WILDCARD};
