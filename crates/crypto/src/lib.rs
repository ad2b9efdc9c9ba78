//! Cryptographic primitives for the Coinvault wallet
//!
//! This crate provides:
//! - SHA-256 hashing helpers used for key identifiers and IV seeds
//! - secp256k1 wallet key types (`Key`, `PubKey`, `KeyId`)
//! - Secure memory containers that wipe secrets on drop

pub mod error;
pub mod hash;
pub mod keys;
pub mod secure;

pub use error::CryptoError;
pub use keys::{Key, KeyId, PubKey};
