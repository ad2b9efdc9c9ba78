//! Secure memory handling for secret material
//!
//! This module provides memory-safe containers for passphrases, key
//! material and decrypted secrets with:
//! - Automatic zeroing on drop via `zeroize`
//! - Debug output masking to prevent log exposure
//! - Prevention of accidental cloning for fixed-size material
//!
//! # Security Properties
//!
//! - Secrets are zeroized when dropped (even on panic)
//! - Debug output shows `[REDACTED]` instead of secret bytes
//! - `SecretArray` intentionally does NOT implement `Clone`

mod secret;

pub use secret::{IntoSecret, SecretArray, SecretBytes, SecretString};
