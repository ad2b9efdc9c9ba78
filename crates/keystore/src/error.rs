//! Key store error types

use thiserror::Error;

/// Errors that can occur during key store operations
#[derive(Error, Debug)]
pub enum KeystoreError {
    /// Wrong-sized salt, key, or IV; zero iteration count; unknown
    /// derivation method
    #[error("bad parameters: {0}")]
    BadParameters(String),

    /// Operation not permitted in the store's current mode
    #[error("mode violation: {0}")]
    ModeViolation(&'static str),

    /// Secret retrieval or mutation attempted while the store is locked
    #[error("key store is locked")]
    Locked,

    /// No stored key decrypted under the supplied master key
    #[error("wrong passphrase: no key decrypted under the supplied master key")]
    WrongPassphrase,

    /// Requested key, paper key, or PIN code is not present
    #[error("{0} not found")]
    Missing(&'static str),

    /// The cipher rejected its input (malformed length, padding error)
    #[error("cipher failure: {0}")]
    CipherFailure(String),

    /// A decrypted secret does not reproduce its stored public key
    #[error("decrypted secret does not match its public key")]
    KeyMismatch,
}

/// Result type for key store operations
pub type KeystoreResult<T> = Result<T, KeystoreError>;
