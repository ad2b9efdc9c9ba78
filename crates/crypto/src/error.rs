//! Cryptographic error types

use thiserror::Error;

/// Errors produced by the wallet key primitives
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Invalid secret key bytes
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    /// Invalid public key bytes
    #[error("invalid public key bytes")]
    InvalidPublicKey,

    /// Invalid key identifier length
    #[error("invalid key identifier length: expected {expected}, got {actual}")]
    InvalidKeyIdLength { expected: usize, actual: usize },
}
