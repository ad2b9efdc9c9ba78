//! Secret wrapper utilities for consistent secret handling
//!
//! Provides type aliases and utilities around the `secrecy` crate for
//! handling sensitive strings and byte buffers, plus a fixed-size array
//! container for symmetric key material.

use secrecy::{SecretBox, SecretString as SecrecySecretString};
use zeroize::Zeroize;

/// A secret byte buffer that is zeroized on drop.
///
/// Use this for variable-length sensitive data such as decrypted secrets
/// or derived bytes. The inner value can only be accessed via
/// `expose_secret()`.
///
/// # Example
///
/// ```rust
/// use coinvault_crypto::secure::SecretBytes;
/// use secrecy::ExposeSecret;
///
/// let secret = SecretBytes::new(Box::new(vec![1, 2, 3, 4]));
/// assert_eq!(secret.expose_secret(), &vec![1, 2, 3, 4]);
/// // Memory is zeroized when `secret` goes out of scope
/// ```
pub type SecretBytes = SecretBox<Vec<u8>>;

/// A secret string that is zeroized on drop.
///
/// Use this for sensitive text like passphrases, mnemonics, or PIN codes.
///
/// # Example
///
/// ```rust
/// use coinvault_crypto::secure::SecretString;
/// use secrecy::ExposeSecret;
///
/// let passphrase: SecretString = "my-secret-passphrase".to_string().into();
/// assert_eq!(passphrase.expose_secret(), "my-secret-passphrase");
/// ```
pub type SecretString = SecrecySecretString;

/// A fixed-size secret byte array.
///
/// Unlike `SecretBytes`, this is for fixed-size secrets like symmetric
/// keys. The master key of the encrypted key store is a `SecretArray<32>`.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SecretArray<const N: usize> {
    inner: [u8; N],
}

impl<const N: usize> SecretArray<N> {
    /// Create a new secret array from bytes.
    pub fn new(bytes: [u8; N]) -> Self {
        Self { inner: bytes }
    }

    /// Expose the secret bytes.
    ///
    /// # Security
    ///
    /// Use this sparingly and only when necessary.
    /// The returned reference should not be stored.
    pub fn expose_secret(&self) -> &[u8; N] {
        &self.inner
    }
}

impl<const N: usize> std::fmt::Debug for SecretArray<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretArray")
            .field("length", &N)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

// Don't implement Clone to prevent accidental copies of key material.

/// Extension trait for creating secret values.
pub trait IntoSecret {
    /// The secret type this converts into.
    type Secret;

    /// Convert into a secret value.
    fn into_secret(self) -> Self::Secret;
}

impl IntoSecret for String {
    type Secret = SecretString;

    fn into_secret(self) -> Self::Secret {
        self.into()
    }
}

impl IntoSecret for Vec<u8> {
    type Secret = SecretBytes;

    fn into_secret(self) -> Self::Secret {
        SecretBox::new(Box::new(self))
    }
}
