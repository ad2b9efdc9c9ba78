//! Encrypted key store for the Coinvault wallet
//!
//! This crate implements the wallet's secret-gating core:
//!
//! - A passphrase KDF matching OpenSSL's legacy `EVP_BytesToKey`
//!   (aes-256-cbc / sha512), bit-exact for existing wallet files
//! - A stateful AES-256-CBC crypter with PKCS#7 padding
//! - Per-secret envelopes keyed by a 32-byte master key with
//!   deterministic, item-specific IVs
//! - A thread-safe encrypted key store that falls back to a plaintext
//!   store until encryption is enabled, and gates every secret behind
//!   lock/unlock once it is
//!
//! # Security Properties
//!
//! - Plaintext secrets never persist; transient buffers are wiped
//! - The master key lives in memory only while the store is unlocked
//! - Decrypted private keys are verified against their public keys
//!   (CBC carries no authentication tag)
//! - A store that decrypts inconsistently refuses to keep running
//!
//! # Example
//!
//! ```rust
//! use coinvault_crypto::Key;
//! use coinvault_keystore::{CryptoKeyStore, KeyStore, MasterKey};
//!
//! let store = CryptoKeyStore::new();
//! let key = Key::generate(&mut rand::thread_rng(), true);
//! let key_id = key.pub_key().key_id();
//! store.add_key(key)?;
//!
//! // Migrate to encrypted storage, then unlock to use the keys
//! store.encrypt_keys(MasterKey::new([0x11; 32]))?;
//! assert!(store.is_locked());
//! store.unlock(MasterKey::new([0x11; 32]))?;
//! let key = store.get_key(&key_id)?;
//! # Ok::<(), coinvault_keystore::KeystoreError>(())
//! ```

mod basic;
mod crypter;
mod crypted;
mod envelope;
mod error;
mod kdf;
mod notify;

pub use basic::BasicKeyStore;
pub use crypter::{Crypter, AES_BLOCK_SIZE};
pub use crypted::CryptoKeyStore;
pub use envelope::{decrypt_key, decrypt_secret, encrypt_secret};
pub use error::{KeystoreError, KeystoreResult};
pub use kdf::{
    derive_key_iv, generate_salt, DerivationMethod, DerivedKeyIv, MasterKey, MasterKeyRecord,
    DEFAULT_ROUNDS, IV_SIZE, KEY_SIZE, SALT_SIZE,
};
pub use notify::ListenerToken;

use coinvault_crypto::secure::SecretString;
use coinvault_crypto::{Key, KeyId, PubKey};

/// Common interface of the plaintext and encrypted key stores.
///
/// Implementations are thread-safe; every method is atomic from the
/// caller's perspective.
pub trait KeyStore: Send + Sync {
    /// Store a private key together with its public key
    fn add_key_pub_key(&self, key: Key, pub_key: PubKey) -> KeystoreResult<()>;

    /// Store a private key, deriving the public key from it
    fn add_key(&self, key: Key) -> KeystoreResult<()> {
        let pub_key = key.pub_key();
        self.add_key_pub_key(key, pub_key)
    }

    /// Whether a private key is held for `key_id`
    fn have_key(&self, key_id: &KeyId) -> bool;

    /// Retrieve the private key for `key_id`
    fn get_key(&self, key_id: &KeyId) -> KeystoreResult<Key>;

    /// Retrieve the public key for `key_id`, including watch-only keys
    fn get_pub_key(&self, key_id: &KeyId) -> KeystoreResult<PubKey>;

    /// Identifiers of all held private keys
    fn key_ids(&self) -> Vec<KeyId>;

    /// Track a public key without private material
    fn add_watch_only(&self, pub_key: PubKey) -> KeystoreResult<()>;

    /// Store the wallet's mnemonic paper key
    fn add_paper_key(&self, paper_key: &str) -> KeystoreResult<()>;

    /// Retrieve the wallet's mnemonic paper key
    fn get_paper_key(&self) -> KeystoreResult<SecretString>;

    /// Store the wallet's PIN code
    fn add_pin_code(&self, pin_code: &str) -> KeystoreResult<()>;

    /// Retrieve the wallet's PIN code
    fn get_pin_code(&self) -> KeystoreResult<SecretString>;
}
