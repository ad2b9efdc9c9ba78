//! Key Derivation Function (KDF) implementation
//!
//! Derives a 32-byte AES key and 16-byte IV from a passphrase and salt
//! using iterated SHA-512. The construction mimics OpenSSL's legacy
//! `EVP_BytesToKey` with an aes-256-cbc cipher and sha512 digest; because
//! SHA-512's 64-byte output already covers the key (32) plus IV (16),
//! only a single digest block is ever processed.
//!
//! Existing wallet files depend on this construction bit-for-bit.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use crate::crypter::Crypter;
use crate::error::{KeystoreError, KeystoreResult};
use coinvault_crypto::secure::SecretArray;
use secrecy::ExposeSecret as _;

/// Symmetric key length in bytes
pub const KEY_SIZE: usize = 32;

/// AES-CBC IV length in bytes
pub const IV_SIZE: usize = 16;

/// Salt length in bytes
pub const SALT_SIZE: usize = 8;

/// Historical default iteration count for new passphrase records
pub const DEFAULT_ROUNDS: u32 = 25_000;

/// The 32-byte master key that envelops every stored secret.
///
/// Held in memory only while the store is unlocked; wiped on drop.
pub type MasterKey = SecretArray<KEY_SIZE>;

/// Key derivation method recorded in persisted passphrase records.
///
/// Only id 0 (SHA-512 / AES-256-CBC) is defined. Unknown ids are rejected
/// outright rather than falling through to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationMethod {
    /// Iterated SHA-512 feeding AES-256-CBC (id 0)
    Sha512Aes,
}

impl DerivationMethod {
    /// Resolve a persisted method id
    pub fn from_id(id: u32) -> KeystoreResult<Self> {
        match id {
            0 => Ok(Self::Sha512Aes),
            other => Err(KeystoreError::BadParameters(format!(
                "unknown derivation method id {other}"
            ))),
        }
    }

    /// The persisted method id
    pub fn id(self) -> u32 {
        match self {
            Self::Sha512Aes => 0,
        }
    }
}

/// Key + IV pair produced by the KDF.
///
/// Transient: never persisted, wiped on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct DerivedKeyIv {
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
}

impl DerivedKeyIv {
    /// The derived 32-byte key
    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// The derived 16-byte IV
    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }
}

impl std::fmt::Debug for DerivedKeyIv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKeyIv")
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .finish()
    }
}

/// Derive a key and IV from a passphrase.
///
/// # Arguments
///
/// * `passphrase` - User passphrase bytes
/// * `salt` - Exactly 8 random salt bytes
/// * `rounds` - Iteration count, at least 1
/// * `method` - Derivation method (only `Sha512Aes` is defined)
///
/// The first digest covers `passphrase || salt`; each further round
/// re-hashes the running digest. Key is bytes 0..32 of the final digest,
/// IV is bytes 32..48.
pub fn derive_key_iv(
    passphrase: &[u8],
    salt: &[u8],
    rounds: u32,
    method: DerivationMethod,
) -> KeystoreResult<DerivedKeyIv> {
    if rounds < 1 {
        return Err(KeystoreError::BadParameters(
            "iteration count must be at least 1".to_string(),
        ));
    }
    if salt.len() != SALT_SIZE {
        return Err(KeystoreError::BadParameters(format!(
            "salt must be {} bytes, got {}",
            SALT_SIZE,
            salt.len()
        )));
    }

    match method {
        DerivationMethod::Sha512Aes => {
            let mut hasher = Sha512::new();
            hasher.update(passphrase);
            hasher.update(salt);
            let mut buf = [0u8; 64];
            buf.copy_from_slice(&hasher.finalize());

            for _ in 1..rounds {
                let digest = Sha512::digest(buf);
                buf.copy_from_slice(&digest);
            }

            let mut derived = DerivedKeyIv {
                key: [0u8; KEY_SIZE],
                iv: [0u8; IV_SIZE],
            };
            derived.key.copy_from_slice(&buf[..KEY_SIZE]);
            derived.iv.copy_from_slice(&buf[KEY_SIZE..KEY_SIZE + IV_SIZE]);
            buf.zeroize();

            Ok(derived)
        }
    }
}

/// Generate a random 8-byte salt
pub fn generate_salt<R: CryptoRng + RngCore>(rng: &mut R) -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rng.fill_bytes(&mut salt);
    salt
}

/// Persisted passphrase record: the master key wrapped under a
/// passphrase-derived key.
///
/// A wallet may carry several of these, each wrapping the same master key
/// under a different passphrase. The record holds everything the KDF needs
/// to re-derive the wrapping key; the passphrase itself is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterKeyRecord {
    /// Master key ciphertext (AES-256-CBC under the derived key+IV)
    #[serde(with = "hex::serde")]
    pub crypted_key: Vec<u8>,
    /// Random 8-byte salt
    #[serde(with = "hex::serde")]
    pub salt: Vec<u8>,
    /// Derivation method id (0 = SHA-512 / AES-256-CBC)
    pub method: u32,
    /// KDF iteration count
    pub rounds: u32,
}

impl MasterKeyRecord {
    /// Create an empty record with a fresh random salt and the default
    /// iteration count. `wrap_master_key` fills in the ciphertext.
    pub fn generate<R: CryptoRng + RngCore>(rng: &mut R) -> Self {
        Self {
            crypted_key: Vec::new(),
            salt: generate_salt(rng).to_vec(),
            method: DerivationMethod::Sha512Aes.id(),
            rounds: DEFAULT_ROUNDS,
        }
    }

    /// Encrypt the master key under the key derived from `passphrase`.
    pub fn wrap_master_key(
        &mut self,
        passphrase: &[u8],
        master_key: &MasterKey,
    ) -> KeystoreResult<()> {
        let method = DerivationMethod::from_id(self.method)?;
        let mut crypter = Crypter::new();
        crypter.set_key_from_passphrase(passphrase, &self.salt, self.rounds, method)?;
        self.crypted_key = crypter.encrypt(master_key.expose_secret())?;
        Ok(())
    }

    /// Recover the master key using `passphrase`.
    ///
    /// A wrong passphrase surfaces as `WrongPassphrase`: the derived key
    /// yields a padding error or a wrong-length plaintext with
    /// overwhelming probability.
    pub fn unwrap_master_key(&self, passphrase: &[u8]) -> KeystoreResult<MasterKey> {
        if self.crypted_key.is_empty() {
            return Err(KeystoreError::Missing("wrapped master key"));
        }

        let method = DerivationMethod::from_id(self.method)?;
        let mut crypter = Crypter::new();
        crypter.set_key_from_passphrase(passphrase, &self.salt, self.rounds, method)?;

        let plain = crypter
            .decrypt(&self.crypted_key)
            .map_err(|_| KeystoreError::WrongPassphrase)?;
        let bytes = plain.expose_secret();
        if bytes.len() != KEY_SIZE {
            return Err(KeystoreError::WrongPassphrase);
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        let master_key = MasterKey::new(key);
        key.zeroize();
        Ok(master_key)
    }
}
