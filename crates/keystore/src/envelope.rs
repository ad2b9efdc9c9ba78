//! Per-secret encryption envelopes
//!
//! Stateless helpers that encrypt or decrypt one secret under the wallet
//! master key. Each secret gets a deterministic IV: the first 16 bytes of
//! a 256-bit seed derived from the item's identity (the public key's
//! double-SHA-256 for private keys, a hashed label for named secrets).
//! Re-encrypting the same item therefore reproduces the same IV, and
//! distinct items use distinct IVs.
//!
//! Because CBC carries no authentication tag, `decrypt_key` verifies that
//! the recovered scalar reproduces the stored public key; a wrong master
//! key fails that check with overwhelming probability.

use secrecy::ExposeSecret;
use zeroize::Zeroizing;

use crate::crypter::Crypter;
use crate::error::{KeystoreError, KeystoreResult};
use crate::kdf::{MasterKey, IV_SIZE, KEY_SIZE};
use coinvault_crypto::secure::SecretBytes;
use coinvault_crypto::{Key, PubKey};

/// Encrypt one secret under the master key with an item-specific IV seed.
pub fn encrypt_secret(
    master_key: &MasterKey,
    plaintext: &[u8],
    iv_seed: &[u8; 32],
) -> KeystoreResult<Vec<u8>> {
    let mut crypter = Crypter::new();
    crypter.set_key(master_key.expose_secret(), &iv_seed[..IV_SIZE])?;
    crypter.encrypt(plaintext)
}

/// Decrypt one secret under the master key with an item-specific IV seed.
pub fn decrypt_secret(
    master_key: &MasterKey,
    ciphertext: &[u8],
    iv_seed: &[u8; 32],
) -> KeystoreResult<SecretBytes> {
    let mut crypter = Crypter::new();
    crypter.set_key(master_key.expose_secret(), &iv_seed[..IV_SIZE])?;
    crypter.decrypt(ciphertext)
}

/// Decrypt a stored private key and verify it against its public key.
///
/// Fails with `KeyMismatch` if the plaintext is not a 32-byte scalar, is
/// not a valid secp256k1 secret key, or does not reproduce `pub_key`.
pub fn decrypt_key(
    master_key: &MasterKey,
    crypted_secret: &[u8],
    pub_key: &PubKey,
) -> KeystoreResult<Key> {
    let secret = decrypt_secret(master_key, crypted_secret, &pub_key.hash())?;
    if secret.expose_secret().len() != KEY_SIZE {
        return Err(KeystoreError::KeyMismatch);
    }

    let mut scalar = Zeroizing::new([0u8; KEY_SIZE]);
    scalar.copy_from_slice(secret.expose_secret());

    let key = Key::from_bytes(&scalar, pub_key.is_compressed())
        .map_err(|_| KeystoreError::KeyMismatch)?;
    if !key.verify_pub_key(pub_key) {
        return Err(KeystoreError::KeyMismatch);
    }

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coinvault_crypto::hash::double_hash_of_str;

    fn master_key(byte: u8) -> MasterKey {
        MasterKey::new([byte; KEY_SIZE])
    }

    #[test]
    fn test_secret_roundtrip() {
        let master = master_key(0x11);
        let seed = double_hash_of_str("paperkey");

        let ciphertext = encrypt_secret(&master, b"abandon ability able", &seed).unwrap();
        let plaintext = decrypt_secret(&master, &ciphertext, &seed).unwrap();
        assert_eq!(plaintext.expose_secret().as_slice(), b"abandon ability able");
    }

    #[test]
    fn test_iv_seed_domain_separation() {
        // Same plaintext and master key, different labels: different IVs,
        // different ciphertexts.
        let master = master_key(0x11);
        let ct_paper = encrypt_secret(&master, b"1234", &double_hash_of_str("paperkey")).unwrap();
        let ct_pin = encrypt_secret(&master, b"1234", &double_hash_of_str("pincode")).unwrap();
        assert_ne!(ct_paper, ct_pin);
    }

    #[test]
    fn test_envelope_is_deterministic_per_item() {
        let master = master_key(0x11);
        let seed = double_hash_of_str("pincode");
        let a = encrypt_secret(&master, b"1234", &seed).unwrap();
        let b = encrypt_secret(&master, b"1234", &seed).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_decrypt_key_roundtrip() {
        let master = master_key(0x11);
        let key = Key::generate(&mut rand::thread_rng(), true);
        let pub_key = key.pub_key();

        let crypted = encrypt_secret(&master, &key.to_bytes(), &pub_key.hash()).unwrap();
        let recovered = decrypt_key(&master, &crypted, &pub_key).unwrap();
        assert_eq!(recovered.to_bytes(), key.to_bytes());
        assert_eq!(recovered.is_compressed(), key.is_compressed());
    }

    #[test]
    fn test_decrypt_key_wrong_master_fails() {
        // Even when the padding happens to survive, the recovered scalar
        // cannot reproduce the stored public key.
        let key = Key::generate(&mut rand::thread_rng(), true);
        let pub_key = key.pub_key();
        let crypted = encrypt_secret(&master_key(0x11), &key.to_bytes(), &pub_key.hash()).unwrap();

        assert!(decrypt_key(&master_key(0x22), &crypted, &pub_key).is_err());
    }

    #[test]
    fn test_decrypt_key_rejects_wrong_length_plaintext() {
        let master = master_key(0x11);
        let key = Key::generate(&mut rand::thread_rng(), true);
        let pub_key = key.pub_key();

        // Envelope a secret that is not a 32-byte scalar
        let crypted = encrypt_secret(&master, &[0x55; 31], &pub_key.hash()).unwrap();
        assert!(matches!(
            decrypt_key(&master, &crypted, &pub_key),
            Err(KeystoreError::KeyMismatch)
        ));
    }

    #[test]
    fn test_decrypt_key_rejects_swapped_pub_key() {
        let master = master_key(0x11);
        let key = Key::generate(&mut rand::thread_rng(), true);
        let other = Key::generate(&mut rand::thread_rng(), true);

        // Ciphertext stored against the wrong public key: the IV seed and
        // the verification step both disagree.
        let crypted = encrypt_secret(&master, &key.to_bytes(), &key.pub_key().hash()).unwrap();
        assert!(decrypt_key(&master, &crypted, &other.pub_key()).is_err());
    }
}
