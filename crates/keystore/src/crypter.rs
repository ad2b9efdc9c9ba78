//! AES-256-CBC crypter for wallet secrets
//!
//! A `Crypter` holds one derived key + IV pair and encrypts or decrypts
//! byte sequences with AES-256-CBC and PKCS#7 padding. The ciphertext
//! format is the raw cipher output: no framing, no authentication tag,
//! no version byte. Integrity comes from decryption success plus the
//! caller's public-key verification.
//!
//! Key material is wiped when the crypter is dropped, and on any failed
//! key setup.

use aes::Aes256;
use cipher::block_padding::Pkcs7;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use secrecy::SecretBox;
use zeroize::Zeroize;

use crate::error::{KeystoreError, KeystoreResult};
use crate::kdf::{derive_key_iv, DerivationMethod, IV_SIZE, KEY_SIZE};
use coinvault_crypto::secure::SecretBytes;

/// AES block length in bytes
pub const AES_BLOCK_SIZE: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Stateful AES-256-CBC encryptor/decryptor.
///
/// All operations fail cleanly until key material has been set via
/// `set_key_from_passphrase` or `set_key`.
pub struct Crypter {
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
    key_set: bool,
}

impl Crypter {
    /// Create a crypter with no key material set
    pub fn new() -> Self {
        Self {
            key: [0u8; KEY_SIZE],
            iv: [0u8; IV_SIZE],
            key_set: false,
        }
    }

    /// Derive and install key material from a passphrase.
    ///
    /// On any failure the partial key and IV are wiped and the crypter
    /// stays unkeyed.
    pub fn set_key_from_passphrase(
        &mut self,
        passphrase: &[u8],
        salt: &[u8],
        rounds: u32,
        method: DerivationMethod,
    ) -> KeystoreResult<()> {
        match derive_key_iv(passphrase, salt, rounds, method) {
            Ok(derived) => {
                self.key.copy_from_slice(derived.key());
                self.iv.copy_from_slice(derived.iv());
                self.key_set = true;
                Ok(())
            }
            Err(err) => {
                self.key.zeroize();
                self.iv.zeroize();
                self.key_set = false;
                Err(err)
            }
        }
    }

    /// Install pre-derived key material directly
    pub fn set_key(&mut self, key: &[u8], iv: &[u8]) -> KeystoreResult<()> {
        if key.len() != KEY_SIZE {
            return Err(KeystoreError::BadParameters(format!(
                "key must be {} bytes, got {}",
                KEY_SIZE,
                key.len()
            )));
        }
        if iv.len() != IV_SIZE {
            return Err(KeystoreError::BadParameters(format!(
                "IV must be {} bytes, got {}",
                IV_SIZE,
                iv.len()
            )));
        }

        self.key.copy_from_slice(key);
        self.iv.copy_from_slice(iv);
        self.key_set = true;
        Ok(())
    }

    /// Encrypt a plaintext.
    ///
    /// The output is always padded up to the next multiple of the AES
    /// block size strictly greater than the plaintext length:
    /// `out.len() == plaintext.len() + 16 - plaintext.len() % 16`.
    pub fn encrypt(&self, plaintext: &[u8]) -> KeystoreResult<Vec<u8>> {
        if !self.key_set {
            return Err(KeystoreError::BadParameters(
                "no key material set".to_string(),
            ));
        }

        let cipher = Aes256CbcEnc::new(&self.key.into(), &self.iv.into());
        Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
    }

    /// Decrypt a ciphertext.
    ///
    /// Fails if the input length is not a positive multiple of the AES
    /// block size or if the padding is invalid after decryption.
    pub fn decrypt(&self, ciphertext: &[u8]) -> KeystoreResult<SecretBytes> {
        if !self.key_set {
            return Err(KeystoreError::BadParameters(
                "no key material set".to_string(),
            ));
        }
        if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
            return Err(KeystoreError::CipherFailure(format!(
                "ciphertext length {} is not a positive multiple of {}",
                ciphertext.len(),
                AES_BLOCK_SIZE
            )));
        }

        let cipher = Aes256CbcDec::new(&self.key.into(), &self.iv.into());
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| KeystoreError::CipherFailure("invalid padding".to_string()))?;

        Ok(SecretBox::new(Box::new(plaintext)))
    }
}

impl Default for Crypter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Crypter {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

impl std::fmt::Debug for Crypter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crypter")
            .field("key", &"[REDACTED]")
            .field("iv", &"[REDACTED]")
            .field("key_set", &self.key_set)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn keyed_crypter() -> Crypter {
        let mut crypter = Crypter::new();
        crypter.set_key(&[0x11; KEY_SIZE], &[0x22; IV_SIZE]).unwrap();
        crypter
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let crypter = keyed_crypter();
        let plaintext = b"wallet secret material";

        let ciphertext = crypter.encrypt(plaintext).unwrap();
        assert_ne!(ciphertext.as_slice(), plaintext.as_slice());

        let decrypted = crypter.decrypt(&ciphertext).unwrap();
        assert_eq!(decrypted.expose_secret().as_slice(), plaintext.as_slice());
    }

    #[test]
    fn test_known_vector() {
        // AES-256-CBC, key 32x11, IV 16x22, PKCS#7
        let crypter = keyed_crypter();
        let ciphertext = crypter.encrypt(b"attack at dawn").unwrap();
        assert_eq!(hex::encode(&ciphertext), "1d372545f40ed6cd2663c2c0a9fee845");
    }

    #[test]
    fn test_ciphertext_length_padding() {
        let crypter = keyed_crypter();
        for len in [0, 1, 15, 16, 17, 31, 32, 33, 64] {
            let plaintext = vec![0x42u8; len];
            let ciphertext = crypter.encrypt(&plaintext).unwrap();
            // Always at least one block longer than the plaintext
            assert_eq!(ciphertext.len(), len + AES_BLOCK_SIZE - len % AES_BLOCK_SIZE);

            let decrypted = crypter.decrypt(&ciphertext).unwrap();
            assert_eq!(decrypted.expose_secret(), &plaintext);
        }
    }

    #[test]
    fn test_unkeyed_crypter_fails() {
        let crypter = Crypter::new();
        assert!(crypter.encrypt(b"data").is_err());
        assert!(crypter.decrypt(&[0u8; 16]).is_err());
    }

    #[test]
    fn test_set_key_rejects_bad_sizes() {
        let mut crypter = Crypter::new();
        assert!(crypter.set_key(&[0u8; 16], &[0u8; IV_SIZE]).is_err());
        assert!(crypter.set_key(&[0u8; KEY_SIZE], &[0u8; 8]).is_err());
        assert!(crypter.set_key(&[0u8; KEY_SIZE], &[0u8; IV_SIZE]).is_ok());
    }

    #[test]
    fn test_failed_passphrase_setup_leaves_crypter_unkeyed() {
        let mut crypter = Crypter::new();
        assert!(crypter
            .set_key_from_passphrase(b"pw", &[0u8; 3], 1, DerivationMethod::Sha512Aes)
            .is_err());
        assert!(crypter.encrypt(b"data").is_err());
    }

    #[test]
    fn test_decrypt_rejects_bad_lengths() {
        let crypter = keyed_crypter();
        assert!(crypter.decrypt(&[]).is_err());
        assert!(crypter.decrypt(&[0u8; 15]).is_err());
        assert!(crypter.decrypt(&[0u8; 17]).is_err());
    }

    #[test]
    fn test_wrong_key_fails_padding_check() {
        // The known vector's padding does not survive decryption under a
        // different key.
        let ciphertext = hex::decode("1d372545f40ed6cd2663c2c0a9fee845").unwrap();

        let mut wrong = Crypter::new();
        wrong.set_key(&[0x33; KEY_SIZE], &[0x22; IV_SIZE]).unwrap();
        assert!(matches!(
            wrong.decrypt(&ciphertext),
            Err(KeystoreError::CipherFailure(_))
        ));
    }

    #[test]
    fn test_different_iv_different_ciphertext() {
        let plaintext = b"same plaintext";
        let crypter1 = keyed_crypter();

        let mut crypter2 = Crypter::new();
        crypter2.set_key(&[0x11; KEY_SIZE], &[0x23; IV_SIZE]).unwrap();

        assert_ne!(
            crypter1.encrypt(plaintext).unwrap(),
            crypter2.encrypt(plaintext).unwrap()
        );
    }

    #[test]
    fn test_passphrase_derived_encryption() {
        // End-to-end over the KDF: passphrase "test", salt 00..07, one
        // round, plaintext 32x2a.
        let mut crypter = Crypter::new();
        crypter
            .set_key_from_passphrase(
                b"test",
                &[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07],
                1,
                DerivationMethod::Sha512Aes,
            )
            .unwrap();

        let ciphertext = crypter.encrypt(&[0x2a; 32]).unwrap();
        assert_eq!(
            hex::encode(&ciphertext),
            "4e2656bbba8186aa2c15b4d26e3cbd6409d75db741d120984dd2f2c900aaaf1de247a9162174b4db98adb77e2c6f09f4"
        );
    }
}
