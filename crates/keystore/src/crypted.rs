//! Encrypted key store
//!
//! `CryptoKeyStore` gates access to wallet secrets behind a 32-byte master
//! key. It owns a plaintext `BasicKeyStore` and forwards to it until
//! encryption is enabled; once enabled the store never returns to
//! plaintext mode, and private keys exist in memory only while unlocked.
//!
//! # Concurrency
//!
//! Two locks, always acquired in the same order:
//!
//! 1. the store's own mutex (mode flags, master key, ciphertext maps)
//! 2. the basic store's mutex, taken by delegated calls
//!
//! Every public operation takes the store mutex first, so each is atomic
//! from the caller's perspective. Status-changed callbacks run after the
//! store mutex is released.
//!
//! # Corruption policy
//!
//! If some stored keys decrypt under a candidate master key and others do
//! not, the plaintext and ciphertext contents are structurally
//! inconsistent. The store logs the condition and panics rather than
//! continue with a key store that could silently lose funds.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use secrecy::ExposeSecret;
use tracing::{debug, error};
use zeroize::Zeroizing;

use crate::basic::BasicKeyStore;
use crate::envelope;
use crate::error::{KeystoreError, KeystoreResult};
use crate::kdf::MasterKey;
use crate::notify::{ListenerToken, StatusNotifier};
use crate::KeyStore;
use coinvault_crypto::hash::double_hash_of_str;
use coinvault_crypto::secure::SecretString;
use coinvault_crypto::{Key, KeyId, PubKey};

/// IV-seed label for the enveloped paper key
const PAPER_KEY_LABEL: &str = "paperkey";

/// IV-seed label for the enveloped PIN code
const PIN_CODE_LABEL: &str = "pincode";

struct CryptedInner {
    /// Once true, never reset
    use_crypto: bool,
    /// Present iff the store is unlocked
    master_key: Option<MasterKey>,
    /// key id -> (public key, enveloped private key)
    crypted_keys: BTreeMap<KeyId, (PubKey, Vec<u8>)>,
    /// Enveloped paper key, at most one
    crypted_paper_key: Option<Vec<u8>>,
    /// Enveloped PIN code, at most one
    crypted_pin_code: Option<Vec<u8>>,
    /// After one full-map unlock succeeded, later unlocks may stop at the
    /// first key that decrypts
    thoroughly_checked: bool,
}

/// Thread-safe encrypted key store
pub struct CryptoKeyStore {
    base: BasicKeyStore,
    inner: Mutex<CryptedInner>,
    notifier: StatusNotifier<CryptoKeyStore>,
}

impl CryptoKeyStore {
    /// Create a store in plaintext mode
    pub fn new() -> Self {
        Self {
            base: BasicKeyStore::new(),
            inner: Mutex::new(CryptedInner {
                use_crypto: false,
                master_key: None,
                crypted_keys: BTreeMap::new(),
                crypted_paper_key: None,
                crypted_pin_code: None,
                thoroughly_checked: false,
            }),
            notifier: StatusNotifier::new(),
        }
    }

    /// Whether encryption has been enabled
    pub fn is_crypted(&self) -> bool {
        self.inner.lock().use_crypto
    }

    /// Whether the store is encrypted and the master key is absent
    pub fn is_locked(&self) -> bool {
        Self::is_locked_inner(&self.inner.lock())
    }

    fn is_locked_inner(inner: &CryptedInner) -> bool {
        inner.use_crypto && inner.master_key.is_none()
    }

    /// Switch the store into encrypted mode.
    ///
    /// Succeeds if already encrypted. Refuses while plaintext keys exist:
    /// they must be migrated with `encrypt_keys` first.
    pub fn set_crypted(&self) -> KeystoreResult<()> {
        let mut inner = self.inner.lock();
        self.set_crypted_locked(&mut inner)
    }

    fn set_crypted_locked(&self, inner: &mut CryptedInner) -> KeystoreResult<()> {
        if inner.use_crypto {
            return Ok(());
        }
        if self.base.has_keys() {
            return Err(KeystoreError::ModeViolation(
                "plaintext keys present; migrate with encrypt_keys first",
            ));
        }
        inner.use_crypto = true;
        Ok(())
    }

    /// Lock the store: wipe and release the master key.
    ///
    /// Forces encrypted mode, so this fails on a plaintext store that
    /// still holds keys. Emits a status-changed notification.
    pub fn lock(&self) -> KeystoreResult<()> {
        {
            let mut inner = self.inner.lock();
            self.set_crypted_locked(&mut inner)?;
            inner.master_key = None;
        }
        debug!("key store locked");
        self.notifier.notify(self);
        Ok(())
    }

    /// Unlock the store with a candidate master key.
    ///
    /// Every stored ciphertext is test-decrypted against its public key
    /// (only the first, once a previous unlock checked the full map). The
    /// key is retained only if at least one ciphertext decrypts; a mix of
    /// successes and failures is fatal corruption.
    ///
    /// Emits a status-changed notification on success.
    pub fn unlock(&self, master_key: MasterKey) -> KeystoreResult<()> {
        {
            let mut inner = self.inner.lock();
            self.set_crypted_locked(&mut inner)?;

            let mut any_pass = false;
            let mut any_fail = false;
            for (pub_key, crypted_secret) in inner.crypted_keys.values() {
                match envelope::decrypt_key(&master_key, crypted_secret, pub_key) {
                    Ok(_) => {
                        any_pass = true;
                        if inner.thoroughly_checked {
                            break;
                        }
                    }
                    Err(_) => {
                        any_fail = true;
                        break;
                    }
                }
            }

            if any_pass && any_fail {
                error!("key store is probably corrupted: some keys decrypt but not all");
                panic!("inconsistent key store: some keys decrypt but not all");
            }
            if !any_pass {
                return Err(KeystoreError::WrongPassphrase);
            }

            inner.master_key = Some(master_key);
            inner.thoroughly_checked = true;
        }
        debug!("key store unlocked");
        self.notifier.notify(self);
        Ok(())
    }

    /// One-shot migration of every plaintext key into encrypted storage.
    ///
    /// Fails if the store is already encrypted or holds ciphertexts. On
    /// success the plaintext map is empty and the store is locked: the
    /// master key is not retained, call `unlock` to use the keys.
    pub fn encrypt_keys(&self, master_key: MasterKey) -> KeystoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.use_crypto || !inner.crypted_keys.is_empty() {
            return Err(KeystoreError::ModeViolation("store is already encrypted"));
        }

        inner.use_crypto = true;
        for (key_id, key, pub_key) in self.base.keys_snapshot() {
            let secret = Zeroizing::new(key.to_bytes());
            let crypted_secret =
                match envelope::encrypt_secret(&master_key, secret.as_slice(), &pub_key.hash()) {
                    Ok(crypted_secret) => crypted_secret,
                    Err(err) => {
                        // A half-migrated store must not keep running.
                        error!(%err, "key migration failed part-way through");
                        panic!("key store migration failed: {err}");
                    }
                };
            inner.crypted_keys.insert(key_id, (pub_key, crypted_secret));
        }
        self.base.clear_keys();

        debug!(keys = inner.crypted_keys.len(), "migrated plaintext keys to encrypted storage");
        Ok(())
    }

    /// Install an already-enveloped private key (persistence load path).
    /// Forces encrypted mode.
    pub fn add_crypted_key(&self, pub_key: PubKey, crypted_secret: Vec<u8>) -> KeystoreResult<()> {
        let mut inner = self.inner.lock();
        self.set_crypted_locked(&mut inner)?;
        inner
            .crypted_keys
            .insert(pub_key.key_id(), (pub_key, crypted_secret));
        Ok(())
    }

    /// Copy out every (public key, ciphertext) record for persistence
    pub fn crypted_key_records(&self) -> Vec<(PubKey, Vec<u8>)> {
        self.inner.lock().crypted_keys.values().cloned().collect()
    }

    /// Install an already-enveloped paper key, replacing any existing
    /// ciphertext. Forces encrypted mode.
    pub fn add_crypted_paper_key(&self, crypted_paper_key: Vec<u8>) -> KeystoreResult<()> {
        let mut inner = self.inner.lock();
        self.set_crypted_locked(&mut inner)?;
        inner.crypted_paper_key = Some(crypted_paper_key);
        Ok(())
    }

    /// The enveloped paper key, for persistence. Requires the store to be
    /// unlocked.
    pub fn get_crypted_paper_key(&self) -> KeystoreResult<Vec<u8>> {
        let inner = self.inner.lock();
        if Self::is_locked_inner(&inner) {
            return Err(KeystoreError::Locked);
        }
        inner
            .crypted_paper_key
            .clone()
            .ok_or(KeystoreError::Missing("paper key"))
    }

    /// Re-envelope the current paper key under `master_key` and wipe the
    /// plaintext mirror. Must run while unlocked.
    pub fn encrypt_paper_key(&self, master_key: &MasterKey) -> KeystoreResult<()> {
        let mut inner = self.inner.lock();
        if Self::is_locked_inner(&inner) {
            return Err(KeystoreError::Locked);
        }

        let paper_key = self.paper_key_locked(&inner)?;
        let crypted = envelope::encrypt_secret(
            master_key,
            paper_key.expose_secret().as_bytes(),
            &double_hash_of_str(PAPER_KEY_LABEL),
        )?;
        inner.crypted_paper_key = Some(crypted);
        self.base.clear_paper_key();
        Ok(())
    }

    /// Decrypt the paper key into the plaintext mirror, keeping it
    /// readable across a later `lock`. Requires the store to be unlocked
    /// (or the mirror to already be populated).
    pub fn decrypt_paper_key(&self) -> KeystoreResult<()> {
        let inner = self.inner.lock();
        let paper_key = self.paper_key_locked(&inner)?;
        self.base.add_paper_key(paper_key.expose_secret())
    }

    /// Install an already-enveloped PIN code, replacing any existing
    /// ciphertext. Forces encrypted mode.
    pub fn add_crypted_pin_code(&self, crypted_pin_code: Vec<u8>) -> KeystoreResult<()> {
        let mut inner = self.inner.lock();
        self.set_crypted_locked(&mut inner)?;
        inner.crypted_pin_code = Some(crypted_pin_code);
        Ok(())
    }

    /// The enveloped PIN code, for persistence. Requires the store to be
    /// unlocked.
    pub fn get_crypted_pin_code(&self) -> KeystoreResult<Vec<u8>> {
        let inner = self.inner.lock();
        if Self::is_locked_inner(&inner) {
            return Err(KeystoreError::Locked);
        }
        inner
            .crypted_pin_code
            .clone()
            .ok_or(KeystoreError::Missing("PIN code"))
    }

    /// Re-envelope the current PIN code under `master_key` and wipe the
    /// plaintext mirror. Must run while unlocked.
    pub fn encrypt_pin_code(&self, master_key: &MasterKey) -> KeystoreResult<()> {
        let mut inner = self.inner.lock();
        if Self::is_locked_inner(&inner) {
            return Err(KeystoreError::Locked);
        }

        let pin_code = self.pin_code_locked(&inner)?;
        let crypted = envelope::encrypt_secret(
            master_key,
            pin_code.expose_secret().as_bytes(),
            &double_hash_of_str(PIN_CODE_LABEL),
        )?;
        inner.crypted_pin_code = Some(crypted);
        self.base.clear_pin_code();
        Ok(())
    }

    /// Decrypt the PIN code into the plaintext mirror. Requires the store
    /// to be unlocked (or the mirror to already be populated).
    pub fn decrypt_pin_code(&self) -> KeystoreResult<()> {
        let inner = self.inner.lock();
        let pin_code = self.pin_code_locked(&inner)?;
        self.base.add_pin_code(pin_code.expose_secret())
    }

    /// Register a status-changed listener, invoked after `lock` and after
    /// every successful `unlock`
    pub fn register_status_listener<F>(&self, callback: F) -> ListenerToken
    where
        F: Fn(&CryptoKeyStore) + Send + Sync + 'static,
    {
        self.notifier.register(Arc::new(callback))
    }

    /// Remove a previously registered listener
    pub fn unregister_status_listener(&self, token: ListenerToken) -> bool {
        self.notifier.unregister(token)
    }

    fn paper_key_locked(&self, inner: &CryptedInner) -> KeystoreResult<SecretString> {
        if let Ok(paper_key) = self.base.get_paper_key() {
            return Ok(paper_key);
        }
        if !inner.use_crypto {
            return Err(KeystoreError::Missing("paper key"));
        }
        Self::decrypt_named_secret(inner, &inner.crypted_paper_key, PAPER_KEY_LABEL, "paper key")
    }

    fn pin_code_locked(&self, inner: &CryptedInner) -> KeystoreResult<SecretString> {
        if let Ok(pin_code) = self.base.get_pin_code() {
            return Ok(pin_code);
        }
        if !inner.use_crypto {
            return Err(KeystoreError::Missing("PIN code"));
        }
        Self::decrypt_named_secret(inner, &inner.crypted_pin_code, PIN_CODE_LABEL, "PIN code")
    }

    fn decrypt_named_secret(
        inner: &CryptedInner,
        crypted: &Option<Vec<u8>>,
        label: &str,
        what: &'static str,
    ) -> KeystoreResult<SecretString> {
        let crypted = crypted.as_ref().ok_or(KeystoreError::Missing(what))?;
        let master_key = inner.master_key.as_ref().ok_or(KeystoreError::Locked)?;

        let plain = envelope::decrypt_secret(master_key, crypted, &double_hash_of_str(label))?;
        let text = std::str::from_utf8(plain.expose_secret()).map_err(|_| {
            KeystoreError::CipherFailure(format!("decrypted {what} is not valid UTF-8"))
        })?;
        Ok(SecretString::from(text.to_owned()))
    }
}

impl Default for CryptoKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyStore for CryptoKeyStore {
    fn add_key_pub_key(&self, key: Key, pub_key: PubKey) -> KeystoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.use_crypto {
            return self.base.add_key_pub_key(key, pub_key);
        }

        let crypted_secret = {
            let master_key = inner.master_key.as_ref().ok_or(KeystoreError::Locked)?;
            let secret = Zeroizing::new(key.to_bytes());
            envelope::encrypt_secret(master_key, secret.as_slice(), &pub_key.hash())?
        };
        inner
            .crypted_keys
            .insert(pub_key.key_id(), (pub_key, crypted_secret));
        Ok(())
    }

    fn have_key(&self, key_id: &KeyId) -> bool {
        let inner = self.inner.lock();
        if !inner.use_crypto {
            return self.base.have_key(key_id);
        }
        inner.crypted_keys.contains_key(key_id)
    }

    fn get_key(&self, key_id: &KeyId) -> KeystoreResult<Key> {
        let inner = self.inner.lock();
        if !inner.use_crypto {
            return self.base.get_key(key_id);
        }

        let (pub_key, crypted_secret) = inner
            .crypted_keys
            .get(key_id)
            .ok_or(KeystoreError::Missing("key"))?;
        let master_key = inner.master_key.as_ref().ok_or(KeystoreError::Locked)?;
        envelope::decrypt_key(master_key, crypted_secret, pub_key)
    }

    fn get_pub_key(&self, key_id: &KeyId) -> KeystoreResult<PubKey> {
        let inner = self.inner.lock();
        if !inner.use_crypto {
            return self.base.get_pub_key(key_id);
        }
        if let Some((pub_key, _)) = inner.crypted_keys.get(key_id) {
            return Ok(pub_key.clone());
        }
        // Watch-only public keys live in the basic store in either mode
        self.base.get_pub_key(key_id)
    }

    fn key_ids(&self) -> Vec<KeyId> {
        let inner = self.inner.lock();
        if !inner.use_crypto {
            return self.base.key_ids();
        }
        inner.crypted_keys.keys().copied().collect()
    }

    fn add_watch_only(&self, pub_key: PubKey) -> KeystoreResult<()> {
        let _inner = self.inner.lock();
        self.base.add_watch_only(pub_key)
    }

    fn add_paper_key(&self, paper_key: &str) -> KeystoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.use_crypto {
            return self.base.add_paper_key(paper_key);
        }

        let crypted = {
            let master_key = inner.master_key.as_ref().ok_or(KeystoreError::Locked)?;
            envelope::encrypt_secret(
                master_key,
                paper_key.as_bytes(),
                &double_hash_of_str(PAPER_KEY_LABEL),
            )?
        };
        inner.crypted_paper_key = Some(crypted);
        Ok(())
    }

    fn get_paper_key(&self) -> KeystoreResult<SecretString> {
        let inner = self.inner.lock();
        self.paper_key_locked(&inner)
    }

    fn add_pin_code(&self, pin_code: &str) -> KeystoreResult<()> {
        let mut inner = self.inner.lock();
        if !inner.use_crypto {
            return self.base.add_pin_code(pin_code);
        }

        let crypted = {
            let master_key = inner.master_key.as_ref().ok_or(KeystoreError::Locked)?;
            envelope::encrypt_secret(
                master_key,
                pin_code.as_bytes(),
                &double_hash_of_str(PIN_CODE_LABEL),
            )?
        };
        inner.crypted_pin_code = Some(crypted);
        Ok(())
    }

    fn get_pin_code(&self) -> KeystoreResult<SecretString> {
        let inner = self.inner.lock();
        self.pin_code_locked(&inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::KEY_SIZE;

    fn master_key(byte: u8) -> MasterKey {
        MasterKey::new([byte; KEY_SIZE])
    }

    fn test_key() -> (Key, PubKey) {
        let key = Key::generate(&mut rand::thread_rng(), true);
        let pub_key = key.pub_key();
        (key, pub_key)
    }

    #[test]
    fn test_new_store_is_plaintext() {
        let store = CryptoKeyStore::new();
        assert!(!store.is_crypted());
        assert!(!store.is_locked());
    }

    #[test]
    fn test_set_crypted_refuses_with_plaintext_keys() {
        let store = CryptoKeyStore::new();
        let (key, pub_key) = test_key();
        store.add_key_pub_key(key, pub_key).unwrap();

        assert!(matches!(
            store.set_crypted(),
            Err(KeystoreError::ModeViolation(_))
        ));
        assert!(!store.is_crypted());
    }

    #[test]
    fn test_set_crypted_idempotent_on_empty_store() {
        let store = CryptoKeyStore::new();
        store.set_crypted().unwrap();
        store.set_crypted().unwrap();
        assert!(store.is_crypted());
        // No master key was ever present
        assert!(store.is_locked());
    }

    #[test]
    fn test_plaintext_mode_delegates_to_basic_store() {
        let store = CryptoKeyStore::new();
        let (key, pub_key) = test_key();
        let key_id = pub_key.key_id();

        store.add_key_pub_key(key.clone(), pub_key.clone()).unwrap();
        assert!(store.have_key(&key_id));
        assert_eq!(store.get_key(&key_id).unwrap().to_bytes(), key.to_bytes());
        assert_eq!(store.get_pub_key(&key_id).unwrap(), pub_key);
        assert_eq!(store.key_ids(), vec![key_id]);
    }

    #[test]
    fn test_watch_only_fallback_when_crypted() {
        let store = CryptoKeyStore::new();
        let (_, watch_pub_key) = test_key();
        let watch_id = watch_pub_key.key_id();

        store.add_watch_only(watch_pub_key.clone()).unwrap();
        store.set_crypted().unwrap();

        assert_eq!(store.get_pub_key(&watch_id).unwrap(), watch_pub_key);
        assert!(store.get_key(&watch_id).is_err());
    }

    #[test]
    fn test_unlock_empty_store_fails() {
        let store = CryptoKeyStore::new();
        store.set_crypted().unwrap();
        assert!(matches!(
            store.unlock(master_key(0x11)),
            Err(KeystoreError::WrongPassphrase)
        ));
        assert!(store.is_locked());
    }

    #[test]
    fn test_add_crypted_key_forces_crypted_mode() {
        let store = CryptoKeyStore::new();
        let (key, pub_key) = test_key();
        let crypted =
            envelope::encrypt_secret(&master_key(0x11), &key.to_bytes(), &pub_key.hash()).unwrap();

        store.add_crypted_key(pub_key.clone(), crypted).unwrap();
        assert!(store.is_crypted());
        assert!(store.have_key(&pub_key.key_id()));

        store.unlock(master_key(0x11)).unwrap();
        assert_eq!(
            store.get_key(&pub_key.key_id()).unwrap().to_bytes(),
            key.to_bytes()
        );
    }

    #[test]
    fn test_crypted_key_records_roundtrip() {
        let store = CryptoKeyStore::new();
        let (key, pub_key) = test_key();
        store.add_key_pub_key(key, pub_key.clone()).unwrap();
        store.encrypt_keys(master_key(0x11)).unwrap();

        let records = store.crypted_key_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, pub_key);

        // A second store loaded from the records behaves identically
        let restored = CryptoKeyStore::new();
        for (pub_key, crypted_secret) in records {
            restored.add_crypted_key(pub_key, crypted_secret).unwrap();
        }
        restored.unlock(master_key(0x11)).unwrap();
        assert!(restored.have_key(&pub_key.key_id()));
    }
}
