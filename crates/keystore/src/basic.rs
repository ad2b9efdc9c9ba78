//! Plaintext key store
//!
//! Holds full private keys, watch-only public keys, and the plaintext
//! paper-key and PIN-code mirrors. The encrypted store owns one of these
//! and forwards to it while encryption has not been enabled; it can also
//! be used on its own for wallets that never encrypt.
//!
//! All operations are thread-safe behind a single `parking_lot::Mutex`.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use secrecy::ExposeSecret;

use crate::error::{KeystoreError, KeystoreResult};
use crate::KeyStore;
use coinvault_crypto::secure::SecretString;
use coinvault_crypto::{Key, KeyId, PubKey};

#[derive(Default)]
struct BasicInner {
    /// Full key pairs indexed by key id
    keys: BTreeMap<KeyId, (Key, PubKey)>,
    /// Watch-only public keys (no private material held)
    watch_keys: BTreeMap<KeyId, PubKey>,
    /// Plaintext paper-key mirror
    paper_key: Option<SecretString>,
    /// Plaintext PIN-code mirror
    pin_code: Option<SecretString>,
}

/// Thread-safe plaintext key store
#[derive(Default)]
pub struct BasicKeyStore {
    inner: Mutex<BasicInner>,
}

impl BasicKeyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any private keys are held
    pub(crate) fn has_keys(&self) -> bool {
        !self.inner.lock().keys.is_empty()
    }

    /// Copy out every stored key pair (used by the one-shot migration to
    /// encrypted storage; the copies are wiped when dropped)
    pub(crate) fn keys_snapshot(&self) -> Vec<(KeyId, Key, PubKey)> {
        self.inner
            .lock()
            .keys
            .iter()
            .map(|(key_id, (key, pub_key))| (*key_id, key.clone(), pub_key.clone()))
            .collect()
    }

    /// Drop every stored private key
    pub(crate) fn clear_keys(&self) {
        self.inner.lock().keys.clear();
    }

    /// Drop the plaintext paper-key mirror
    pub(crate) fn clear_paper_key(&self) {
        self.inner.lock().paper_key = None;
    }

    /// Drop the plaintext PIN-code mirror
    pub(crate) fn clear_pin_code(&self) {
        self.inner.lock().pin_code = None;
    }
}

impl KeyStore for BasicKeyStore {
    fn add_key_pub_key(&self, key: Key, pub_key: PubKey) -> KeystoreResult<()> {
        let mut inner = self.inner.lock();
        inner.keys.insert(pub_key.key_id(), (key, pub_key));
        Ok(())
    }

    fn have_key(&self, key_id: &KeyId) -> bool {
        self.inner.lock().keys.contains_key(key_id)
    }

    fn get_key(&self, key_id: &KeyId) -> KeystoreResult<Key> {
        self.inner
            .lock()
            .keys
            .get(key_id)
            .map(|(key, _)| key.clone())
            .ok_or(KeystoreError::Missing("key"))
    }

    fn get_pub_key(&self, key_id: &KeyId) -> KeystoreResult<PubKey> {
        let inner = self.inner.lock();
        if let Some((_, pub_key)) = inner.keys.get(key_id) {
            return Ok(pub_key.clone());
        }
        inner
            .watch_keys
            .get(key_id)
            .cloned()
            .ok_or(KeystoreError::Missing("key"))
    }

    fn key_ids(&self) -> Vec<KeyId> {
        self.inner.lock().keys.keys().copied().collect()
    }

    fn add_watch_only(&self, pub_key: PubKey) -> KeystoreResult<()> {
        let mut inner = self.inner.lock();
        inner.watch_keys.insert(pub_key.key_id(), pub_key);
        Ok(())
    }

    fn add_paper_key(&self, paper_key: &str) -> KeystoreResult<()> {
        self.inner.lock().paper_key = Some(SecretString::from(paper_key.to_owned()));
        Ok(())
    }

    fn get_paper_key(&self) -> KeystoreResult<SecretString> {
        self.inner
            .lock()
            .paper_key
            .as_ref()
            .map(|mirror| SecretString::from(mirror.expose_secret().to_owned()))
            .ok_or(KeystoreError::Missing("paper key"))
    }

    fn add_pin_code(&self, pin_code: &str) -> KeystoreResult<()> {
        self.inner.lock().pin_code = Some(SecretString::from(pin_code.to_owned()));
        Ok(())
    }

    fn get_pin_code(&self) -> KeystoreResult<SecretString> {
        self.inner
            .lock()
            .pin_code
            .as_ref()
            .map(|mirror| SecretString::from(mirror.expose_secret().to_owned()))
            .ok_or(KeystoreError::Missing("PIN code"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> (Key, PubKey) {
        let key = Key::generate(&mut rand::thread_rng(), true);
        let pub_key = key.pub_key();
        (key, pub_key)
    }

    #[test]
    fn test_add_and_get_key() {
        let store = BasicKeyStore::new();
        let (key, pub_key) = test_key();
        let key_id = pub_key.key_id();

        assert!(!store.have_key(&key_id));
        store.add_key_pub_key(key.clone(), pub_key.clone()).unwrap();

        assert!(store.have_key(&key_id));
        assert_eq!(store.get_key(&key_id).unwrap().to_bytes(), key.to_bytes());
        assert_eq!(store.get_pub_key(&key_id).unwrap(), pub_key);
        assert_eq!(store.key_ids(), vec![key_id]);
    }

    #[test]
    fn test_missing_key() {
        let store = BasicKeyStore::new();
        let (_, pub_key) = test_key();
        assert!(matches!(
            store.get_key(&pub_key.key_id()),
            Err(KeystoreError::Missing(_))
        ));
    }

    #[test]
    fn test_watch_only_pub_key() {
        let store = BasicKeyStore::new();
        let (_, pub_key) = test_key();
        let key_id = pub_key.key_id();

        store.add_watch_only(pub_key.clone()).unwrap();

        // Public key is visible, private key is not
        assert_eq!(store.get_pub_key(&key_id).unwrap(), pub_key);
        assert!(!store.have_key(&key_id));
        assert!(store.get_key(&key_id).is_err());
    }

    #[test]
    fn test_paper_key_and_pin_code_mirrors() {
        use secrecy::ExposeSecret;

        let store = BasicKeyStore::new();
        assert!(store.get_paper_key().is_err());
        assert!(store.get_pin_code().is_err());

        store.add_paper_key("abandon ability able").unwrap();
        store.add_pin_code("1234").unwrap();

        assert_eq!(
            store.get_paper_key().unwrap().expose_secret(),
            "abandon ability able"
        );
        assert_eq!(store.get_pin_code().unwrap().expose_secret(), "1234");

        // Overwrite is allowed
        store.add_pin_code("5678").unwrap();
        assert_eq!(store.get_pin_code().unwrap().expose_secret(), "5678");
    }

    #[test]
    fn test_add_key_via_trait_helper() {
        let store = BasicKeyStore::new();
        let (key, pub_key) = test_key();
        store.add_key(key).unwrap();
        assert!(store.have_key(&pub_key.key_id()));
    }
}
