use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use tracing::debug;

use super::DEFAULT_PROVIDER_NAME;
use crate::{
    error::{Error, Result},
    key::RsaKey,
    provider::{KeyPair, KeyPairProvider},
    types::{KeyFlags, KeyHandle},
};

struct StoredKey {
    handle: KeyHandle,
    key: RsaKey,
    spki_der: Vec<u8>,
    flags: KeyFlags,
}

impl StoredKey {
    fn key_pair(&self, name: &str) -> KeyPair {
        KeyPair::new(self.handle, name.to_string(), self.spki_der.clone(), self.flags)
    }
}

/// Type alias for the key storage map
type KeyStorage = Arc<RwLock<HashMap<String, StoredKey>>>;

/// In-memory software key storage provider
///
/// Keys are RSA key pairs indexed by container name. Clones share the same
/// storage, so a provider handed to a backend and to a store manager sees
/// the same keys.
#[derive(Clone)]
pub struct MemoryKeyPairProvider {
    name: String,
    keys: KeyStorage,
    next_handle: Arc<AtomicU64>,
}

impl MemoryKeyPairProvider {
    pub fn new() -> Self {
        Self::with_name(DEFAULT_PROVIDER_NAME)
    }

    /// Create a provider that reports a custom provider name
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keys: Arc::new(RwLock::new(HashMap::new())),
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Container names of all stored keys, sorted
    pub fn key_names(&self) -> Result<Vec<String>> {
        let keys = self
            .keys
            .read()
            .map_err(|_| Error::lock_error("Failed to acquire read lock"))?;

        let mut names: Vec<String> = keys.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn len(&self) -> usize {
        self.keys.read().map(|keys| keys.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, name: &str, key: RsaKey, flags: KeyFlags) -> Result<KeyPair> {
        let spki_der = key.to_spki_der()?;

        let mut keys = self
            .keys
            .write()
            .map_err(|_| Error::lock_error("Failed to acquire write lock"))?;

        if keys.contains_key(name) {
            return Err(Error::key_exists(name));
        }

        let stored = StoredKey {
            handle: KeyHandle(self.next_handle.fetch_add(1, Ordering::Relaxed)),
            key,
            spki_der,
            flags,
        };
        let key_pair = stored.key_pair(name);
        keys.insert(name.to_string(), stored);
        Ok(key_pair)
    }

    fn with_key<T>(&self, key: &KeyPair, f: impl FnOnce(&StoredKey) -> Result<T>) -> Result<T> {
        let keys = self
            .keys
            .read()
            .map_err(|_| Error::lock_error("Failed to acquire read lock"))?;

        match keys.get(key.name()) {
            Some(stored) if stored.handle == key.handle() => f(stored),
            _ => Err(Error::key_not_found(key.name())),
        }
    }
}

impl Default for MemoryKeyPairProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyPairProvider for MemoryKeyPairProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    fn generate_key_pair(
        &self,
        name: &str,
        bit_length: usize,
        force_pin_protection: bool,
    ) -> Result<KeyPair> {
        if name.is_empty() {
            return Err(Error::KeyError("Key name must not be empty".to_string()));
        }
        if self.open_key_pair(name).is_ok() {
            return Err(Error::key_exists(name));
        }

        let key = RsaKey::generate(bit_length)?;
        let flags = KeyFlags::exportable().with_user_protection(force_pin_protection);
        let key_pair = self.insert(name, key, flags)?;

        debug!(
            key = name,
            bits = bit_length,
            user_protected = force_pin_protection,
            "generated key pair"
        );
        Ok(key_pair)
    }

    fn get_key_pair(&self, spki_der: &[u8]) -> Result<Option<KeyPair>> {
        let keys = self
            .keys
            .read()
            .map_err(|_| Error::lock_error("Failed to acquire read lock"))?;

        Ok(keys
            .iter()
            .find(|(_, stored)| stored.spki_der == spki_der)
            .map(|(name, stored)| stored.key_pair(name)))
    }

    fn open_key_pair(&self, name: &str) -> Result<KeyPair> {
        let keys = self
            .keys
            .read()
            .map_err(|_| Error::lock_error("Failed to acquire read lock"))?;

        keys.get(name)
            .map(|stored| stored.key_pair(name))
            .ok_or_else(|| Error::key_not_found(name))
    }

    fn delete_key_pair(&self, name: &str) -> Result<()> {
        let mut keys = self
            .keys
            .write()
            .map_err(|_| Error::lock_error("Failed to acquire write lock"))?;

        keys.remove(name)
            .ok_or_else(|| Error::key_not_found(name))
            .map(|_| ())?;

        debug!(key = name, "deleted key pair");
        Ok(())
    }

    fn sign(&self, key: &KeyPair, message: &[u8]) -> Result<Vec<u8>> {
        self.with_key(key, |stored| stored.key.sign(message))
    }

    fn export_pkcs8_der(&self, key: &KeyPair) -> Result<Vec<u8>> {
        self.with_key(key, |stored| {
            if !stored.flags.exportable {
                return Err(Error::not_exportable(key.name()));
            }
            stored.key.to_pkcs8_der()
        })
    }

    fn import_pkcs8_der(&self, name: &str, der: &[u8], flags: KeyFlags) -> Result<KeyPair> {
        let key = RsaKey::from_pkcs8_der(der)?;
        let bits = key.size_bits();
        let key_pair = self.insert(name, key, flags)?;

        debug!(key = name, bits, exportable = flags.exportable, "imported key pair");
        Ok(key_pair)
    }
}
