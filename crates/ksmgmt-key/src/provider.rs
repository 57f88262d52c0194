// provider.rs
use crate::{
    error::Result,
    types::{KeyFlags, KeyHandle},
};

/// A key pair living inside a [`KeyPairProvider`]
///
/// The struct is a reference to provider-owned material: it carries the
/// handle, the container name and the public key, never the private key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPair {
    handle: KeyHandle,
    name: String,
    public_key_info: Vec<u8>,
    flags: KeyFlags,
}

impl KeyPair {
    pub fn new(handle: KeyHandle, name: String, public_key_info: Vec<u8>, flags: KeyFlags) -> Self {
        Self {
            handle,
            name,
            public_key_info,
            flags,
        }
    }

    pub fn handle(&self) -> KeyHandle {
        self.handle
    }

    /// Container name the key is registered under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// SubjectPublicKeyInfo, DER encoded
    pub fn public_key_info(&self) -> &[u8] {
        &self.public_key_info
    }

    pub fn flags(&self) -> KeyFlags {
        self.flags
    }
}

pub trait KeyPairProvider: Send + Sync {
    /// Name recorded in certificate key-provider linkage
    fn provider_name(&self) -> &str;

    fn generate_key_pair(
        &self,
        name: &str,
        bit_length: usize,
        force_pin_protection: bool,
    ) -> Result<KeyPair>;

    /// Find the key pair whose public key equals `spki_der`
    fn get_key_pair(&self, spki_der: &[u8]) -> Result<Option<KeyPair>>;

    fn open_key_pair(&self, name: &str) -> Result<KeyPair>;

    fn delete_key_pair(&self, name: &str) -> Result<()>;

    /// RSASSA-PKCS1-v1_5 with SHA-256
    fn sign(&self, key: &KeyPair, message: &[u8]) -> Result<Vec<u8>>;

    fn export_pkcs8_der(&self, key: &KeyPair) -> Result<Vec<u8>>;

    fn import_pkcs8_der(&self, name: &str, der: &[u8], flags: KeyFlags) -> Result<KeyPair>;
}
