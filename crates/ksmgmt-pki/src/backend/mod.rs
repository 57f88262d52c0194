//! Certificate store backend capability
//!
//! The store manager only talks to certificate storage through these
//! traits. A backend owns the persistent stores, hands out [`CertStore`]
//! handles and packs/unpacks PKCS#12 containers.

pub mod software;

use std::ops::{Deref, DerefMut};

use ksmgmt_key::KeyHandle;
use serde::{Deserialize, Serialize};
use tracing::warn;
use x509_cert::Certificate;

use crate::error::BackendResult;

pub use software::SoftwareBackend;

/// Behaviour when an added certificate already exists in the store
///
/// Identity is the encoded issuer name plus the serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddDisposition {
    /// Add a new entry even if one with the same identity exists
    Always,
    /// Replace an existing entry, dropping its properties
    ReplaceExisting,
    /// Keep and return an existing entry
    UseExisting,
    /// Fail with `CRYPT_E_EXISTS` if an entry exists
    New,
}

/// Link between a certificate entry and a provider-held private key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyProviderInfo {
    pub provider_name: String,
    pub container_name: String,
}

/// Settable entry properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertProperty {
    KeyProviderInfo(KeyProviderInfo),
    KeyHandle(KeyHandle),
}

/// Snapshot of one store entry
///
/// The context refers back to its entry by id; property changes go through
/// [`CertStore::set_property`].
#[derive(Debug, Clone)]
pub struct CertContext {
    pub(crate) id: u64,
    pub(crate) der: Vec<u8>,
    pub(crate) certificate: Certificate,
    pub(crate) key_provider: Option<KeyProviderInfo>,
    pub(crate) key_handle: Option<KeyHandle>,
}

impl CertContext {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// DER encoding of the certificate
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn key_provider_info(&self) -> Option<&KeyProviderInfo> {
        self.key_provider.as_ref()
    }

    pub fn key_handle(&self) -> Option<KeyHandle> {
        self.key_handle
    }
}

/// Flags applied to keys unpacked from a PKCS#12 container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PfxImportFlags {
    /// Imported keys may be exported again
    pub exportable: bool,
    /// Keys go to the user key set rather than the machine one
    pub user_keyset: bool,
    /// Keys always go to the key storage provider, never a legacy CSP
    pub always_cng: bool,
    /// Every use of an imported key requires a PIN or password
    pub user_protected: bool,
}

impl PfxImportFlags {
    /// Exportable, user key set, key storage provider; optionally protected
    pub fn for_import(force_pin_protection: bool) -> Self {
        Self {
            exportable: true,
            user_keyset: true,
            always_cng: true,
            user_protected: force_pin_protection,
        }
    }
}

/// One open certificate store handle
pub trait CertStore: Send {
    /// Add a DER certificate
    fn add_encoded_certificate(
        &mut self,
        der: &[u8],
        disposition: AddDisposition,
    ) -> BackendResult<CertContext>;

    /// Copy an entry, with its properties, from another store
    fn add_certificate_context(
        &mut self,
        context: &CertContext,
        disposition: AddDisposition,
    ) -> BackendResult<CertContext>;

    fn set_property(&mut self, context: &CertContext, property: CertProperty)
        -> BackendResult<()>;

    /// Find the entry issued by `issuer_der` with serial `serial_le`
    ///
    /// The serial is in little-endian order. Issuer names are compared on
    /// their encoded bytes, so UTF8String and PrintableString renditions of
    /// the same name do not match each other.
    fn find_by_issuer_and_serial(
        &self,
        issuer_der: &[u8],
        serial_le: &[u8],
    ) -> BackendResult<CertContext>;

    fn enumerate(&self) -> BackendResult<Vec<CertContext>>;

    fn remove(&mut self, context: &CertContext) -> BackendResult<()>;

    fn close(&mut self) -> BackendResult<()>;

    fn is_open(&self) -> bool;
}

/// Store factory and PKCS#12 packer
pub trait CryptoBackend: Send + Sync {
    /// Open (creating on first use) a persistent store by name
    fn open_system_store(&self, name: &str) -> BackendResult<Box<dyn CertStore>>;

    /// Open an empty store that lives as long as its handle
    fn open_memory_store(&self) -> BackendResult<Box<dyn CertStore>>;

    /// Pack every entry of `store` into a password protected PKCS#12 blob
    fn pfx_export(
        &self,
        store: &dyn CertStore,
        password: &str,
        export_private_keys: bool,
    ) -> BackendResult<Vec<u8>>;

    /// Unpack a PKCS#12 blob into a fresh memory store
    fn pfx_import(
        &self,
        pfx: &[u8],
        password: &str,
        flags: PfxImportFlags,
    ) -> BackendResult<Box<dyn CertStore>>;
}

/// Store handle that is closed when dropped
pub struct ScopedStore {
    label: String,
    inner: Box<dyn CertStore>,
}

impl ScopedStore {
    pub fn new(label: impl Into<String>, inner: Box<dyn CertStore>) -> Self {
        Self {
            label: label.into(),
            inner,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Deref for ScopedStore {
    type Target = dyn CertStore;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl DerefMut for ScopedStore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for ScopedStore {
    fn drop(&mut self) {
        if self.inner.is_open() {
            if let Err(e) = self.inner.close() {
                warn!(store = %self.label, error = %e, "failed to close certificate store");
            }
        }
    }
}
