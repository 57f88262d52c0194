use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use der::{Decode, Encode};
use ksmgmt_key::{Error as KeyError, KeyFlags, KeyPairProvider};
use p12_keystore::{error::Error as P12Error, KeyStore, KeyStoreEntry, PrivateKeyChain};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{
    AddDisposition, CertContext, CertProperty, CertStore, CryptoBackend, KeyProviderInfo,
    PfxImportFlags,
};
use crate::{
    cert::{backend_serial, normalize_backend_serial, parse_certificate},
    error::{codes, BackendError, BackendResult},
    name::format_name,
};

struct Entry {
    context: CertContext,
    issuer_der: Vec<u8>,
    serial_le: Vec<u8>,
}

impl Entry {
    fn new(context: CertContext) -> BackendResult<Self> {
        let issuer_der = context
            .certificate
            .tbs_certificate
            .issuer
            .to_der()
            .map_err(|e| BackendError::bad_encode(format!("Failed to encode issuer: {}", e)))?;
        let serial = backend_serial(&context.certificate);
        let serial_le = normalize_backend_serial(&serial).to_vec();

        Ok(Self {
            context,
            issuer_der,
            serial_le,
        })
    }

    fn matches(&self, issuer_der: &[u8], serial_le: &[u8]) -> bool {
        self.issuer_der == issuer_der && self.serial_le == normalize_backend_serial(serial_le)
    }
}

#[derive(Default)]
struct Entries {
    entries: Vec<Entry>,
    next_id: u64,
}

impl Entries {
    fn add(&mut self, mut entry: Entry, disposition: AddDisposition) -> BackendResult<CertContext> {
        let existing = self
            .entries
            .iter()
            .position(|e| e.matches(&entry.issuer_der, &entry.serial_le));

        match (existing, disposition) {
            (Some(index), AddDisposition::UseExisting) => {
                return Ok(self.entries[index].context.clone());
            }
            (Some(_), AddDisposition::New) => {
                return Err(BackendError::new(
                    codes::CRYPT_E_EXISTS,
                    "Certificate already exists in the store",
                ));
            }
            (Some(index), AddDisposition::ReplaceExisting) => {
                self.entries.remove(index);
            }
            _ => {}
        }

        self.next_id += 1;
        entry.context.id = self.next_id;
        let context = entry.context.clone();
        self.entries.push(entry);
        Ok(context)
    }

    fn get_mut(&mut self, id: u64) -> BackendResult<&mut Entry> {
        self.entries
            .iter_mut()
            .find(|e| e.context.id == id)
            .ok_or_else(|| BackendError::not_found("Certificate is no longer in the store"))
    }
}

/// Type alias for shared store contents
type SharedEntries = Arc<RwLock<Entries>>;

fn lock_poisoned() -> BackendError {
    BackendError::new(codes::NTE_FAIL, "Certificate store lock poisoned")
}

/// Handle to a software certificate store
pub struct SoftwareCertStore {
    name: String,
    entries: Option<SharedEntries>,
}

impl SoftwareCertStore {
    fn new(name: impl Into<String>, entries: SharedEntries) -> Self {
        Self {
            name: name.into(),
            entries: Some(entries),
        }
    }

    fn memory() -> Self {
        Self::new("memory", SharedEntries::default())
    }

    fn shared(&self) -> BackendResult<&SharedEntries> {
        self.entries.as_ref().ok_or_else(BackendError::closed)
    }

    fn add(&mut self, context: CertContext, disposition: AddDisposition) -> BackendResult<CertContext> {
        let entry = Entry::new(context)?;
        let mut entries = self.shared()?.write().map_err(|_| lock_poisoned())?;
        entries.add(entry, disposition)
    }
}

impl CertStore for SoftwareCertStore {
    fn add_encoded_certificate(
        &mut self,
        der: &[u8],
        disposition: AddDisposition,
    ) -> BackendResult<CertContext> {
        let certificate = parse_certificate(der)?;
        let context = CertContext {
            id: 0,
            der: der.to_vec(),
            certificate,
            key_provider: None,
            key_handle: None,
        };
        self.add(context, disposition)
    }

    fn add_certificate_context(
        &mut self,
        context: &CertContext,
        disposition: AddDisposition,
    ) -> BackendResult<CertContext> {
        self.add(context.clone(), disposition)
    }

    fn set_property(
        &mut self,
        context: &CertContext,
        property: CertProperty,
    ) -> BackendResult<()> {
        let mut entries = self.shared()?.write().map_err(|_| lock_poisoned())?;
        let entry = entries.get_mut(context.id)?;

        match property {
            CertProperty::KeyProviderInfo(info) => entry.context.key_provider = Some(info),
            CertProperty::KeyHandle(handle) => entry.context.key_handle = Some(handle),
        }
        Ok(())
    }

    fn find_by_issuer_and_serial(
        &self,
        issuer_der: &[u8],
        serial_le: &[u8],
    ) -> BackendResult<CertContext> {
        let entries = self.shared()?.read().map_err(|_| lock_poisoned())?;

        entries
            .entries
            .iter()
            .find(|e| e.matches(issuer_der, serial_le))
            .map(|e| e.context.clone())
            .ok_or_else(|| BackendError::not_found("Cannot find object or property"))
    }

    fn enumerate(&self) -> BackendResult<Vec<CertContext>> {
        let entries = self.shared()?.read().map_err(|_| lock_poisoned())?;
        Ok(entries.entries.iter().map(|e| e.context.clone()).collect())
    }

    fn remove(&mut self, context: &CertContext) -> BackendResult<()> {
        let mut entries = self.shared()?.write().map_err(|_| lock_poisoned())?;

        let before = entries.entries.len();
        entries.entries.retain(|e| e.context.id != context.id);
        if entries.entries.len() == before {
            return Err(BackendError::not_found("Certificate is not in the store"));
        }
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        self.entries.take().ok_or_else(BackendError::closed)?;
        debug!(store = %self.name, "closed certificate store");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.entries.is_some()
    }
}

/// In-process backend
///
/// System stores are kept by name for the lifetime of the backend, so every
/// handle opened on "MY" sees the same entries. PKCS#12 packing uses the
/// key pair provider for private keys.
pub struct SoftwareBackend {
    keys: Arc<dyn KeyPairProvider>,
    system_stores: Mutex<HashMap<String, SharedEntries>>,
}

impl SoftwareBackend {
    pub fn new(keys: Arc<dyn KeyPairProvider>) -> Self {
        Self {
            keys,
            system_stores: Mutex::new(HashMap::new()),
        }
    }

    /// Private key of a store entry, when it resolves and may be exported
    fn exportable_key(&self, context: &CertContext) -> BackendResult<Option<Vec<u8>>> {
        let Some(info) = context.key_provider_info() else {
            return Ok(None);
        };
        if info.provider_name != self.keys.provider_name() {
            warn!(provider = %info.provider_name, "key provider not available, exporting certificate only");
            return Ok(None);
        }

        let key = match self.keys.open_key_pair(&info.container_name) {
            Ok(key) => key,
            Err(e) => {
                warn!(key = %info.container_name, error = %e, "linked key not found, exporting certificate only");
                return Ok(None);
            }
        };

        match self.keys.export_pkcs8_der(&key) {
            Ok(der) => Ok(Some(der)),
            Err(KeyError::NotExportable(name)) => {
                warn!(key = %name, "key is not exportable, exporting certificate only");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn unpack(
        &self,
        keystore: &KeyStore,
        flags: PfxImportFlags,
        imported_keys: &mut Vec<String>,
    ) -> BackendResult<SoftwareCertStore> {
        let mut store = SoftwareCertStore::memory();
        let key_flags = KeyFlags {
            exportable: flags.exportable,
            user_protected: flags.user_protected,
        };

        for (alias, entry) in keystore.entries() {
            match entry {
                KeyStoreEntry::PrivateKeyChain(chain) => {
                    let mut certs = chain.chain().iter();
                    let Some(entity) = certs.next() else {
                        warn!(alias = %alias, "private key without certificate skipped");
                        continue;
                    };

                    let context =
                        store.add_encoded_certificate(entity.as_der(), AddDisposition::UseExisting)?;

                    let container_name = uuid::Uuid::new_v4().to_string();
                    let key = self
                        .keys
                        .import_pkcs8_der(&container_name, chain.key(), key_flags)?;
                    imported_keys.push(container_name.clone());

                    store.set_property(
                        &context,
                        CertProperty::KeyProviderInfo(KeyProviderInfo {
                            provider_name: self.keys.provider_name().to_string(),
                            container_name,
                        }),
                    )?;
                    store.set_property(&context, CertProperty::KeyHandle(key.handle()))?;

                    for cert in certs {
                        store.add_encoded_certificate(cert.as_der(), AddDisposition::UseExisting)?;
                    }
                }
                KeyStoreEntry::Certificate(cert) => {
                    store.add_encoded_certificate(cert.as_der(), AddDisposition::UseExisting)?;
                }
                #[allow(unreachable_patterns)]
                _ => debug!(alias = %alias, "unsupported PKCS#12 entry skipped"),
            }
        }

        Ok(store)
    }
}

impl CryptoBackend for SoftwareBackend {
    fn open_system_store(&self, name: &str) -> BackendResult<Box<dyn CertStore>> {
        if name.trim().is_empty() {
            return Err(BackendError::new(
                codes::ERROR_FILE_NOT_FOUND,
                "Store name must not be empty",
            ));
        }

        let mut stores = self.system_stores.lock().map_err(|_| lock_poisoned())?;
        let entries = stores.entry(name.to_ascii_uppercase()).or_default().clone();

        debug!(store = name, "opened system store");
        Ok(Box::new(SoftwareCertStore::new(name, entries)))
    }

    fn open_memory_store(&self) -> BackendResult<Box<dyn CertStore>> {
        Ok(Box::new(SoftwareCertStore::memory()))
    }

    fn pfx_export(
        &self,
        store: &dyn CertStore,
        password: &str,
        export_private_keys: bool,
    ) -> BackendResult<Vec<u8>> {
        let contexts = store.enumerate()?;
        if contexts.is_empty() {
            return Err(BackendError::not_found("No certificates to export"));
        }

        let mut keystore = KeyStore::new();
        for (index, context) in contexts.iter().enumerate() {
            let cert = p12_keystore::Certificate::from_der(context.der()).map_err(|e| {
                BackendError::bad_encode(format!("Failed to load certificate: {}", e))
            })?;

            let mut alias = format_name(&context.certificate().tbs_certificate.subject);
            if keystore.entries().any(|(existing, _)| *existing == alias) {
                alias = format!("{} ({})", alias, index + 1);
            }

            let key = if export_private_keys {
                self.exportable_key(context)?
            } else {
                None
            };

            let entry = match key {
                Some(key_der) => {
                    let local_key_id = Sha256::digest(context.der());
                    KeyStoreEntry::PrivateKeyChain(PrivateKeyChain::new(
                        &key_der,
                        &local_key_id[..20],
                        vec![cert],
                    ))
                }
                None => KeyStoreEntry::Certificate(cert),
            };
            keystore.add_entry(&alias, entry);
        }

        keystore
            .writer(password)
            .write()
            .map_err(|e| BackendError::bad_encode(format!("Failed to create PKCS#12: {}", e)))
    }

    fn pfx_import(
        &self,
        pfx: &[u8],
        password: &str,
        flags: PfxImportFlags,
    ) -> BackendResult<Box<dyn CertStore>> {
        der::Any::from_der(pfx).map_err(|e| {
            BackendError::new(
                codes::CRYPT_E_ASN1_BADTAG,
                format!("Input is not a PKCS#12 structure: {}", e),
            )
        })?;

        let keystore = KeyStore::from_pkcs12(pfx, password).map_err(|e| match e {
            P12Error::MacError(_) => BackendError::new(
                codes::ERROR_INVALID_PASSWORD,
                format!("PKCS#12 integrity check failed: {}", e),
            ),
            other => BackendError::bad_encode(format!("Corrupt PKCS#12 content: {}", other)),
        })?;

        let mut imported_keys = Vec::new();
        match self.unpack(&keystore, flags, &mut imported_keys) {
            Ok(store) => Ok(Box::new(store)),
            Err(e) => {
                for name in imported_keys {
                    if let Err(err) = self.keys.delete_key_pair(&name) {
                        warn!(key = %name, error = %err, "failed to remove imported key");
                    }
                }
                Err(e)
            }
        }
    }
}
