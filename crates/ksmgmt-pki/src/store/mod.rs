//! Certificate store manager
//!
//! Ties the key pair provider, the name encoder and a certificate store
//! backend together: request creation with key rollback, certificate
//! import with key linkage, PKCS#12 export and import, and the key
//! protection policy.

mod key_id;

use std::sync::Arc;

use der::Encode;
use ksmgmt_key::{KeyPair, KeyPairProvider};
use tracing::{debug, error, info, warn};

use crate::{
    backend::{
        AddDisposition, CertContext, CertProperty, CryptoBackend, KeyProviderInfo,
        PfxImportFlags, ScopedStore,
    },
    cert::{is_ca_certificate, parse_serial_hex, to_backend_order, CertificateInfo},
    config::StoreConfig,
    csr,
    encoding::{self, Framing},
    error::{codes, BackendError, CryptoResultExt, PkiError, Result},
    name::{NameEncoder, NameStringMode, X509NameEncoder},
    policy::{KeyProtectionLevel, PolicyEnforcer, SettingsStore},
};

pub use key_id::{KeyIdGenerator, RandomKeyIdGenerator, UuidOutcome};

/// Deletes a freshly generated key pair unless committed
struct KeyPairGuard<'a> {
    keys: &'a dyn KeyPairProvider,
    name: String,
    armed: bool,
}

impl<'a> KeyPairGuard<'a> {
    fn new(keys: &'a dyn KeyPairProvider, key_pair: &KeyPair) -> Self {
        Self {
            keys,
            name: key_pair.name().to_string(),
            armed: true,
        }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for KeyPairGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.keys.delete_key_pair(&self.name) {
            Ok(()) => warn!(key = %self.name, "deleted key pair of failed certificate request"),
            Err(e) => error!(key = %self.name, error = %e, "failed to delete orphaned key pair"),
        }
    }
}

/// Manager over one open certificate store
///
/// The store handle is opened in [`CertificateStore::open`] and closed when
/// the manager is dropped. A manager is not meant to be shared between
/// threads without external synchronisation; every mutating operation takes
/// `&mut self`.
pub struct CertificateStore {
    backend: Arc<dyn CryptoBackend>,
    keys: Arc<dyn KeyPairProvider>,
    store: ScopedStore,
    policy: PolicyEnforcer,
    name_encoder: Arc<dyn NameEncoder>,
    key_ids: Arc<dyn KeyIdGenerator>,
    config: StoreConfig,
    last_key_id: Option<String>,
}

impl CertificateStore {
    /// Open the configured system store
    pub fn open(
        backend: Arc<dyn CryptoBackend>,
        keys: Arc<dyn KeyPairProvider>,
        settings: Arc<dyn SettingsStore>,
        config: StoreConfig,
    ) -> Result<Self> {
        config.validate()?;

        if let Some(provider) = config.key_provider_name.as_deref() {
            if provider != keys.provider_name() {
                return Err(PkiError::StoreOpen {
                    store: config.store_name.clone(),
                    code: codes::NTE_BAD_KEYSET,
                    message: format!(
                        "Key provider '{}' requested but '{}' is available",
                        provider,
                        keys.provider_name()
                    ),
                });
            }
        }

        let handle = backend
            .open_system_store(&config.store_name)
            .map_err(|e| PkiError::StoreOpen {
                store: config.store_name.clone(),
                code: e.code,
                message: e.message,
            })?;

        let policy = PolicyEnforcer::new(
            settings,
            config.policy_path.clone(),
            config.policy_value_name.clone(),
        );

        info!(store = %config.store_name, provider = keys.provider_name(), "opened certificate store");
        Ok(Self {
            backend,
            keys,
            store: ScopedStore::new(config.store_name.clone(), handle),
            policy,
            name_encoder: Arc::new(X509NameEncoder),
            key_ids: Arc::new(RandomKeyIdGenerator),
            config,
            last_key_id: None,
        })
    }

    pub fn with_name_encoder(mut self, encoder: Arc<dyn NameEncoder>) -> Self {
        self.name_encoder = encoder;
        self
    }

    pub fn with_key_id_generator(mut self, generator: Arc<dyn KeyIdGenerator>) -> Self {
        self.key_ids = generator;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Key name used by the last successful request
    pub fn last_key_id(&self) -> Option<&str> {
        self.last_key_id.as_deref()
    }

    /// Generate a key pair and return a PEM request for `subject_name`
    ///
    /// The key pair is named by a fresh key id. When anything after key
    /// generation fails the key pair is deleted before the error is
    /// returned.
    pub fn create_certificate_request(
        &mut self,
        subject_name: &str,
        bit_length: usize,
        force_pin_protection: bool,
    ) -> Result<String> {
        let key_id = match self.key_ids.generate() {
            UuidOutcome::Unique(id) => id,
            UuidOutcome::LocalOnly(id) => {
                debug!(key = %id, "key id is only locally unique");
                id
            }
            UuidOutcome::Failed(code) => {
                return Err(PkiError::crypto(
                    "generate key id",
                    BackendError::new(code, "Failed to generate a key identifier"),
                ));
            }
        };

        let key_pair = self
            .keys
            .generate_key_pair(&key_id, bit_length, force_pin_protection)
            .crypto_op("generate key pair")?;

        let guard = KeyPairGuard::new(self.keys.as_ref(), &key_pair);
        let request = self.build_request(subject_name, &key_pair)?;
        guard.commit();

        info!(key = %key_id, subject = subject_name, bits = bit_length, "created certificate request");
        self.last_key_id = Some(key_id);
        Ok(request)
    }

    /// [`create_certificate_request`](Self::create_certificate_request) with
    /// the configured key size
    pub fn create_default_certificate_request(
        &mut self,
        subject_name: &str,
        force_pin_protection: bool,
    ) -> Result<String> {
        let bits = self.config.default_key_bits;
        self.create_certificate_request(subject_name, bits, force_pin_protection)
    }

    fn build_request(&self, subject_name: &str, key_pair: &KeyPair) -> Result<String> {
        let subject = self
            .name_encoder
            .encode(subject_name, NameStringMode::Utf8)
            .crypto_op("encode subject name")?;

        let info = csr::build_unsigned(&subject, key_pair.public_key_info())
            .crypto_op("build certificate request")?;
        let request = csr::sign_request(info, key_pair, self.keys.as_ref())
            .crypto_op("sign certificate request")?;
        let der = request.to_der().crypto_op("encode certificate request")?;

        Ok(encoding::encode(&der, Framing::RequestHeader))
    }

    /// Add a PEM certificate and link it to its key pair, if one exists
    ///
    /// An entry with the same issuer and serial is replaced. The store stays
    /// usable when this fails.
    pub fn import_certificate(&mut self, pem_certificate: &str) -> Result<()> {
        encoding::ensure_addressable(pem_certificate.len())?;

        let der = encoding::decode_header(pem_certificate).crypto_op("decode certificate")?;
        let context = self
            .store
            .add_encoded_certificate(&der, AddDisposition::ReplaceExisting)
            .crypto_op("add certificate")?;

        let linked = self.link_key_pair(&context)?;
        info!(
            subject = %crate::name::format_name(&context.certificate().tbs_certificate.subject),
            linked,
            "imported certificate"
        );
        Ok(())
    }

    fn link_key_pair(&mut self, context: &CertContext) -> Result<bool> {
        let spki = context
            .certificate()
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| BackendError::bad_encode(format!("Failed to encode SPKI: {}", e)))
            .crypto_op("encode public key")?;

        let Some(key_pair) = self.keys.get_key_pair(&spki).crypto_op("find key pair")? else {
            debug!("no key pair for imported certificate");
            return Ok(false);
        };

        self.store
            .set_property(
                context,
                CertProperty::KeyProviderInfo(KeyProviderInfo {
                    provider_name: self.keys.provider_name().to_string(),
                    container_name: key_pair.name().to_string(),
                }),
            )
            .crypto_op("set key provider info")?;
        self.store
            .set_property(context, CertProperty::KeyHandle(key_pair.handle()))
            .crypto_op("set key handle")?;

        Ok(true)
    }

    /// Export the certificate `issuer` + `serial_hex` with its private key
    ///
    /// Returns the PKCS#12 container as plain base64.
    pub fn pfx_export(&self, issuer: &str, serial_hex: &str, password: &str) -> Result<String> {
        let serial = parse_serial_hex(serial_hex).crypto_op("parse serial number")?;
        let serial_le = to_backend_order(&serial);
        let context = self.find_certificate(issuer, &serial_le)?;

        let mut staging = ScopedStore::new(
            "pfx export",
            self.backend
                .open_memory_store()
                .crypto_op("open memory store")?,
        );
        staging
            .add_certificate_context(&context, AddDisposition::UseExisting)
            .crypto_op("add certificate to memory store")?;

        let pfx = self
            .backend
            .pfx_export(&*staging, password, true)
            .crypto_op("export PFX")?;

        info!(issuer, serial = serial_hex, "exported certificate");
        Ok(encoding::encode(&pfx, Framing::Plain))
    }

    /// Look up by issuer and serial, UTF-8 issuer encoding first
    fn find_certificate(&self, issuer: &str, serial_le: &[u8]) -> Result<CertContext> {
        let utf8 = self
            .name_encoder
            .encode(issuer, NameStringMode::Utf8)
            .crypto_op("encode issuer name")?;

        match self.store.find_by_issuer_and_serial(&utf8, serial_le) {
            Ok(context) => return Ok(context),
            Err(e) => debug!(error = %e, "retrying lookup with printable issuer encoding"),
        }

        let printable = self
            .name_encoder
            .encode(issuer, NameStringMode::Printable)
            .crypto_op("encode issuer name")?;
        self.store
            .find_by_issuer_and_serial(&printable, serial_le)
            .crypto_op("find certificate")
    }

    /// Import the end-entity certificates of a base64 PKCS#12 bundle
    ///
    /// CA certificates in the bundle are skipped. Returns the number of
    /// certificates added to the store.
    pub fn pfx_import(
        &mut self,
        pfx_base64: &str,
        password: &str,
        force_pin_protection: bool,
    ) -> Result<usize> {
        encoding::ensure_addressable(pfx_base64.len())?;

        let pfx = encoding::decode_any(pfx_base64).crypto_op("decode PFX")?;
        let transient = ScopedStore::new(
            "pfx import",
            self.backend
                .pfx_import(&pfx, password, PfxImportFlags::for_import(force_pin_protection))
                .crypto_op("import PFX")?,
        );

        let mut imported = 0;
        for context in transient.enumerate().crypto_op("enumerate PFX")? {
            if is_ca_certificate(context.certificate()) {
                debug!(
                    subject = %crate::name::format_name(&context.certificate().tbs_certificate.subject),
                    "skipping CA certificate"
                );
                continue;
            }

            self.store
                .add_certificate_context(&context, AddDisposition::ReplaceExisting)
                .crypto_op("add certificate")?;
            imported += 1;
        }

        info!(imported, "imported PFX");
        Ok(imported)
    }

    /// Ensure the key protection policy is enforced; lower levels never downgrade it
    pub fn force_password_pin_protection(&self, level: KeyProtectionLevel) -> Result<()> {
        self.policy.force_password_pin_protection(level)
    }

    pub fn key_protection_level(&self) -> KeyProtectionLevel {
        self.policy.current_level()
    }

    /// Summary of every entry in the store
    pub fn certificates(&self) -> Result<Vec<CertificateInfo>> {
        self.store
            .enumerate()
            .crypto_op("enumerate store")?
            .iter()
            .map(|context| {
                CertificateInfo::from_certificate(
                    context.certificate(),
                    context.key_provider_info().is_some(),
                )
                .crypto_op("describe certificate")
            })
            .collect()
    }
}
