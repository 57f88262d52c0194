//! Shared fixtures for the certificate store tests

#![allow(dead_code)]

use std::sync::Arc;

use der::Encode;
use ksmgmt_key::{KeyPair, KeyPairProvider, MemoryKeyPairProvider};
use ksmgmt_pki::{
    cert::certificate_der,
    encoding::{self, Framing},
    name::parse_name,
    CertificateStore, CertificateTemplate, Csr, MemorySettingsStore, NameStringMode,
    SoftwareBackend, StoreConfig,
};
use x509_cert::{name::Name, Certificate};

pub const KEY_BITS: usize = 1024;

/// Key provider, backend and settings shared by every store a test opens
pub struct Fixture {
    pub keys: Arc<MemoryKeyPairProvider>,
    pub backend: Arc<SoftwareBackend>,
    pub settings: Arc<MemorySettingsStore>,
}

impl Fixture {
    pub fn new() -> Self {
        let keys = Arc::new(MemoryKeyPairProvider::new());
        let backend = Arc::new(SoftwareBackend::new(keys.clone()));
        Self {
            keys,
            backend,
            settings: Arc::new(MemorySettingsStore::new()),
        }
    }

    pub fn open(&self) -> CertificateStore {
        self.open_named("MY")
    }

    pub fn open_named(&self, store_name: &str) -> CertificateStore {
        let config = StoreConfig {
            store_name: store_name.to_string(),
            default_key_bits: KEY_BITS,
            ..StoreConfig::default()
        };
        CertificateStore::open(
            self.backend.clone(),
            self.keys.clone(),
            self.settings.clone(),
            config,
        )
        .unwrap()
    }
}

/// Issuing CA with its own key provider
pub struct TestCa {
    keys: MemoryKeyPairProvider,
    key: KeyPair,
    name: Name,
}

impl TestCa {
    pub fn new(subject: &str, mode: NameStringMode) -> Self {
        let keys = MemoryKeyPairProvider::new();
        let key = keys.generate_key_pair("ca", KEY_BITS, false).unwrap();
        Self {
            keys,
            key,
            name: parse_name(subject, mode).unwrap(),
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn certificate(&self) -> Certificate {
        CertificateTemplate::self_signed(self.name.clone())
            .serial(&[0x01])
            .basic_constraints(true)
            .issue(self.key.public_key_info(), &self.key, &self.keys)
            .unwrap()
    }

    /// End-entity certificate for `subject` / `spki_der`
    pub fn issue(&self, subject: &Name, spki_der: &[u8], serial: &[u8]) -> Certificate {
        CertificateTemplate::new(subject.clone(), self.name.clone())
            .serial(serial)
            .basic_constraints(false)
            .issue(spki_der, &self.key, &self.keys)
            .unwrap()
    }

    /// Sign a PEM request and return the certificate as PEM
    pub fn sign_request(&self, request_pem: &str, serial: &[u8]) -> String {
        let csr = Csr::from_pem(request_pem).unwrap();
        assert!(csr.verify_signature().unwrap());

        let cert = self.issue(csr.subject(), &csr.public_key_info_der().unwrap(), serial);
        to_pem(&cert)
    }
}

pub fn to_pem(cert: &Certificate) -> String {
    encoding::encode(&certificate_der(cert).unwrap(), Framing::Header)
}

pub fn spki_der(cert: &Certificate) -> Vec<u8> {
    cert.tbs_certificate
        .subject_public_key_info
        .to_der()
        .unwrap()
}
