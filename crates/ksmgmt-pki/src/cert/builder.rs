//! Minimal X.509 v3 certificate issuance
//!
//! Enough to act as a small issuing CA for the store: subject and issuer
//! names, serial, validity and extensions, signed with sha256WithRSA by a
//! provider-held key.

use std::time::Duration;

use der::{
    asn1::{BitString, OctetString},
    Decode, Encode,
};
use ksmgmt_key::{KeyPair, KeyPairProvider};
use pkcs8::spki::SubjectPublicKeyInfoOwned;
use x509_cert::{
    certificate::{TbsCertificate, Version},
    ext::{pkix::BasicConstraints, Extension},
    name::Name,
    serial_number::SerialNumber,
    time::Validity,
    Certificate,
};

use crate::{
    csr::sha256_with_rsa,
    error::{BackendError, BackendResult},
};

const DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct CertificateTemplate {
    subject: Name,
    issuer: Name,
    serial: Vec<u8>,
    validity_days: u64,
    extensions: Vec<Extension>,
    basic_constraints: Option<bool>,
}

impl CertificateTemplate {
    pub fn new(subject: Name, issuer: Name) -> Self {
        let mut serial = uuid::Uuid::new_v4().as_bytes()[..8].to_vec();
        // positive and without leading zero
        serial[0] = (serial[0] & 0x7f) | 0x40;

        Self {
            subject,
            issuer,
            serial,
            validity_days: 365,
            extensions: Vec::new(),
            basic_constraints: None,
        }
    }

    pub fn self_signed(subject: Name) -> Self {
        Self::new(subject.clone(), subject)
    }

    /// Big-endian serial number
    pub fn serial(mut self, serial: &[u8]) -> Self {
        self.serial = serial.to_vec();
        self
    }

    pub fn validity_days(mut self, days: u64) -> Self {
        self.validity_days = days;
        self
    }

    /// Add a critical basic-constraints extension
    pub fn basic_constraints(mut self, ca: bool) -> Self {
        self.basic_constraints = Some(ca);
        self
    }

    /// Append a raw extension after the basic constraints
    pub fn extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Issue a certificate for `subject_spki_der`, signed by `signer`
    pub fn issue(
        &self,
        subject_spki_der: &[u8],
        signer: &KeyPair,
        provider: &dyn KeyPairProvider,
    ) -> BackendResult<Certificate> {
        let subject_public_key_info = SubjectPublicKeyInfoOwned::from_der(subject_spki_der)
            .map_err(|e| BackendError::bad_encode(format!("Failed to parse SPKI: {}", e)))?;

        let serial_number = SerialNumber::new(&self.serial)
            .map_err(|e| BackendError::bad_encode(format!("Invalid serial number: {}", e)))?;

        let validity = Validity::from_now(Duration::from_secs(self.validity_days * DAY))
            .map_err(|e| BackendError::bad_encode(format!("Invalid validity: {}", e)))?;

        let mut extensions = Vec::with_capacity(self.extensions.len() + 1);
        if let Some(ca) = self.basic_constraints {
            extensions.push(basic_constraints_extension(ca)?);
        }
        extensions.extend(self.extensions.iter().cloned());

        let tbs_certificate = TbsCertificate {
            version: Version::V3,
            serial_number,
            signature: sha256_with_rsa(),
            issuer: self.issuer.clone(),
            validity,
            subject: self.subject.clone(),
            subject_public_key_info,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: (!extensions.is_empty()).then_some(extensions),
        };

        let tbs_der = tbs_certificate
            .to_der()
            .map_err(|e| BackendError::bad_encode(format!("Failed to encode TBS: {}", e)))?;
        let signature = provider.sign(signer, &tbs_der)?;

        Ok(Certificate {
            tbs_certificate,
            signature_algorithm: sha256_with_rsa(),
            signature: BitString::from_bytes(&signature)
                .map_err(|e| BackendError::bad_encode(format!("Invalid signature: {}", e)))?,
        })
    }
}

fn basic_constraints_extension(ca: bool) -> BackendResult<Extension> {
    let value = BasicConstraints {
        ca,
        path_len_constraint: None,
    }
    .to_der()
    .map_err(|e| BackendError::bad_encode(format!("Failed to encode basic constraints: {}", e)))?;

    Ok(Extension {
        extn_id: const_oid::db::rfc5280::ID_CE_BASIC_CONSTRAINTS,
        critical: true,
        extn_value: OctetString::new(value)
            .map_err(|e| BackendError::bad_encode(format!("Invalid extension value: {}", e)))?,
    })
}
