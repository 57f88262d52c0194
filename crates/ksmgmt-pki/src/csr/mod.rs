//! Certificate Signing Request (CSR) module
//!
//! PKCS#10 requests signed with sha256WithRSAEncryption by a key that lives
//! in a [`KeyPairProvider`]. The private key never leaves the provider; the
//! request is assembled from the provider's signature over the encoded
//! `CertReqInfo`.

use der::{asn1::BitString, Any, Decode, Encode};
use ksmgmt_key::{verify_with_spki_der, KeyPair, KeyPairProvider};
use pkcs8::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::{
    name::Name,
    request::{CertReq, CertReqInfo, Version},
};

use crate::{
    encoding::{self, Framing},
    error::{BackendError, BackendResult},
    name::format_name,
};

/// Build the unsigned portion of a request
///
/// `encoded_subject` is a DER directory name as produced by a
/// [`NameEncoder`](crate::name::NameEncoder), `spki_der` the public key of
/// the key pair the request is bound to.
pub fn build_unsigned(encoded_subject: &[u8], spki_der: &[u8]) -> BackendResult<CertReqInfo> {
    let subject = Name::from_der(encoded_subject)
        .map_err(|e| BackendError::bad_encode(format!("Failed to parse subject: {}", e)))?;

    let public_key = SubjectPublicKeyInfoOwned::from_der(spki_der)
        .map_err(|e| BackendError::bad_encode(format!("Failed to parse SPKI: {}", e)))?;

    Ok(CertReqInfo {
        version: Version::V1,
        subject,
        public_key,
        attributes: Default::default(),
    })
}

/// Sign `info` with `key` and assemble the request
pub fn sign_request(
    info: CertReqInfo,
    key: &KeyPair,
    provider: &dyn KeyPairProvider,
) -> BackendResult<Csr> {
    let info_der = info
        .to_der()
        .map_err(|e| BackendError::bad_encode(format!("Failed to encode CertReqInfo: {}", e)))?;

    let signature = provider.sign(key, &info_der)?;

    let inner = CertReq {
        info,
        algorithm: sha256_with_rsa(),
        signature: BitString::from_bytes(&signature)
            .map_err(|e| BackendError::bad_encode(format!("Failed to create signature: {}", e)))?,
    };

    Ok(Csr { inner })
}

/// sha256WithRSAEncryption with explicit NULL parameters
pub(crate) fn sha256_with_rsa() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
        parameters: Some(Any::null()),
    }
}

/// PKCS#10 certificate signing request
#[derive(Debug, Clone)]
pub struct Csr {
    inner: CertReq,
}

impl Csr {
    /// Parse a request from PEM
    ///
    /// Both `CERTIFICATE REQUEST` and `NEW CERTIFICATE REQUEST` labels are
    /// accepted.
    pub fn from_pem(pem: &str) -> BackendResult<Self> {
        let parsed = pem::parse(pem)
            .map_err(|e| BackendError::invalid_data(format!("Failed to parse PEM: {}", e)))?;

        if parsed.tag() != "CERTIFICATE REQUEST" && parsed.tag() != "NEW CERTIFICATE REQUEST" {
            return Err(BackendError::invalid_data(format!(
                "Invalid PEM tag '{}', expected CERTIFICATE REQUEST or NEW CERTIFICATE REQUEST",
                parsed.tag()
            )));
        }

        Self::from_der(parsed.contents())
    }

    pub fn from_der(der: &[u8]) -> BackendResult<Self> {
        let inner = CertReq::from_der(der)
            .map_err(|e| BackendError::bad_encode(format!("Failed to parse DER: {}", e)))?;

        Ok(Self { inner })
    }

    pub fn to_der(&self) -> BackendResult<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| BackendError::bad_encode(format!("Failed to encode DER: {}", e)))
    }

    /// PEM with the `NEW CERTIFICATE REQUEST` label
    pub fn to_pem(&self) -> BackendResult<String> {
        Ok(encoding::encode(&self.to_der()?, Framing::RequestHeader))
    }

    pub fn subject(&self) -> &Name {
        &self.inner.info.subject
    }

    /// Subject rendered as `CN=..., O=...`
    pub fn subject_name(&self) -> String {
        format_name(&self.inner.info.subject)
    }

    pub fn public_key_info_der(&self) -> BackendResult<Vec<u8>> {
        self.inner
            .info
            .public_key
            .to_der()
            .map_err(|e| BackendError::bad_encode(format!("Failed to encode SPKI: {}", e)))
    }

    /// Verify the request is signed by the key it carries
    pub fn verify_signature(&self) -> BackendResult<bool> {
        let info_der = self.inner.info.to_der().map_err(|e| {
            BackendError::bad_encode(format!("Failed to encode info for verification: {}", e))
        })?;

        let spki_der = self.public_key_info_der()?;
        Ok(verify_with_spki_der(
            &spki_der,
            &info_der,
            self.inner.signature.raw_bytes(),
        )?)
    }
}
