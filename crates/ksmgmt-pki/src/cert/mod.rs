pub mod builder;

use der::{Decode, Encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x509_cert::{ext::pkix::BasicConstraints, Certificate};

use crate::{
    error::{codes, BackendError, BackendResult},
    name::format_name,
};

// 重新导出常用类型
pub use builder::CertificateTemplate;

/// Parse a DER certificate
pub fn parse_certificate(der: &[u8]) -> BackendResult<Certificate> {
    Certificate::from_der(der)
        .map_err(|e| BackendError::bad_encode(format!("Failed to parse certificate: {}", e)))
}

pub fn certificate_der(cert: &Certificate) -> BackendResult<Vec<u8>> {
    cert.to_der()
        .map_err(|e| BackendError::bad_encode(format!("Failed to encode certificate: {}", e)))
}

/// Whether the certificate is a CA according to its basic constraints
///
/// Only the first basic-constraints extension is considered. A missing
/// extension, or one that does not decode, means "not a CA".
pub fn is_ca_certificate(cert: &Certificate) -> bool {
    let Some(extensions) = cert.tbs_certificate.extensions.as_ref() else {
        return false;
    };

    extensions
        .iter()
        .find(|ext| ext.extn_id == const_oid::db::rfc5280::ID_CE_BASIC_CONSTRAINTS)
        .and_then(|ext| BasicConstraints::from_der(ext.extn_value.as_bytes()).ok())
        .map(|bc| bc.ca)
        .unwrap_or(false)
}

/// Parse a textual serial number into big-endian bytes
///
/// Accepts an optional `0x`/`0X` prefix and either letter case. An odd
/// number of digits is padded with a leading zero.
pub fn parse_serial_hex(text: &str) -> BackendResult<Vec<u8>> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    if digits.is_empty() {
        return Err(BackendError::new(
            codes::ERROR_INVALID_PARAMETER,
            "Serial number is empty",
        ));
    }

    let padded = if digits.len() % 2 == 1 {
        format!("0{}", digits)
    } else {
        digits.to_string()
    };

    hex::decode(&padded).map_err(|e| {
        BackendError::new(
            codes::ERROR_INVALID_PARAMETER,
            format!("Invalid serial number '{}': {}", text, e),
        )
    })
}

/// Big-endian serial bytes → little-endian order used for store comparison
pub fn to_backend_order(serial: &[u8]) -> Vec<u8> {
    serial.iter().rev().copied().collect()
}

/// Little-endian serial without sign-extension bytes
///
/// DER adds a leading zero to keep large serials positive, so two serials
/// are compared with those high-order zeros removed.
pub fn normalize_backend_serial(serial_le: &[u8]) -> &[u8] {
    let len = serial_le
        .iter()
        .rposition(|b| *b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    &serial_le[..len]
}

/// Certificate serial in backend (little-endian) order
pub fn backend_serial(cert: &Certificate) -> Vec<u8> {
    to_backend_order(cert.tbs_certificate.serial_number.as_bytes())
}

/// Store listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    /// Upper-case hex, big-endian
    pub serial_number: String,
    pub is_ca: bool,
    /// SHA-256 over the DER encoding, upper-case hex
    pub thumbprint: String,
    /// A key-provider linkage is set on the entry
    pub has_private_key: bool,
}

impl CertificateInfo {
    pub fn from_certificate(cert: &Certificate, has_private_key: bool) -> BackendResult<Self> {
        let der = certificate_der(cert)?;

        Ok(Self {
            subject: format_name(&cert.tbs_certificate.subject),
            issuer: format_name(&cert.tbs_certificate.issuer),
            serial_number: hex::encode_upper(cert.tbs_certificate.serial_number.as_bytes()),
            is_ca: is_ca_certificate(cert),
            thumbprint: hex::encode_upper(Sha256::digest(&der)),
            has_private_key,
        })
    }
}
