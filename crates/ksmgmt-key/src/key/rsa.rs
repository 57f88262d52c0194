use pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{traits::PublicKeyParts, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Smallest modulus accepted by [`RsaKey::generate`]
pub const MIN_BITS: usize = 512;
/// Largest modulus accepted by [`RsaKey::generate`]
pub const MAX_BITS: usize = 16384;

// ============================================================================
// Core Key Structure
// ============================================================================

/// RSA key pair used for request signing and PKCS#12 transport
///
/// # Examples
///
/// ```no_run
/// use ksmgmt_key::RsaKey;
///
/// let key = RsaKey::generate(2048).unwrap();
/// let signature = key.sign(b"Hello, World!").unwrap();
/// assert_eq!(signature.len(), 256);
/// ```
pub struct RsaKey {
    inner: RsaPrivateKey,
}

impl From<RsaPrivateKey> for RsaKey {
    fn from(value: RsaPrivateKey) -> Self {
        Self { inner: value }
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RsaKey {
    /// Generate a new RSA key pair with the given modulus length
    ///
    /// The length must be a multiple of 64 between [`MIN_BITS`] and
    /// [`MAX_BITS`].
    pub fn generate(bits: usize) -> Result<Self> {
        if !(MIN_BITS..=MAX_BITS).contains(&bits) || bits % 64 != 0 {
            return Err(Error::InvalidKeyLength { bits });
        }
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| Error::KeyError(format!("RSA-{} generation failed: {}", bits, e)))?;
        Ok(private_key.into())
    }

    /// Import from PKCS8 DER format
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let inner = RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|e| Error::ImportError(format!("RSA PKCS8 DER import failed: {}", e)))?;
        Ok(Self { inner })
    }

    /// Get RSA key size in bits
    pub fn size_bits(&self) -> usize {
        self.inner.size() * 8
    }
}

// ============================================================================
// Export
// ============================================================================

impl RsaKey {
    /// Export private key to PKCS8 DER format
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        let der = self
            .inner
            .to_pkcs8_der()
            .map_err(|e| Error::ExportError(format!("RSA PKCS8 DER export failed: {}", e)))?;
        Ok(der.as_bytes().to_vec())
    }

    /// Export public key to SPKI DER format
    pub fn to_spki_der(&self) -> Result<Vec<u8>> {
        let der = self
            .inner
            .to_public_key()
            .to_public_key_der()
            .map_err(|e| Error::EncodingError(format!("RSA SPKI DER encoding failed: {}", e)))?;
        Ok(der.as_bytes().to_vec())
    }
}

// ============================================================================
// Signing
// ============================================================================

impl RsaKey {
    /// Sign data using PKCS#1 v1.5 with SHA-256
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let mut rng = rand::thread_rng();
        let hashed = Sha256::digest(message);
        self.inner
            .sign_with_rng(&mut rng, rsa::Pkcs1v15Sign::new::<Sha256>(), &hashed)
            .map_err(|e| Error::SignatureError(format!("RSA signing failed: {}", e)))
    }
}

/// Verify a PKCS#1 v1.5 / SHA-256 signature against an SPKI DER public key
pub fn verify_with_spki_der(spki_der: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    let public_key = RsaPublicKey::from_public_key_der(spki_der)
        .map_err(|e| Error::EncodingError(format!("Invalid RSA SPKI: {}", e)))?;

    let hashed = Sha256::digest(message);
    Ok(public_key
        .verify(rsa::Pkcs1v15Sign::new::<Sha256>(), &hashed, signature)
        .is_ok())
}

// ============================================================================
// Tests
// ============================================================================
