use std::panic::Location;

use thiserror::Error;

/// Status codes carried by backend failures
///
/// The values match the Win32 / CryptoAPI codes a native certificate store
/// reports, so errors from the software backend read the same way.
pub mod codes {
    pub use ksmgmt_key::codes::*;

    pub const ERROR_ACCESS_DENIED: u32 = 5;
    pub const ERROR_INVALID_HANDLE: u32 = 6;
    pub const ERROR_INVALID_DATA: u32 = 13;
    pub const ERROR_INVALID_PARAMETER: u32 = 87;
    pub const ERROR_INVALID_PASSWORD: u32 = 86;
    pub const ERROR_FILE_NOT_FOUND: u32 = 2;
    pub const RPC_S_UUID_NO_ADDRESS: u32 = 1739;
    pub const CRYPT_E_NOT_FOUND: u32 = 0x8009_2004;
    pub const CRYPT_E_EXISTS: u32 = 0x8009_2005;
    pub const CRYPT_E_BAD_ENCODE: u32 = 0x8009_2002;
    pub const CRYPT_E_ASN1_BADTAG: u32 = 0x8009_310B;
    pub const CRYPT_E_INVALID_X500_STRING: u32 = 0x8009_2023;
}

/// Failure reported by a backend primitive (store, encoder, provider)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (code {code:#x})")]
pub struct BackendError {
    pub code: u32,
    pub message: String,
}

impl BackendError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(codes::CRYPT_E_NOT_FOUND, message)
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::new(codes::ERROR_INVALID_DATA, message)
    }

    pub fn bad_encode(message: impl Into<String>) -> Self {
        Self::new(codes::CRYPT_E_BAD_ENCODE, message)
    }

    pub fn closed() -> Self {
        Self::new(codes::ERROR_INVALID_HANDLE, "Certificate store is closed")
    }
}

impl From<ksmgmt_key::Error> for BackendError {
    fn from(err: ksmgmt_key::Error) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Backend Result类型别名
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// PKI模块的错误类型
#[derive(Error, Debug)]
pub enum PkiError {
    /// 证书存储无法打开
    #[error("Failed to open certificate store '{store}': {message} (code {code:#x})")]
    StoreOpen {
        store: String,
        code: u32,
        message: String,
    },

    /// 加密/编码/存储操作失败
    #[error("{operation} failed at {location}: {message} (code {code:#x})")]
    CryptoOperation {
        operation: &'static str,
        location: &'static Location<'static>,
        code: u32,
        message: String,
    },

    /// 输入超过后端可寻址的最大长度
    #[error("Input of {size} bytes exceeds the maximum of {max} bytes")]
    Overflow { size: usize, max: usize },

    /// 策略写入失败
    #[error("Failed to write policy value '{name}': {message} (code {code:#x})")]
    PolicyWrite {
        name: String,
        code: u32,
        message: String,
    },

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PkiError {
    /// Build a [`PkiError::CryptoOperation`] located at the caller
    #[track_caller]
    pub fn crypto(operation: &'static str, err: BackendError) -> Self {
        PkiError::CryptoOperation {
            operation,
            location: Location::caller(),
            code: err.code,
            message: err.message,
        }
    }

    /// OS-style status code, when the error carries one
    pub fn code(&self) -> Option<u32> {
        match self {
            PkiError::StoreOpen { code, .. }
            | PkiError::CryptoOperation { code, .. }
            | PkiError::PolicyWrite { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Result类型别名
pub type Result<T> = std::result::Result<T, PkiError>;

/// Attach the operation name and call site to backend failures
pub(crate) trait CryptoResultExt<T> {
    fn crypto_op(self, operation: &'static str) -> Result<T>;
}

impl<T, E: Into<BackendError>> CryptoResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn crypto_op(self, operation: &'static str) -> Result<T> {
        let location = Location::caller();
        self.map_err(|e| {
            let err = e.into();
            PkiError::CryptoOperation {
                operation,
                location,
                code: err.code,
                message: err.message,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_op_records_location() {
        let result: std::result::Result<(), BackendError> =
            Err(BackendError::not_found("missing"));
        let err = result.crypto_op("CertFind").unwrap_err();

        match err {
            PkiError::CryptoOperation {
                operation,
                location,
                code,
                ref message,
            } => {
                assert_eq!(operation, "CertFind");
                assert_eq!(code, codes::CRYPT_E_NOT_FOUND);
                assert_eq!(message, "missing");
                assert!(location.file().ends_with("error.rs"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.code(), Some(codes::CRYPT_E_NOT_FOUND));
    }

    #[test]
    fn test_key_errors_keep_their_code() {
        let result: std::result::Result<(), ksmgmt_key::Error> =
            Err(ksmgmt_key::Error::key_not_found("k"));
        let err = result.crypto_op("NCryptOpenKey").unwrap_err();
        assert_eq!(err.code(), Some(codes::NTE_BAD_KEYSET));
    }

    #[test]
    fn test_display() {
        let err = PkiError::Overflow { size: 10, max: 4 };
        assert_eq!(err.to_string(), "Input of 10 bytes exceeds the maximum of 4 bytes");
        assert_eq!(err.code(), None);
    }
}
