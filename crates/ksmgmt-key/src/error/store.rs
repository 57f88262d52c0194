use super::Error;

/// Numeric codes reported alongside provider errors.
///
/// The values follow the NTE_* status codes of the platform key storage
/// providers so callers can compare them with codes coming from a native
/// backend.
pub mod codes {
    pub const NTE_BAD_DATA: u32 = 0x8009_0005;
    pub const NTE_BAD_KEY: u32 = 0x8009_0003;
    pub const NTE_BAD_SIGNATURE: u32 = 0x8009_0006;
    pub const NTE_EXISTS: u32 = 0x8009_000F;
    pub const NTE_PERM: u32 = 0x8009_0010;
    pub const NTE_BAD_KEYSET: u32 = 0x8009_0016;
    pub const NTE_INVALID_PARAMETER: u32 = 0x8009_0027;
    pub const NTE_FAIL: u32 = 0x8009_0020;
}

/// 存储相关的错误扩展
impl Error {
    /// 密钥未找到错误
    pub fn key_not_found(name: impl std::fmt::Display) -> Self {
        Error::KeyNotFound(name.to_string())
    }

    /// 密钥已存在错误
    pub fn key_exists(name: impl std::fmt::Display) -> Self {
        Error::KeyExists(name.to_string())
    }

    /// 私钥不可导出
    pub fn not_exportable(name: impl std::fmt::Display) -> Self {
        Error::NotExportable(name.to_string())
    }

    /// 锁错误
    pub fn lock_error(msg: impl std::fmt::Display) -> Self {
        Error::Other(format!("Lock error: {}", msg))
    }

    /// Status code matching this error.
    pub fn code(&self) -> u32 {
        match self {
            Error::KeyNotFound(_) => codes::NTE_BAD_KEYSET,
            Error::KeyExists(_) => codes::NTE_EXISTS,
            Error::InvalidKeyLength { .. } => codes::NTE_INVALID_PARAMETER,
            Error::SignatureError(_) => codes::NTE_BAD_SIGNATURE,
            Error::NotExportable(_) => codes::NTE_PERM,
            Error::KeyError(_) => codes::NTE_BAD_KEY,
            Error::ExportError(_) | Error::ImportError(_) | Error::EncodingError(_) => {
                codes::NTE_BAD_DATA
            }
            Error::Other(_) => codes::NTE_FAIL,
        }
    }
}
