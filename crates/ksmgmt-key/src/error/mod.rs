mod store;

use thiserror::Error;

pub use store::codes;

/// 密钥提供者的错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 密钥相关错误
    #[error("Key error: {0}")]
    KeyError(String),

    /// 密钥未找到
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// 密钥已存在
    #[error("Key already exists: {0}")]
    KeyExists(String),

    /// 无效的密钥长度
    #[error("Invalid key length: {bits} bits (expected a multiple of 64 between 512 and 16384)")]
    InvalidKeyLength { bits: usize },

    /// 签名相关错误
    #[error("Signature error: {0}")]
    SignatureError(String),

    /// 私钥不可导出
    #[error("Key is not exportable: {0}")]
    NotExportable(String),

    /// 导出错误
    #[error("Export error: {0}")]
    ExportError(String),

    /// 导入错误
    #[error("Import error: {0}")]
    ImportError(String),

    /// 编码/解码错误
    #[error("Encoding error: {0}")]
    EncodingError(String),

    /// 其他错误
    #[error("Other error: {0}")]
    Other(String),
}

/// Result类型别名
pub type Result<T> = std::result::Result<T, Error>;
