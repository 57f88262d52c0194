//! ksmgmt PKI - 证书存储管理库
//!
//! 提供证书请求生成、证书导入、PKCS#12 导出/导入以及私钥保护策略

pub mod backend;
pub mod cert;
pub mod config;
pub mod csr;
pub mod encoding;
pub mod error;
pub mod name;
pub mod policy;
pub mod store;

// 重新导出常用类型
pub use backend::{
    AddDisposition, CertContext, CertProperty, CertStore, CryptoBackend, KeyProviderInfo,
    PfxImportFlags, ScopedStore, SoftwareBackend,
};
pub use cert::{is_ca_certificate, parse_serial_hex, CertificateInfo, CertificateTemplate};
pub use config::StoreConfig;
pub use csr::Csr;
pub use encoding::Framing;
pub use error::{codes, BackendError, BackendResult, PkiError, Result};
pub use name::{format_name, NameEncoder, NameStringMode, X509NameEncoder};
pub use policy::{
    FileSettingsStore, KeyProtectionLevel, MemorySettingsStore, PolicyEnforcer, SettingsStore,
};
pub use store::{CertificateStore, KeyIdGenerator, RandomKeyIdGenerator, UuidOutcome};

/// 预导入模块，包含最常用的类型和函数
pub mod prelude {
    pub use crate::{
        backend::{CryptoBackend, SoftwareBackend},
        config::StoreConfig,
        error::{PkiError, Result},
        policy::{KeyProtectionLevel, MemorySettingsStore, SettingsStore},
        store::CertificateStore,
    };
}
