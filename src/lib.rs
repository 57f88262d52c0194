//! # ksmgmt - 证书与密钥存储管理
//!
//! ## 模块
//!
//! - `ksmgmt_key` - 密钥对提供者
//! - `ksmgmt_pki` - 证书存储、请求、PKCS#12 与策略
//! - `logging` - tracing 初始化

pub mod logging;

use std::sync::Arc;

// Re-export all sub-crates
pub use ksmgmt_key;
pub use ksmgmt_pki;

use ksmgmt_key::{MemoryKeyPairProvider, DEFAULT_PROVIDER_NAME};
use ksmgmt_pki::{CertificateStore, Result, SettingsStore, SoftwareBackend, StoreConfig};

/// Open a manager over the in-process software backend
///
/// The key provider reports `config.key_provider_name` when set.
pub fn open_software_store(
    config: StoreConfig,
    settings: Arc<dyn SettingsStore>,
) -> Result<CertificateStore> {
    let provider_name = config
        .key_provider_name
        .clone()
        .unwrap_or_else(|| DEFAULT_PROVIDER_NAME.to_string());
    let keys = Arc::new(MemoryKeyPairProvider::with_name(provider_name));
    let backend = Arc::new(SoftwareBackend::new(keys.clone()));

    CertificateStore::open(backend, keys, settings, config)
}
