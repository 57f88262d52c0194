//! Key pair provider for ksmgmt
//!
//! 提供密钥对的生成、查找、删除与签名功能。证书存储只引用这里的密钥对，
//! 私钥本身始终留在提供者内部。

pub mod error;
pub mod key;
pub mod provider;
pub mod store;
pub mod types;

pub use error::{codes, Error, Result};
pub use key::{verify_with_spki_der, RsaKey};
pub use provider::{KeyPair, KeyPairProvider};
pub use store::{MemoryKeyPairProvider, DEFAULT_PROVIDER_NAME};
pub use types::{KeyFlags, KeyHandle};
