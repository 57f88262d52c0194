//! 证书存储配置
//!
//! 提供存储名称、密钥提供者、策略位置等配置及默认值

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PkiError, Result};

/// 证书存储配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 系统证书存储名称
    pub store_name: String,
    /// 密钥提供者名称（None 表示使用默认提供者）
    pub key_provider_name: Option<String>,
    /// 策略设置路径
    pub policy_path: String,
    /// 策略值名称
    pub policy_value_name: String,
    /// 默认密钥长度（位）
    pub default_key_bits: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_name: "MY".to_string(),
            key_provider_name: None,
            policy_path: r"SOFTWARE\Policies\Microsoft\Cryptography".to_string(),
            policy_value_name: "ForceKeyProtection".to_string(),
            default_key_bits: 2048,
        }
    }
}

impl StoreConfig {
    /// 从 TOML 文件加载配置，缺省字段使用默认值
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;

        debug!(path = %path.display(), store = %config.store_name, "loaded store configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PkiError::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_name.trim().is_empty() {
            return Err(PkiError::ConfigError("store_name must not be empty".to_string()));
        }
        if self.policy_value_name.trim().is_empty() {
            return Err(PkiError::ConfigError(
                "policy_value_name must not be empty".to_string(),
            ));
        }
        if self.default_key_bits % 64 != 0
            || !(ksmgmt_key::key::MIN_BITS..=ksmgmt_key::key::MAX_BITS)
                .contains(&self.default_key_bits)
        {
            return Err(PkiError::ConfigError(format!(
                "default_key_bits {} is not a supported RSA key size",
                self.default_key_bits
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.store_name, "MY");
        assert_eq!(config.policy_value_name, "ForceKeyProtection");
        assert!(config.key_provider_name.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "store_name = \"Personal\"").unwrap();
        writeln!(file, "default_key_bits = 3072").unwrap();

        let config = StoreConfig::load(file.path()).unwrap();
        assert_eq!(config.store_name, "Personal");
        assert_eq!(config.default_key_bits, 3072);
        assert_eq!(config.policy_path, StoreConfig::default().policy_path);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            StoreConfig::from_toml("default_key_bits = 1000"),
            Err(PkiError::ConfigError(_))
        ));
        assert!(matches!(
            StoreConfig::from_toml("store_name = \"\""),
            Err(PkiError::ConfigError(_))
        ));
        assert!(matches!(
            StoreConfig::from_toml("store_name = 5"),
            Err(PkiError::ConfigError(_))
        ));
        assert!(matches!(
            StoreConfig::load("/nonexistent/ksmgmt.toml"),
            Err(PkiError::IoError(_))
        ));
    }
}
