//! Key protection policy
//!
//! A single integer setting decides whether newly stored private keys must
//! be protected by a PIN or password. The setting lives in a
//! [`SettingsStore`]; a native implementation would map it to the machine
//! policy registry.

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, RwLock,
    },
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{codes, BackendError, BackendResult, PkiError, Result};

/// Policy values understood by the key storage provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum KeyProtectionLevel {
    /// No protection required
    None = 0,
    /// User is prompted when the key is first used
    Prompt = 1,
    /// PIN or password required for every key
    Required = 2,
}

impl KeyProtectionLevel {
    pub fn value(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for KeyProtectionLevel {
    type Error = BackendError;

    fn try_from(value: u32) -> BackendResult<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Prompt),
            2 => Ok(Self::Required),
            other => Err(BackendError::invalid_data(format!(
                "Unknown key protection level {}",
                other
            ))),
        }
    }
}

/// Integer settings keyed by path and value name
pub trait SettingsStore: Send + Sync {
    fn get(&self, path: &str, name: &str) -> BackendResult<Option<u32>>;

    fn set(&self, path: &str, name: &str, value: u32) -> BackendResult<()>;
}

/// Paths compare case-insensitively, like registry keys
fn setting_key(path: &str, name: &str) -> (String, String) {
    (path.to_ascii_lowercase(), name.to_ascii_lowercase())
}

/// In-memory settings
///
/// Counts successful writes and can be switched to read-only to simulate
/// missing write access.
#[derive(Default)]
pub struct MemorySettingsStore {
    values: RwLock<HashMap<(String, String), u32>>,
    writes: AtomicUsize,
    read_only: AtomicBool,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `set` calls
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, path: &str, name: &str) -> BackendResult<Option<u32>> {
        let values = self
            .values
            .read()
            .map_err(|_| BackendError::new(codes::ERROR_ACCESS_DENIED, "Settings lock poisoned"))?;
        Ok(values.get(&setting_key(path, name)).copied())
    }

    fn set(&self, path: &str, name: &str, value: u32) -> BackendResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(BackendError::new(
                codes::ERROR_ACCESS_DENIED,
                format!("Settings key '{}' is read-only", path),
            ));
        }

        let mut values = self
            .values
            .write()
            .map_err(|_| BackendError::new(codes::ERROR_ACCESS_DENIED, "Settings lock poisoned"))?;
        values.insert(setting_key(path, name), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Settings persisted as a JSON document `{ path: { name: value } }`
pub struct FileSettingsStore {
    path: PathBuf,
}

type SettingsDocument = BTreeMap<String, BTreeMap<String, u32>>;

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_document(&self) -> BackendResult<SettingsDocument> {
        if !self.path.exists() {
            return Ok(SettingsDocument::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            BackendError::new(codes::ERROR_ACCESS_DENIED, format!("Failed to read settings: {}", e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| BackendError::invalid_data(format!("Corrupt settings file: {}", e)))
    }

    fn write_document(&self, document: &SettingsDocument) -> BackendResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BackendError::new(
                    codes::ERROR_ACCESS_DENIED,
                    format!("Failed to create settings directory: {}", e),
                )
            })?;
        }

        let json = serde_json::to_string_pretty(document)
            .map_err(|e| BackendError::invalid_data(format!("Failed to encode settings: {}", e)))?;
        fs::write(&self.path, json).map_err(|e| {
            BackendError::new(codes::ERROR_ACCESS_DENIED, format!("Failed to write settings: {}", e))
        })
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, path: &str, name: &str) -> BackendResult<Option<u32>> {
        let (path, name) = setting_key(path, name);
        let document = self.read_document()?;
        Ok(document.get(&path).and_then(|values| values.get(&name)).copied())
    }

    fn set(&self, path: &str, name: &str, value: u32) -> BackendResult<()> {
        let (path, name) = setting_key(path, name);
        let mut document = self.read_document()?;
        document.entry(path).or_default().insert(name, value);
        self.write_document(&document)
    }
}

/// Reads and enforces the key protection policy value
pub struct PolicyEnforcer {
    settings: Arc<dyn SettingsStore>,
    path: String,
    value_name: String,
}

impl PolicyEnforcer {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        path: impl Into<String>,
        value_name: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            path: path.into(),
            value_name: value_name.into(),
        }
    }

    /// Current policy value; unreadable or absent means [`KeyProtectionLevel::None`]
    pub fn current_level(&self) -> KeyProtectionLevel {
        self.read()
            .and_then(|value| KeyProtectionLevel::try_from(value).ok())
            .unwrap_or(KeyProtectionLevel::None)
    }

    fn read(&self) -> Option<u32> {
        match self.settings.get(&self.path, &self.value_name) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %self.path, name = %self.value_name, error = %e, "failed to read policy value");
                None
            }
        }
    }

    /// Make sure the policy value is [`KeyProtectionLevel::Required`]
    ///
    /// Writes only when the stored value differs. A lower `level` never
    /// downgrades the machine policy; the enforced value is written instead.
    pub fn force_password_pin_protection(&self, level: KeyProtectionLevel) -> Result<()> {
        let enforced = KeyProtectionLevel::Required.value();
        if level != KeyProtectionLevel::Required {
            debug!(name = %self.value_name, requested = level.value(), "raising requested level to enforced");
        }

        let current = self.read().unwrap_or(KeyProtectionLevel::None.value());
        if current == enforced {
            debug!(name = %self.value_name, value = current, "policy already set");
            return Ok(());
        }

        self.settings
            .set(&self.path, &self.value_name, enforced)
            .map_err(|e| PkiError::PolicyWrite {
                name: self.value_name.clone(),
                code: e.code,
                message: e.message,
            })?;

        info!(name = %self.value_name, from = current, to = enforced, "updated key protection policy");
        Ok(())
    }
}
