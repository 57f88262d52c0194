use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct KeyHandle(pub u64);

/// Storage flags attached to a key pair
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct KeyFlags {
    /// The private key may leave the provider (PKCS#8 export)
    pub exportable: bool,
    /// Every use of the private key requires a PIN or password
    pub user_protected: bool,
}

impl KeyFlags {
    pub fn exportable() -> Self {
        Self {
            exportable: true,
            user_protected: false,
        }
    }

    pub fn with_user_protection(mut self, user_protected: bool) -> Self {
        self.user_protected = user_protected;
        self
    }
}
