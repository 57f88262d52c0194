/// Result of generating a key identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UuidOutcome {
    /// Globally unique
    Unique(String),
    /// Unique on this machine only; accepted
    LocalOnly(String),
    /// Generation failed with the given status code
    Failed(u32),
}

/// Source of key pair names for new certificate requests
pub trait KeyIdGenerator: Send + Sync {
    fn generate(&self) -> UuidOutcome;
}

/// Random (v4) UUIDs in hyphenated lower-case form
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomKeyIdGenerator;

impl KeyIdGenerator for RandomKeyIdGenerator {
    fn generate(&self) -> UuidOutcome {
        UuidOutcome::Unique(uuid::Uuid::new_v4().to_string())
    }
}
