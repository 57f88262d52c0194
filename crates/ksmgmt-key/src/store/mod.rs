mod memory;

pub use memory::MemoryKeyPairProvider;

/// Provider name used when none is configured
pub const DEFAULT_PROVIDER_NAME: &str = "Software Key Storage Provider";
