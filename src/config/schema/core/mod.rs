mod crypto;
mod env_overrides;
mod loader;
mod types;

pub use types::{Config, ReliabilityConfig, SecretsConfig};
