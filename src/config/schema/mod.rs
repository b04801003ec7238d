mod core;
mod engine;

pub use core::{Config, ReliabilityConfig, SecretsConfig};
pub use engine::{
    ContentConfig, CredentialsConfig, DeliveryConfig, EntitlementConfig, RecoveryConfig,
    ReviewsConfig, SchedulerConfig,
};
