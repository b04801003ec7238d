pub mod schema;

pub use schema::{
    Config, ContentConfig, CredentialsConfig, DeliveryConfig, EntitlementConfig,
    RecoveryConfig, ReliabilityConfig, ReviewsConfig, SchedulerConfig, SecretsConfig,
};
