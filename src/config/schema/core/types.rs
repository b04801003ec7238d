use super::super::{
    ContentConfig, CredentialsConfig, DeliveryConfig, EntitlementConfig, RecoveryConfig,
    ReviewsConfig, SchedulerConfig,
};
use anyhow::Result;
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub reviews: ReviewsConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub credentials: CredentialsConfig,

    #[serde(default)]
    pub entitlement: EntitlementConfig,

    #[serde(default)]
    pub content: ContentConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub secrets: SecretsConfig,

    #[serde(default)]
    pub reliability: ReliabilityConfig,
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "default_true")]
    pub encrypt: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self { encrypt: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    #[serde(default = "default_component_backoff_secs")]
    pub component_initial_backoff_secs: u64,
    #[serde(default = "default_component_backoff_max_secs")]
    pub component_max_backoff_secs: u64,
    #[serde(default = "default_component_max_restarts")]
    pub component_max_restarts: u32,
}

fn default_component_backoff_secs() -> u64 {
    2
}

fn default_component_backoff_max_secs() -> u64 {
    60
}

fn default_component_max_restarts() -> u32 {
    10
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            component_initial_backoff_secs: default_component_backoff_secs(),
            component_max_backoff_secs: default_component_backoff_max_secs(),
            component_max_restarts: default_component_max_restarts(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());
        let locopilot_dir = home.join(".locopilot");

        Self {
            workspace_dir: locopilot_dir.join("workspace"),
            config_path: locopilot_dir.join("config.toml"),
            log_level: default_log_level(),
            scheduler: SchedulerConfig::default(),
            reviews: ReviewsConfig::default(),
            recovery: RecoveryConfig::default(),
            credentials: CredentialsConfig::default(),
            entitlement: EntitlementConfig::default(),
            content: ContentConfig::default(),
            delivery: DeliveryConfig::default(),
            secrets: SecretsConfig::default(),
            reliability: ReliabilityConfig::default(),
        }
    }
}

impl Config {
    /// Location of the engine database inside the workspace.
    pub fn database_path(&self) -> PathBuf {
        self.workspace_dir.join("state").join("locopilot.db")
    }

    pub fn validate(&self) -> Result<()> {
        self.content.validate()?;
        self.credentials.validate()?;
        self.reviews.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_reasonable_values() {
        let config = Config::default();

        assert_eq!(config.log_level, "info");
        assert!(config.workspace_dir.ends_with("workspace"));
        assert!(config.config_path.ends_with("config.toml"));
        assert!(!config.credentials.allow_pool_fallback);
        assert_eq!(config.credentials.refresh_buffer_minutes, 30);
        assert_eq!(config.reviews.poll_interval_secs, 600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn database_lives_under_workspace_state() {
        let config = Config::default();
        let path = config.database_path();
        assert!(path.starts_with(&config.workspace_dir));
        assert!(path.ends_with("state/locopilot.db"));
    }

    #[test]
    fn config_toml_round_trip_preserves_serialized_fields() {
        let mut config = Config {
            log_level: "debug".into(),
            ..Config::default()
        };
        config.entitlement.admin_principals = vec!["owner@example.com".into()];
        config.credentials.allow_pool_fallback = true;
        config.delivery.legacy_base_url = "https://legacy.example.com/v4".into();

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(deserialized.log_level, "debug");
        assert_eq!(
            deserialized.entitlement.admin_principals,
            vec!["owner@example.com".to_string()]
        );
        assert!(deserialized.credentials.allow_pool_fallback);
        assert_eq!(
            deserialized.delivery.legacy_base_url,
            "https://legacy.example.com/v4"
        );
        assert_eq!(deserialized.workspace_dir, PathBuf::new());
        assert_eq!(deserialized.config_path, PathBuf::new());
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.recovery.interval_secs, 300);
        assert_eq!(config.content.max_words, 300);
        assert!(config.secrets.encrypt);
    }
}
