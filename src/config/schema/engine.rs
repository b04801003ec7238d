use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often installed timers are re-synced against stored configuration.
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_test_interval_secs")]
    pub test_interval_secs: u64,
}

fn default_sync_interval_secs() -> u64 {
    60
}

fn default_test_interval_secs() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
            test_interval_secs: default_test_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewsConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_inter_reply_delay_ms")]
    pub inter_reply_delay_ms: u64,
}

fn default_poll_interval_secs() -> u64 {
    600
}

fn default_inter_reply_delay_ms() -> u64 {
    2_000
}

impl Default for ReviewsConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            inter_reply_delay_ms: default_inter_reply_delay_ms(),
        }
    }
}

impl ReviewsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs < 10 {
            bail!("reviews.poll_interval_secs must be at least 10");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    #[serde(default = "default_recovery_interval_secs")]
    pub interval_secs: u64,
    /// Reconciliation leaves a location alone for this long after a failed attempt.
    #[serde(default = "default_failure_cooldown_secs")]
    pub failure_cooldown_secs: u64,
    #[serde(default = "default_activity_retention")]
    pub activity_retention: u32,
}

fn default_recovery_interval_secs() -> u64 {
    300
}

fn default_failure_cooldown_secs() -> u64 {
    900
}

fn default_activity_retention() -> u32 {
    500
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_recovery_interval_secs(),
            failure_cooldown_secs: default_failure_cooldown_secs(),
            activity_retention: default_activity_retention(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_refresh_buffer_minutes")]
    pub refresh_buffer_minutes: i64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Borrow another principal's credential when the owner's is unusable.
    #[serde(default)]
    pub allow_pool_fallback: bool,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".into()
}

fn default_refresh_buffer_minutes() -> i64 {
    30
}

fn default_cache_ttl_secs() -> u64 {
    90
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            client_id: None,
            client_secret: None,
            refresh_buffer_minutes: default_refresh_buffer_minutes(),
            cache_ttl_secs: default_cache_ttl_secs(),
            allow_pool_fallback: false,
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl CredentialsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.refresh_buffer_minutes < 0 {
            bail!("credentials.refresh_buffer_minutes must not be negative");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementConfig {
    /// Principals that bypass trial and subscription checks.
    #[serde(default)]
    pub admin_principals: Vec<String>,
    #[serde(default = "default_trial_days")]
    pub default_trial_days: i64,
}

fn default_trial_days() -> i64 {
    7
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            admin_principals: Vec::new(),
            default_trial_days: default_trial_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_content_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_content_model")]
    pub model: String,
    #[serde(default = "default_content_temperature")]
    pub temperature: f64,
    #[serde(default = "default_min_words")]
    pub min_words: usize,
    #[serde(default = "default_max_words")]
    pub max_words: usize,
    #[serde(default = "default_content_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_content_api_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_content_model() -> String {
    "gpt-4o-mini".into()
}

fn default_content_temperature() -> f64 {
    0.7
}

fn default_min_words() -> usize {
    20
}

fn default_max_words() -> usize {
    300
}

fn default_content_timeout_secs() -> u64 {
    60
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            api_url: default_content_api_url(),
            api_key: None,
            model: default_content_model(),
            temperature: default_content_temperature(),
            min_words: default_min_words(),
            max_words: default_max_words(),
            timeout_secs: default_content_timeout_secs(),
        }
    }
}

impl ContentConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            bail!("content.temperature must be within 0.0..=2.0");
        }
        if self.min_words > self.max_words {
            bail!(
                "content.min_words ({}) exceeds content.max_words ({})",
                self.min_words,
                self.max_words
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_primary_base_url")]
    pub primary_base_url: String,
    #[serde(default = "default_legacy_base_url")]
    pub legacy_base_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_primary_base_url() -> String {
    "https://mybusiness.googleapis.com/v1".into()
}

fn default_legacy_base_url() -> String {
    "https://mybusiness.googleapis.com/v4".into()
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            primary_base_url: default_primary_base_url(),
            legacy_base_url: default_legacy_base_url(),
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_rejects_inverted_word_bounds() {
        let config = ContentConfig {
            min_words: 400,
            max_words: 100,
            ..ContentConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds content.max_words"));
    }

    #[test]
    fn reviews_rejects_hot_polling() {
        let config = ReviewsConfig {
            poll_interval_secs: 1,
            ..ReviewsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn pool_fallback_is_opt_in() {
        let config: CredentialsConfig = toml::from_str("").unwrap();
        assert!(!config.allow_pool_fallback);
        assert_eq!(config.cache_ttl_secs, 90);
    }
}
