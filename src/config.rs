//! Bot configuration
//!
//! Loaded once at startup from a YAML file. Every optional field is a typed
//! `Option` with a documented absence behavior instead of being probed at
//! each call site.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default config file path, overridable with `MINOR_WATCH_CONFIG`
pub const CONFIG_FILE: &str = "config/bot.yaml";

/// Runtime configuration for the bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// The guild the bot moderates
    pub guild_id: u64,
    /// Role indicating a user has completed account verification;
    /// a precondition for being flaggable
    pub verified_role_id: u64,
    /// Protective role marking a verified-but-underage account
    pub minor_role_id: u64,
    /// Role applied by mutes, removed by the unmute sweep
    pub muted_role_id: u64,
    /// Channel where report cards are posted; flagging fails with a
    /// user-facing message when absent
    pub review_channel_id: Option<u64>,
    /// Consent attestation service URL; absent means every consent
    /// check reports "no consent"
    pub consent_check_url: Option<String>,
    /// Shared secret for signing consent-check requests; same absence
    /// behavior as the URL
    pub consent_check_secret: Option<String>,
    /// One-time seed set for the reviewer allowlist
    #[serde(default)]
    pub default_reviewer_ids: Vec<u64>,
    /// Sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            guild_id: 0,
            verified_role_id: 0,
            minor_role_id: 0,
            muted_role_id: 0,
            review_channel_id: None,
            consent_check_url: None,
            consent_check_secret: None,
            default_reviewer_ids: Vec::new(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl BotConfig {
    /// Load the configuration from the YAML file, or fall back to defaults.
    pub async fn load() -> Self {
        let path =
            std::env::var("MINOR_WATCH_CONFIG").unwrap_or_else(|_| CONFIG_FILE.to_string());
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_yaml::from_str::<Self>(&content) {
                Ok(config) => {
                    config.warn_on_missing();
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {path}: {e}");
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config file {path}: {e}");
                Self::default()
            }
        }
    }

    /// Log every absent optional field once, at startup, so degraded
    /// behavior is visible without waiting for the first affected command.
    pub fn warn_on_missing(&self) {
        if self.review_channel_id.is_none() {
            warn!("review_channel_id not set; flagging will be rejected");
        }
        if self.consent_check_url.is_none() {
            warn!("consent_check_url not set; consent checks will report no consent");
        }
        if self.consent_check_secret.is_none() {
            warn!("consent_check_secret not set; consent checks will report no consent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = BotConfig {
            guild_id: 12345,
            verified_role_id: 1,
            minor_role_id: 2,
            muted_role_id: 3,
            review_channel_id: Some(67890),
            consent_check_url: Some("https://example.invalid/check".to_string()),
            consent_check_secret: Some("secret".to_string()),
            default_reviewer_ids: vec![10, 20],
            sweep_interval_seconds: 60,
        };

        let serialized = serde_yaml::to_string(&config).expect("Failed to serialize");
        assert!(serialized.contains("guild_id: 12345"));
        assert!(serialized.contains("review_channel_id: 67890"));

        let deserialized: BotConfig =
            serde_yaml::from_str(&serialized).expect("Failed to deserialize");
        assert_eq!(deserialized.guild_id, 12345);
        assert_eq!(deserialized.default_reviewer_ids, vec![10, 20]);
    }

    #[test]
    fn test_defaults_for_absent_fields() {
        let config: BotConfig = serde_yaml::from_str(
            "guild_id: 1\nverified_role_id: 2\nminor_role_id: 3\nmuted_role_id: 4\n",
        )
        .expect("Failed to deserialize");
        assert!(config.review_channel_id.is_none());
        assert!(config.consent_check_url.is_none());
        assert_eq!(config.sweep_interval_seconds, 60);
        assert!(config.default_reviewer_ids.is_empty());
    }
}
