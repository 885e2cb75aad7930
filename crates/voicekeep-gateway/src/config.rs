use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use voicekeep_models::presence::PresenceStatus;
use voicekeep_util::validation::{validate_token_present, ValidationError};

use crate::voice::VoiceTarget;

const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
const DEFAULT_MAX_RETRIES: u32 = 9999;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("token is required")]
    MissingToken,
    #[error("invalid token: {0}")]
    InvalidToken(#[source] ValidationError),
    #[error("autoReconnect.delaySeconds must be at least 1")]
    InvalidDelay,
}

/// Option set for one gateway session, as it appears in the token registry
/// (camelCase keys).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default = "default_true")]
    pub self_mute: bool,
    #[serde(default = "default_true")]
    pub self_deaf: bool,
    #[serde(default)]
    pub auto_reconnect: AutoReconnectConfig,
    #[serde(default)]
    pub presence: Option<PresenceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoReconnectConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_delay_seconds", alias = "delay")]
    pub delay_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for AutoReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_seconds: default_delay_seconds(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default)]
    pub status: Option<String>,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            server_id: None,
            channel_id: None,
            self_mute: true,
            self_deaf: true,
            auto_reconnect: AutoReconnectConfig::default(),
            presence: None,
        }
    }

    pub fn with_target(mut self, server_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match validate_token_present(&self.token) {
            Ok(()) => {}
            Err(ValidationError::Empty) => return Err(ConfigError::MissingToken),
            Err(e) => return Err(ConfigError::InvalidToken(e)),
        }
        if self.auto_reconnect.delay_seconds == 0 {
            return Err(ConfigError::InvalidDelay);
        }
        Ok(())
    }

    /// Blank ids count as unset.
    pub fn voice_target(&self) -> VoiceTarget {
        VoiceTarget {
            guild_id: non_blank(self.server_id.as_deref()),
            channel_id: non_blank(self.channel_id.as_deref()),
            self_mute: self.self_mute,
            self_deaf: self.self_deaf,
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.auto_reconnect.delay_seconds)
    }

    /// Unknown or missing statuses disable presence updates.
    pub fn presence_status(&self) -> Option<PresenceStatus> {
        let raw = self.presence.as_ref()?.status.as_deref()?;
        match raw.parse() {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!("{e}; presence updates disabled");
                None
            }
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn default_true() -> bool {
    true
}
fn default_delay_seconds() -> u64 {
    DEFAULT_RECONNECT_DELAY_SECS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
