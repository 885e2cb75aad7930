use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayEndpointConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GatewayEndpointConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,
}

impl Default for GatewayEndpointConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SupervisorConfig {
    /// JSON array of per-account session options.
    #[serde(default = "default_tokens_path")]
    pub tokens_path: String,
    /// Delay between starting consecutive sessions.
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,
    /// How often disconnected sessions are nudged to connect again.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            tokens_path: default_tokens_path(),
            stagger_ms: default_stagger_ms(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl SupervisorConfig {
    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:5000".into()
}
fn default_gateway_url() -> String {
    voicekeep_gateway::GATEWAY_URL.into()
}
fn default_tokens_path() -> String {
    "config/tokens.json".into()
}
fn default_stagger_ms() -> u64 {
    2000
}
fn default_sweep_interval_secs() -> u64 {
    3600
}

/// Generate a commented config file template with the given values filled in.
fn generate_config_template(config: &Config) -> String {
    format!(
        r#"# Voicekeep Server Configuration
# Generated automatically on first run. Edit as needed.

[server]
# Address the status endpoint listens on
bind_address = "{bind_address}"

[gateway]
url = "{gateway_url}"

[supervisor]
# JSON array of session entries: token, serverId, channelId, selfMute,
# selfDeaf, autoReconnect {{ enabled, delaySeconds, maxRetries }}, presence {{ status }}
tokens_path = "{tokens_path}"
stagger_ms = {stagger_ms}
sweep_interval_secs = {sweep_interval_secs}
"#,
        bind_address = config.server.bind_address,
        gateway_url = config.gateway.url,
        tokens_path = config.supervisor.tokens_path,
        stagger_ms = config.supervisor.stagger_ms,
        sweep_interval_secs = config.supervisor.sweep_interval_secs,
    )
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!(
                "Config file not found at '{}', generating defaults...",
                path
            );
            let config = Config::default();

            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }

            let template = generate_config_template(&config);
            fs::write(path, &template)?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(value) = var("PORT") {
            match value.trim().parse::<u16>() {
                Ok(port) => self.server.bind_address = format!("0.0.0.0:{port}"),
                Err(_) => tracing::warn!("Ignoring invalid PORT value '{}'", value),
            }
        }
        // The explicit address wins over a bare PORT.
        if let Some(value) = var("VOICEKEEP_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = var("VOICEKEEP_TOKENS_PATH") {
            if !value.trim().is_empty() {
                self.supervisor.tokens_path = value;
            }
        }
        if let Some(value) = var("VOICEKEEP_GATEWAY_URL") {
            if !value.trim().is_empty() {
                self.gateway.url = value;
            }
        }
    }
}
