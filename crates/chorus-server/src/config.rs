//! Gateway configuration loading from file and environment variables.

use chorus_voice::{GenerationConfig, SttConfig, SynthesisConfig};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Streaming speech-to-text provider.
    #[serde(default)]
    pub stt: SttConfig,

    /// Reply-generation backend chain.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Speech-synthesis backend.
    #[serde(default)]
    pub synthesis: SynthesisConfig,
}

/// Network configuration for the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Conversation identifier used when no per-session conversation tracking
    /// exists (the fixed per-deployment default).
    #[serde(default = "default_conversation")]
    pub default_conversation: String,

    /// Per-call deadline for outbound backend HTTP requests, in seconds.
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "chorus_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8787
}

fn default_conversation() -> String {
    "default".to_string()
}

fn default_backend_timeout_secs() -> u64 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_conversation: default_conversation(),
            backend_timeout_secs: default_backend_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration is structurally valid but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Failed to build the shared HTTP client.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl Config {
    /// Checks that every upstream endpoint a deployment needs is present.
    ///
    /// Called at startup, not at load time, so partial configs remain usable
    /// in tests.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stt.url.is_empty() {
            return Err(ConfigError::Invalid("stt.url must be set".to_string()));
        }
        if self.generation.primary.url.is_empty() {
            return Err(ConfigError::Invalid(
                "generation.primary.url must be set".to_string(),
            ));
        }
        if self.synthesis.url.is_empty() {
            return Err(ConfigError::Invalid(
                "synthesis.url must be set".to_string(),
            ));
        }
        for fallback in &self.generation.fallbacks {
            if fallback.url.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "generation fallback '{}' has no url",
                    fallback.name
                )));
            }
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CHORUS_HOST` overrides `server.host`
/// - `CHORUS_PORT` overrides `server.port`
/// - `CHORUS_DEFAULT_CONVERSATION` overrides `server.default_conversation`
/// - `CHORUS_LOG_LEVEL` overrides `logging.level`
/// - `CHORUS_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `CHORUS_STT_URL` / `CHORUS_STT_API_KEY` override the `stt` section
/// - `CHORUS_SYNTHESIS_URL` / `CHORUS_SYNTHESIS_API_KEY` override `synthesis`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("CHORUS_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("CHORUS_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(conversation) = std::env::var("CHORUS_DEFAULT_CONVERSATION") {
        config.server.default_conversation = conversation;
    }
    if let Ok(level) = std::env::var("CHORUS_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("CHORUS_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(url) = std::env::var("CHORUS_STT_URL") {
        config.stt.url = url;
    }
    if let Ok(key) = std::env::var("CHORUS_STT_API_KEY") {
        config.stt.api_key = key;
    }
    if let Ok(url) = std::env::var("CHORUS_SYNTHESIS_URL") {
        config.synthesis.url = url;
    }
    if let Ok(key) = std::env::var("CHORUS_SYNTHESIS_API_KEY") {
        config.synthesis.api_key = key;
    }

    Ok(config)
}
