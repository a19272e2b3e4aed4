//! Server configuration
//!
//! Configuration is assembled from .env files, environment variables and an
//! optional YAML file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `usage`: Usage rate tables for realtime model cost estimation
//!
//! # Example
//! ```rust,no_run
//! use voicebridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // YAML on top of the environment
//! let config = ServerConfig::from_file(&PathBuf::from("config.yaml"))?;
//!
//! println!("Relay listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::env;
use std::path::PathBuf;

use serde::Deserialize;

use crate::errors::{RelayError, RelayResult};

pub mod usage;

pub use usage::{DEFAULT_USAGE_RATES, UsageRates, get_usage_rates, list_rated_models};

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default realtime model requested from the upstream provider.
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview";

/// Default upper bound on upstream connection establishment, in seconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// YAML configuration file structure
///
/// Every field is optional so a file can override just part of the
/// environment-derived configuration.
///
/// # Example YAML
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 3000
///
/// openai:
///   api_key: "sk-..."
///   realtime_url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-4o-realtime-preview"
///
/// relay:
///   handshake_timeout_secs: 10
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub openai: Option<OpenAiYaml>,
    pub relay: Option<RelayYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server section of the YAML configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// OpenAI section of the YAML configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiYaml {
    pub api_key: Option<String>,
    pub realtime_url: Option<String>,
    pub model: Option<String>,
}

/// Relay section of the YAML configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayYaml {
    pub handshake_timeout_secs: Option<u64>,
}

/// Security section of the YAML configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or is not valid YAML.
    pub fn from_file(path: &PathBuf) -> RelayResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RelayError::ConfigError(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        serde_yaml::from_str(&contents)
            .map_err(|e| RelayError::ConfigError(format!("Failed to parse YAML config: {e}")))
    }
}

/// Server configuration
///
/// Contains all configuration needed to run the voicebridge server, including:
/// - Server settings (host, port)
/// - Upstream OpenAI realtime settings (API key, endpoint, model)
/// - Relay settings (handshake timeout)
/// - Security settings (CORS)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // Upstream settings
    /// OpenAI API key used as the bearer credential on the upstream link.
    /// Sessions cannot be established without it; the HTTP query surface
    /// still works.
    pub openai_api_key: Option<String>,
    /// Upstream realtime WebSocket endpoint, without the model query parameter
    pub openai_realtime_url: String,
    /// Realtime model appended to the endpoint as `?model=...`
    pub openai_realtime_model: String,

    // Relay settings
    /// Upper bound on upstream connection establishment, in seconds
    pub handshake_timeout_secs: u64,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,
}

/// Implement Drop to zeroize the API key when ServerConfig is dropped.
/// This ensures sensitive data is cleared from memory immediately after use.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.openai_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// The .env file (if present) is loaded in main.rs at application startup,
    /// so its values appear here as ordinary environment variables.
    ///
    /// Recognized variables: `HOST`, `PORT`, `OPENAI_API_KEY`,
    /// `OPENAI_REALTIME_URL`, `OPENAI_REALTIME_MODEL`,
    /// `HANDSHAKE_TIMEOUT_SECS`, `CORS_ALLOWED_ORIGINS`.
    ///
    /// # Errors
    /// Returns `ConfigError` if a numeric variable cannot be parsed or the
    /// upstream URL is invalid.
    pub fn from_env() -> RelayResult<Self> {
        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string()),
            port: parse_env_var("PORT", DEFAULT_PORT)?,
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_realtime_url: env::var("OPENAI_REALTIME_URL")
                .unwrap_or_else(|_| crate::core::upstream::OPENAI_REALTIME_URL.to_string()),
            openai_realtime_model: env::var("OPENAI_REALTIME_MODEL")
                .unwrap_or_else(|_| DEFAULT_REALTIME_MODEL.to_string()),
            handshake_timeout_secs: parse_env_var(
                "HANDSHAKE_TIMEOUT_SECS",
                DEFAULT_HANDSHAKE_TIMEOUT_SECS,
            )?,
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .ok()
                .filter(|v| !v.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Arguments
    /// * `path` - Path to the YAML configuration file
    ///
    /// # Errors
    /// Returns `ConfigError` if the file is malformed, environment variables
    /// have invalid formats, or validation fails.
    pub fn from_file(path: &PathBuf) -> RelayResult<Self> {
        let yaml = YamlConfig::from_file(path)?;
        let mut config = Self::from_env()?;
        config.apply_yaml(yaml);
        config.validate()?;
        Ok(config)
    }

    /// Apply YAML overrides on top of this configuration
    pub fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(server) = yaml.server {
            if let Some(host) = server.host {
                self.host = host;
            }
            if let Some(port) = server.port {
                self.port = port;
            }
        }
        if let Some(openai) = yaml.openai {
            if let Some(key) = openai.api_key {
                self.openai_api_key = Some(key);
            }
            if let Some(endpoint) = openai.realtime_url {
                self.openai_realtime_url = endpoint;
            }
            if let Some(model) = openai.model {
                self.openai_realtime_model = model;
            }
        }
        if let Some(relay) = yaml.relay {
            if let Some(secs) = relay.handshake_timeout_secs {
                self.handshake_timeout_secs = secs;
            }
        }
        if let Some(security) = yaml.security {
            if let Some(origins) = security.cors_allowed_origins {
                self.cors_allowed_origins = Some(origins);
            }
        }
    }

    /// Validate the assembled configuration
    ///
    /// Checks that the upstream endpoint is a valid ws:// or wss:// URL and
    /// that the handshake timeout is non-zero.
    pub fn validate(&self) -> RelayResult<()> {
        let parsed = url::Url::parse(&self.openai_realtime_url).map_err(|e| {
            RelayError::ConfigError(format!(
                "invalid OPENAI_REALTIME_URL '{}': {e}",
                self.openai_realtime_url
            ))
        })?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(RelayError::ConfigError(format!(
                "OPENAI_REALTIME_URL must use ws:// or wss://, got '{}://'",
                parsed.scheme()
            )));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(RelayError::ConfigError(
                "HANDSHAKE_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the upstream bearer credential
    ///
    /// # Returns
    /// * `RelayResult<String>` - The API key on success, or `ConfigError` when unset
    pub fn require_api_key(&self) -> RelayResult<String> {
        self.openai_api_key.as_ref().cloned().ok_or_else(|| {
            RelayError::ConfigError(
                "OpenAI API key not configured in server environment".to_string(),
            )
        })
    }
}

/// Parse an environment variable, falling back to a default when unset or empty.
fn parse_env_var<T: std::str::FromStr>(name: &str, default: T) -> RelayResult<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|e| RelayError::ConfigError(format!("invalid {name} '{raw}': {e}"))),
        _ => Ok(default),
    }
}
