//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (applied by the binary, highest precedence)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PuppetryError, Result};
use crate::notation::Notation;
use crate::pose::TransmitConfig;
use crate::relay::RelayConfig;
use crate::session::SessionConfig;

/// Environment variable overriding the session host.
pub const ENV_HOST: &str = "PUPPETRY_HOST";
/// Environment variable overriding the session port.
pub const ENV_PORT: &str = "PUPPETRY_PORT";
/// Environment variable overriding the relay host.
pub const ENV_RELAY_HOST: &str = "PUPPETRY_RELAY_HOST";
/// Environment variable overriding the relay port.
pub const ENV_RELAY_PORT: &str = "PUPPETRY_RELAY_PORT";
/// Environment variable overriding the payload notation.
pub const ENV_NOTATION: &str = "PUPPETRY_NOTATION";
/// Environment variable overriding the sampling interval.
pub const ENV_INTERVAL_MS: &str = "PUPPETRY_INTERVAL_MS";

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Session client configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Relay server configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Joint transmit configuration
    #[serde(default)]
    pub transmit: TransmitConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            PuppetryError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content)
            .map_err(|e| PuppetryError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config file location (`<config dir>/puppetry/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("puppetry").join("config.toml"))
    }

    /// Load from `path`, or the default location if it exists, then apply
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `PUPPETRY_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup(ENV_HOST) {
            self.session.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.session.port = parse_var(ENV_PORT, &port)?;
        }
        if let Some(host) = lookup(ENV_RELAY_HOST) {
            self.relay.host = host;
        }
        if let Some(port) = lookup(ENV_RELAY_PORT) {
            self.relay.port = parse_var(ENV_RELAY_PORT, &port)?;
        }
        if let Some(notation) = lookup(ENV_NOTATION) {
            self.session.notation = parse_var::<Notation>(ENV_NOTATION, &notation)?;
        }
        if let Some(ms) = lookup(ENV_INTERVAL_MS) {
            let ms: u64 = parse_var(ENV_INTERVAL_MS, &ms)?;
            self.transmit
                .set_interval(std::time::Duration::from_millis(ms));
        }
        Ok(())
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.relay.validate()
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PuppetryError::Config(format!("Failed to serialize config: {e}")))
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| PuppetryError::Config(format!("{name}={value:?}: {e}")))
}
