// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of BlueFTC.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Controller connection configuration

use crate::errors::{BlueforsError, BlueforsResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_LEGACY_PORT: u16 = 5001;
pub const DEFAULT_MAPPER_PORT: u16 = 49098;
pub const DEFAULT_HEATER_ID: &str = "sample";

const TOML_CONFIG: &str = "bluefors.toml";
const JSON_CONFIG: &str = "bluefors.json";

fn default_true() -> bool {
    true
}

fn default_legacy_port() -> u16 {
    DEFAULT_LEGACY_PORT
}

fn default_mapper_port() -> u16 {
    DEFAULT_MAPPER_PORT
}

fn default_heater_id() -> String {
    DEFAULT_HEATER_ID.to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlueforsConfig {
    /// Channel/heater REST API of the temperature controller itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy: Option<LegacyConfig>,

    /// Values API of the Bluefors control software
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapper: Option<MapperConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyConfig {
    pub ip: String,

    #[serde(default = "default_legacy_port")]
    pub port: u16,
}

impl LegacyConfig {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port: DEFAULT_LEGACY_PORT,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapperConfig {
    pub ip: String,

    #[serde(default = "default_mapper_port")]
    pub port: u16,

    /// API key appended to every values request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Temperature channel of the mixing chamber sensor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixing_chamber_channel_id: Option<u32>,

    /// Heater mapping under `mapper.heater_mappings_bftc.device`
    #[serde(default = "default_heater_id")]
    pub heater_id: String,

    #[serde(default = "default_true")]
    pub use_tls: bool,

    /// The control software ships with a self-signed certificate
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,
}

impl MapperConfig {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port: DEFAULT_MAPPER_PORT,
            key: None,
            mixing_chamber_channel_id: None,
            heater_id: default_heater_id(),
            use_tls: true,
            accept_invalid_certs: true,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_mixing_chamber_channel(mut self, channel: u32) -> Self {
        self.mixing_chamber_channel_id = Some(channel);
        self
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional log file written alongside stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl BlueforsConfig {
    /// Load configuration from an explicit path, or from `bluefors.toml` /
    /// `bluefors.json` in the working directory, falling back to defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> BlueforsResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::from_working_dir()?,
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> BlueforsResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BlueforsError::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            serde_json::from_str(&content).map_err(|e| {
                BlueforsError::ConfigError(format!("Failed to parse {}: {e}", path.display()))
            })?
        } else {
            toml::from_str(&content).map_err(|e| {
                BlueforsError::ConfigError(format!("Failed to parse {}: {e}", path.display()))
            })?
        };

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn from_working_dir() -> BlueforsResult<Self> {
        for candidate in [TOML_CONFIG, JSON_CONFIG] {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::from_file(path);
            }
        }

        warn!("No configuration file found, using defaults with environment overrides");
        Ok(Self::default())
    }

    /// Apply `BLUEFORS_*` overrides. Connection overrides target the mapper
    /// section and create it when an address is given.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ip) = lookup("BLUEFORS_IP") {
            match self.mapper.as_mut() {
                Some(mapper) => mapper.ip = ip,
                None => self.mapper = Some(MapperConfig::new(ip)),
            }
        }

        if let Some(ip) = lookup("BLUEFORS_LEGACY_IP") {
            match self.legacy.as_mut() {
                Some(legacy) => legacy.ip = ip,
                None => self.legacy = Some(LegacyConfig::new(ip)),
            }
        }

        if let Some(mapper) = self.mapper.as_mut() {
            if let Some(port) = lookup("BLUEFORS_PORT").and_then(|p| p.parse().ok()) {
                mapper.port = port;
            }
            if let Some(key) = lookup("BLUEFORS_KEY") {
                mapper.key = Some(key);
            }
            if let Some(channel) = lookup("BLUEFORS_MXC_CHANNEL").and_then(|c| c.parse().ok()) {
                mapper.mixing_chamber_channel_id = Some(channel);
            }
            if let Some(heater_id) = lookup("BLUEFORS_HEATER_ID") {
                mapper.heater_id = heater_id;
            }
        }

        if let Some(level) = lookup("BLUEFORS_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> BlueforsResult<()> {
        if let Some(legacy) = &self.legacy {
            check_address("legacy", &legacy.ip, legacy.port)?;
        }

        if let Some(mapper) = &self.mapper {
            check_address("mapper", &mapper.ip, mapper.port)?;
            if mapper.heater_id.trim().is_empty() {
                return Err(BlueforsError::ConfigError(
                    "mapper.heater_id must not be empty".to_owned(),
                ));
            }
        }

        Ok(())
    }

    pub fn to_toml(&self) -> BlueforsResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| BlueforsError::ConfigError(format!("Failed to serialize config: {e}")))
    }
}

fn check_address(section: &str, ip: &str, port: u16) -> BlueforsResult<()> {
    if ip.trim().is_empty() {
        return Err(BlueforsError::ConfigError(format!(
            "{section}.ip must not be empty"
        )));
    }
    if port == 0 {
        return Err(BlueforsError::ConfigError(format!(
            "{section}.port must be non-zero"
        )));
    }
    Ok(())
}
