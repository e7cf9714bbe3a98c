// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object model configuration.
//!
//! Supports both programmatic and file-based configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectConfig {
    /// Version-skew handling of the wire serializer.
    #[serde(default)]
    pub serializer: SerializerConfig,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Wire serializer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializerConfig {
    /// Retry hydration with PATCH dropped when the exact version is
    /// unknown.
    #[serde(default = "default_true")]
    pub tolerate_patch_skew: bool,

    /// Ask the backport authority for an older version when hydration
    /// still fails.
    #[serde(default = "default_true")]
    pub request_backport: bool,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            tolerate_patch_skew: true,
            request_backport: true,
        }
    }
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            serializer: SerializerConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl ObjectConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Unknown log level '{}' (expected one of {})",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// The default configuration rendered as TOML.
    pub fn example_toml() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Self::default())?)
    }
}
