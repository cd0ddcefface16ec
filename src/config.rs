//! Application configuration.
//!
//! Loaded from `config.toml` in the config directory; every field has a
//! default so a missing file or a partial file both work.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::mobilize::DEFAULT_GATEWAY;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Reader gateway used for full-text extraction.
    pub gateway: String,
    /// Terminal width (columns) at which the sidebar appears.
    pub two_column_min_width: u16,
    /// Socket addresses probed by the connectivity check.
    pub connectivity_probes: Vec<String>,
    /// Per-probe connect timeout in milliseconds.
    pub probe_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: DEFAULT_GATEWAY.to_string(),
            two_column_min_width: 110,
            connectivity_probes: vec!["1.1.1.1:53".to_string(), "8.8.8.8:53".to_string()],
            probe_timeout_ms: 800,
        }
    }
}

impl Config {
    /// Load the config file, falling back to defaults when it is absent.
    ///
    /// A present-but-invalid file is an error: silently ignoring a typo'd
    /// config would be harder to diagnose than refusing to start.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.gateway, DEFAULT_GATEWAY);
        assert!(config.two_column_min_width > 0);
        assert!(!config.connectivity_probes.is_empty());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str("two_column_min_width = 80").unwrap();
        assert_eq!(config.two_column_min_width, 80);
        assert_eq!(config.gateway, DEFAULT_GATEWAY);
    }

    #[test]
    fn full_file_roundtrips() {
        let config = Config {
            gateway: "https://reader.example.com".to_string(),
            two_column_min_width: 120,
            connectivity_probes: vec!["9.9.9.9:53".to_string()],
            probe_timeout_ms: 250,
        };
        let raw = toml::to_string(&config).unwrap();
        assert_eq!(toml::from_str::<Config>(&raw).unwrap(), config);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = Config::load(Path::new("/nonexistent/lectern/config.toml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
