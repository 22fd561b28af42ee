// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Invocation state and configuration persistence for k8db
//!
//! `Global` is the fully resolved state of one CLI invocation: namespace,
//! dialect, elected pod, connection parameters. It is assembled by the
//! discovery phase and treated as read-only by the actions.
//!
//! `Config` stores user preferences under ~/.k8db/config.json.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::dialect::Dialect;

/// Get the base k8db directory (~/.k8db/)
pub fn base_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".k8db"))
        .context("Could not determine home directory")
}

/// Resolved state of one invocation. Built once during discovery; the
/// streaming pipeline never mutates it.
#[derive(Debug, Clone)]
pub struct Global {
    /// Kubeconfig context, if overridden.
    pub context: Option<String>,
    pub namespace: String,
    pub dialect: Dialect,
    /// The elected database pod.
    pub pod_name: String,
    /// Disposable job pod hosting the client binaries, when one was created.
    pub job_pod_name: Option<String>,
    /// Host the client binary connects to. 127.0.0.1 when exec'ing into the
    /// database pod itself, the pod IP when running from a job pod.
    pub host: String,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Run the gzip stage inside the cluster (true) or locally (false).
    pub remote_gzip: bool,
    pub quiet: bool,
}

impl Global {
    /// The pod remote commands are exec'd into.
    pub fn exec_target(&self) -> &str {
        self.job_pod_name.as_deref().unwrap_or(&self.pod_name)
    }
}

/// k8db configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Default kubeconfig context for k8db invocations
    #[serde(default)]
    pub context: Option<String>,
    /// Default for --remote-gzip
    #[serde(default)]
    pub remote_gzip: Option<bool>,
}

impl Config {
    /// Load config from disk, or return default if not found
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get the config file path (~/.k8db/config.json)
    pub fn config_path() -> Result<PathBuf> {
        Ok(base_dir()?.join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.context.is_none());
        assert!(config.remote_gzip.is_none());
    }

    #[test]
    fn test_config_deserialize_empty() {
        let json = "{}";
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.context.is_none());
    }

    #[test]
    fn test_config_roundtrip() {
        let original = Config {
            context: Some("prod".to_string()),
            remote_gzip: Some(false),
        };
        let json = serde_json::to_string_pretty(&original).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.context.as_deref(), Some("prod"));
        assert_eq!(parsed.remote_gzip, Some(false));
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let config = Config {
            context: Some("staging".to_string()),
            remote_gzip: None,
        };
        let content = serde_json::to_string_pretty(&config).unwrap();
        fs::write(&config_path, content).unwrap();

        let loaded_content = fs::read_to_string(&config_path).unwrap();
        let loaded: Config = serde_json::from_str(&loaded_content).unwrap();
        assert_eq!(loaded.context.as_deref(), Some("staging"));
    }
}
