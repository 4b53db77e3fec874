//! Configuration
//!
//! Persistent settings live in `config.toml` inside the data directory,
//! next to the keystore and the local registries. The active identity is
//! remembered here so a `use` choice survives across invocations.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dispatch::RunMode;
use crate::error::PipelineError;

const CONFIG_FILE: &str = "config.toml";

/// Persistent utility configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network name, informational
    pub network: String,
    /// JSON-RPC endpoint used in online mode
    pub rpc_endpoint: String,
    /// Default run mode
    pub mode: RunMode,
    /// Address of the identity activated by `identity use`
    pub active_identity: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: "meridian-testnet".to_string(),
            rpc_endpoint: "http://127.0.0.1:18545".to_string(),
            mode: RunMode::Offline,
            active_identity: None,
        }
    }
}

impl Config {
    /// Load from the data directory, falling back to defaults when absent
    pub fn load(data_dir: &Path) -> Result<Self, PipelineError> {
        let path = data_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path).map_err(|e| {
            PipelineError::Storage(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw).map_err(|e| {
            PipelineError::Storage(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Persist to the data directory
    pub fn save(&self, data_dir: &Path) -> Result<(), PipelineError> {
        fs::create_dir_all(data_dir)?;

        let raw = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Storage(format!("failed to encode config: {e}")))?;
        fs::write(data_dir.join(CONFIG_FILE), raw)?;
        Ok(())
    }

    /// Remove the config file, restoring defaults on the next load
    pub fn reset(data_dir: &Path) -> Result<(), PipelineError> {
        let path = data_dir.join(CONFIG_FILE);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Set one settable key by name.
    ///
    /// `active_identity` is managed by `identity use`, not settable here.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), PipelineError> {
        match key {
            "network" => self.network = value.to_string(),
            "rpc_endpoint" => self.rpc_endpoint = value.to_string(),
            "mode" => self.mode = value.parse()?,
            other => {
                return Err(PipelineError::InvalidPayload(format!(
                    "unknown config key: {other} (expected network, rpc_endpoint, or mode)"
                )));
            }
        }
        Ok(())
    }

    /// Key/value pairs for display
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("network", self.network.clone()),
            ("rpc_endpoint", self.rpc_endpoint.clone()),
            ("mode", self.mode.to_string()),
            (
                "active_identity",
                self.active_identity.clone().unwrap_or_else(|| "-".into()),
            ),
        ]
    }
}

/// Default data directory (`~/.meridian-wallet`)
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".meridian-wallet")
}

pub fn keystore_path(data_dir: &Path) -> PathBuf {
    data_dir.join("keystore.json")
}

pub fn tokens_path(data_dir: &Path) -> PathBuf {
    data_dir.join("tokens.json")
}

pub fn domains_path(data_dir: &Path) -> PathBuf {
    data_dir.join("domains.json")
}
