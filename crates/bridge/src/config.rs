//! Bridge daemon configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub bridge: BridgeSettings,
    /// Permission prompt behaviour
    #[serde(default)]
    pub permission: PermissionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Unix socket the daemon listens on; `None` picks the runtime-dir
    /// default
    pub socket_path: Option<String>,
    pub log_level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionSettings {
    /// Seconds before a pending permission wait resolves as denied
    /// If None, waits indefinitely for the broker decision
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeSettings {
                socket_path: None,
                log_level: "info".to_string(),
            },
            permission: PermissionSettings::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/accessory-bridge/bridge.toml"),
            ];

            Self::first_existing(candidates)?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: BridgeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// First candidate path that exists on disk
    ///
    /// Whether a missing file is an error is the caller's call, so the
    /// message reports only the lookup failure.
    fn first_existing(candidates: Vec<PathBuf>) -> Result<PathBuf> {
        candidates
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| anyhow!("No configuration file found"))
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("accessory-bridge").join("bridge.toml")
        } else {
            PathBuf::from(".config/accessory-bridge/bridge.toml")
        }
    }

    /// Resolve the socket path, expanding `~` in configured values
    pub fn socket_path(&self) -> PathBuf {
        match &self.bridge.socket_path {
            Some(path) => PathBuf::from(shellexpand::tilde(path).as_ref()),
            None => {
                let dir = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
                dir.join("accessory-bridge.sock")
            }
        }
    }

    /// Permission wait timeout, if one is configured
    pub fn permission_timeout(&self) -> Option<Duration> {
        self.permission.timeout_secs.map(Duration::from_secs)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.bridge.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.bridge.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.permission.timeout_secs == Some(0) {
            return Err(anyhow!(
                "permission.timeout_secs must be positive; omit it to wait indefinitely"
            ));
        }

        Ok(())
    }
}
