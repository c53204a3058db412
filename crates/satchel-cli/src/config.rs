//! Persistent CLI configuration and path resolution.

use std::path::{Path, PathBuf};

use satchel_core::{EngineConfig, RemoteConfig};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "config.json";
const APP_DIR: &str = "satchel";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            version: default_config_version(),
            engine: EngineConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE_NAME))
        .ok_or_else(|| "Failed to resolve CLI config directory".to_string())
}

pub fn default_db_path() -> Result<PathBuf, String> {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR).join("satchel.db"))
        .ok_or_else(|| "Failed to resolve CLI data directory".to_string())
}

/// `--db-path`, then `SATCHEL_DB_PATH`, then the platform data directory
pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, String> {
    if let Some(path) = cli_db_path.or_else(|| std::env::var_os("SATCHEL_DB_PATH").map(PathBuf::from))
    {
        return Ok(path);
    }
    default_db_path()
}

impl CliConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Engine settings with environment overrides applied
    pub fn engine_config(&self) -> EngineConfig {
        self.engine.clone().with_env_overrides()
    }

    /// Environment values win over the config file
    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig::from_env().or(self.remote.clone())
    }

    fn normalize(&mut self) {
        self.remote = self.remote.clone().normalized();
        if let Some(owner) = self.engine.owner_id.take() {
            self.engine = self.engine.clone().with_owner(owner);
        }
    }
}
