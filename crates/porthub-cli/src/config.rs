//! Configuration loading

use anyhow::Result;
use porthub_core::GameClient;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profile: ProfileConfig,
    #[serde(default)]
    pub controllers: ControllersConfig,
    #[serde(default, rename = "game_client")]
    pub game_clients: Vec<GameClient>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Directory holding gametopologies.xml and ports.xml
    #[serde(default = "default_profile_path")]
    pub path: PathBuf,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            path: default_profile_path(),
        }
    }
}

fn default_profile_path() -> PathBuf {
    PathBuf::from("./profile")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllersConfig {
    /// Path to the controller catalog
    #[serde(default = "default_controllers_path")]
    pub path: PathBuf,
}

impl Default for ControllersConfig {
    fn default() -> Self {
        Self {
            path: default_controllers_path(),
        }
    }
}

fn default_controllers_path() -> PathBuf {
    PathBuf::from("./controllers.toml")
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(
            path = %path.display(),
            game_clients = config.game_clients.len(),
            "Loaded configuration"
        );
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config(&temp_dir.path().join("porthub.toml")).unwrap();
        assert_eq!(config.profile.path, PathBuf::from("./profile"));
        assert_eq!(config.controllers.path, PathBuf::from("./controllers.toml"));
        assert!(config.game_clients.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("porthub.toml");
        std::fs::write(
            &path,
            r#"
[profile]
path = "/var/lib/porthub"

[[game_client]]
id = "game.libretro.snes9x"
path = "/usr/share/porthub/addons/game.libretro.snes9x"
lib_path = "/usr/lib/porthub/addons/game.libretro.snes9x"

[[game_client]]
id = "game.libretro.bsnes"
path = "/usr/share/porthub/addons/game.libretro.bsnes"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.profile.path, PathBuf::from("/var/lib/porthub"));
        assert_eq!(config.controllers.path, PathBuf::from("./controllers.toml"));
        assert_eq!(config.game_clients.len(), 2);
        assert_eq!(config.game_clients[0].id, "game.libretro.snes9x");
        assert!(config.game_clients[0].lib_path.is_some());
        assert!(config.game_clients[1].lib_path.is_none());
    }
}
