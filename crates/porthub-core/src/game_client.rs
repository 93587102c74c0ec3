//! Game clients that declare a controller topology

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Subdirectory of a game client holding its resources
pub const GAME_CLIENT_RESOURCES_DIRECTORY: &str = "resources";

/// Topology file shipped by a game client
pub const TOPOLOGY_XML_FILE: &str = "topology.xml";

/// An installed game client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameClient {
    /// Game client ID, e.g. `game.libretro.snes9x`
    pub id: String,
    /// Installed share path
    pub path: PathBuf,
    /// Library path; falls back to `path` when not configured
    #[serde(default)]
    pub lib_path: Option<PathBuf>,
}

impl GameClient {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            lib_path: None,
        }
    }

    pub fn with_lib_path(mut self, lib_path: impl Into<PathBuf>) -> Self {
        self.lib_path = Some(lib_path.into());
        self
    }

    /// Candidate topology files, in search order
    pub fn topology_candidates(&self) -> Vec<PathBuf> {
        let lib_path = self.lib_path.as_ref().unwrap_or(&self.path);
        vec![
            self.path
                .join(GAME_CLIENT_RESOURCES_DIRECTORY)
                .join(TOPOLOGY_XML_FILE),
            lib_path
                .join(GAME_CLIENT_RESOURCES_DIRECTORY)
                .join(TOPOLOGY_XML_FILE),
        ]
    }

    /// First candidate topology file that exists
    pub fn find_topology_file(&self) -> Option<PathBuf> {
        self.topology_candidates().into_iter().find(|p| p.exists())
    }
}
