//! Controller catalog - display metadata for controller IDs
//!
//! Topologies only refer to controllers by ID. The catalog maps those IDs to
//! labels and images for presentation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read controller catalog: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse controller catalog: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// Display metadata for one controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerInfo {
    /// Controller ID as used in topologies (e.g., "game.controller.snes")
    pub id: String,
    /// Human-readable name
    pub label: String,
    /// Path to an image of the controller
    #[serde(default)]
    pub image: Option<String>,
    /// One-line description shown next to the label
    #[serde(default)]
    pub description: Option<String>,
}

/// Lookup of controller metadata by ID
pub trait ControllerCatalog {
    fn controller(&self, controller_id: &str) -> Option<&ControllerInfo>;

    /// Label for a controller, falling back to its ID
    fn label<'a>(&'a self, controller_id: &'a str) -> &'a str {
        self.controller(controller_id)
            .map(|info| info.label.as_str())
            .unwrap_or(controller_id)
    }
}

/// TOML-backed controller catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerIndex {
    /// Version of the catalog format
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub controller: Vec<ControllerInfo>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for ControllerIndex {
    fn default() -> Self {
        Self {
            version: default_version(),
            controller: Vec::new(),
        }
    }
}

impl ControllerIndex {
    /// Load a catalog from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        let index: ControllerIndex = toml::from_str(content)?;
        Ok(index)
    }
}

impl ControllerCatalog for ControllerIndex {
    fn controller(&self, controller_id: &str) -> Option<&ControllerInfo> {
        // IDs are matched case-insensitively
        self.controller
            .iter()
            .find(|info| info.id.eq_ignore_ascii_case(controller_id))
    }
}
