//! Runtime port state
//!
//! The port manager owns a live copy of a controller tree and tracks which
//! controller is plugged into each port. State is persisted separately from
//! topology definitions, in a `ports.xml` per topology:
//!
//! ```xml
//! <ports>
//!   <port id="1" address="/1" connected="true" controller="multitap">
//!     <controller id="multitap">
//!       <port id="1" address="/1/multitap/1" connected="true" controller="gamepad"/>
//!     </controller>
//!   </port>
//! </ports>
//! ```

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::hub::ControllerTree;
use crate::port::PortNode;

/// Port state file in a topology's state directory
pub const PORTS_XML_FILE: &str = "ports.xml";

/// Directory in the profile holding one state directory per topology ID
pub const PORT_STATE_DIRECTORY: &str = "ports";

#[derive(Error, Debug)]
pub enum PortManagerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse port state: {0}")]
    ParseError(String),
    #[error("Failed to serialize port state: {0}")]
    SerializeError(String),
    #[error("No port at address {0}")]
    PortNotFound(String),
    #[error("Port {address} doesn't accept controller {controller}")]
    ControllerNotAccepted { address: String, controller: String },
    #[error("Port {0} has no controller to connect")]
    NoController(String),
}

/// `<port>` element of the state file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortStateElement {
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(rename = "@address", default)]
    pub address: String,
    #[serde(rename = "@connected", default)]
    pub connected: bool,
    #[serde(rename = "@controller", default, skip_serializing_if = "Option::is_none")]
    pub controller_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<ControllerStateElement>,
}

/// `<controller>` element: the active controller of a connected port
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerStateElement {
    #[serde(rename = "@id", default)]
    pub id: String,
    #[serde(default)]
    pub port: Vec<PortStateElement>,
}

/// Root `<ports>` element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "ports")]
pub struct PortsDocument {
    #[serde(default)]
    pub port: Vec<PortStateElement>,
}

/// Live connection state over a controller tree
pub struct PortManager {
    controller_tree: ControllerTree,
    xml_path: PathBuf,
}

impl PortManager {
    /// Create a port manager storing its state in the given directory
    pub fn new(state_dir: &Path) -> Self {
        Self {
            controller_tree: ControllerTree::new(),
            xml_path: state_dir.join(PORTS_XML_FILE),
        }
    }

    /// Create a port manager for a registered topology, keeping its state
    /// apart from every other topology in the profile
    pub fn for_topology(profile_dir: &Path, topology_id: u32) -> Self {
        Self::new(
            &profile_dir
                .join(PORT_STATE_DIRECTORY)
                .join(topology_id.to_string()),
        )
    }

    pub fn xml_path(&self) -> &Path {
        &self.xml_path
    }

    pub fn controller_tree(&self) -> &ControllerTree {
        &self.controller_tree
    }

    pub fn set_controller_tree(&mut self, controller_tree: ControllerTree) {
        self.controller_tree = controller_tree;
    }

    pub fn clear(&mut self) {
        self.controller_tree.clear();
    }

    /// Connect or disconnect the port at `port_address`
    ///
    /// Connecting requires a controller the port accepts; `None` reconnects
    /// the last active controller. A newly active hub controller has its
    /// ports connected to their first controller. Disconnecting disconnects
    /// every descendant port first. On error nothing changes.
    pub fn connect_controller(
        &mut self,
        port_address: &str,
        connected: bool,
        controller_id: Option<&str>,
    ) -> Result<(), PortManagerError> {
        let port = find_port_mut(self.controller_tree.ports_mut(), port_address)
            .ok_or_else(|| PortManagerError::PortNotFound(port_address.to_string()))?;

        if !connected {
            disconnect_port(port);
            debug!(port = %port_address, "Disconnected port");
            return Ok(());
        }

        let index = match controller_id {
            Some(id) => port.find_controller(id).ok_or_else(|| {
                PortManagerError::ControllerNotAccepted {
                    address: port_address.to_string(),
                    controller: id.to_string(),
                }
            })?,
            None if port.active_index() < port.compatible_controllers().len() => {
                port.active_index()
            }
            None => return Err(PortManagerError::NoController(port_address.to_string())),
        };

        if port.is_connected() {
            if port.active_index() == index {
                return Ok(());
            }
            disconnect_port(port);
        }

        connect_port(port, index);
        debug!(
            port = %port_address,
            controller = ?port.active_controller().map(|c| c.controller_id()),
            "Connected port"
        );
        Ok(())
    }

    /// Restore saved state onto the current tree
    ///
    /// Returns the number of ports restored. A missing file restores
    /// nothing. Saved ports that no longer match the tree are skipped.
    pub fn load_xml(&mut self) -> Result<usize, PortManagerError> {
        if !self.xml_path.exists() {
            debug!(path = %self.xml_path.display(), "Can't load ports, file doesn't exist");
            return Ok(0);
        }

        info!(path = %self.xml_path.display(), "Loading ports");

        let content = std::fs::read_to_string(&self.xml_path)?;
        let document: PortsDocument =
            from_str(&content).map_err(|e| PortManagerError::ParseError(e.to_string()))?;

        let restored = restore_ports(self.controller_tree.ports_mut(), &document.port);
        info!(count = restored, "Restored port state");
        Ok(restored)
    }

    /// Write the current state
    pub fn save_xml(&self) -> Result<(), PortManagerError> {
        let document = PortsDocument {
            port: port_states(self.controller_tree.ports()),
        };
        let xml =
            to_string(&document).map_err(|e| PortManagerError::SerializeError(e.to_string()))?;

        if let Some(parent) = self.xml_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.xml_path, format!("<?xml version='1.0'?>\n{}", xml))?;

        debug!(path = %self.xml_path.display(), "Saved ports");
        Ok(())
    }
}

/// Find a port among top-level ports and the hubs of active controllers
fn find_port_mut<'a>(ports: &'a mut [PortNode], address: &str) -> Option<&'a mut PortNode> {
    for port in ports {
        if port.address() == address {
            return Some(port);
        }
        if let Some(controller) = port.active_controller_mut() {
            if let Some(found) = find_port_mut(controller.hub_mut().ports_mut(), address) {
                return Some(found);
            }
        }
    }
    None
}

fn connect_port(port: &mut PortNode, index: usize) {
    if !port.set_active_controller(index) {
        return;
    }
    port.set_connected(true);

    if let Some(controller) = port.active_controller_mut() {
        for child in controller.hub_mut().ports_mut() {
            if !child.compatible_controllers().is_empty() {
                connect_port(child, 0);
            }
        }
    }
}

fn disconnect_port(port: &mut PortNode) {
    if let Some(controller) = port.active_controller_mut() {
        for child in controller.hub_mut().ports_mut() {
            disconnect_port(child);
        }
    }
    port.set_connected(false);
}

fn port_states(ports: &[PortNode]) -> Vec<PortStateElement> {
    ports
        .iter()
        .map(|port| {
            let active = port.active_controller();
            PortStateElement {
                id: port.port_id().to_string(),
                address: port.address().to_string(),
                connected: active.is_some(),
                controller_id: active.map(|c| c.controller_id().to_string()),
                controller: active.map(|c| ControllerStateElement {
                    id: c.controller_id().to_string(),
                    port: port_states(c.hub().ports()),
                }),
            }
        })
        .collect()
}

fn restore_ports(ports: &mut [PortNode], states: &[PortStateElement]) -> usize {
    let mut restored = 0;

    for state in states {
        let Some(port) = ports.iter_mut().find(|p| p.address() == state.address) else {
            warn!(address = %state.address, "Saved port not in topology, skipping");
            continue;
        };

        if !state.connected {
            disconnect_port(port);
            restored += 1;
            continue;
        }

        let Some(controller_id) = state.controller_id.as_deref() else {
            warn!(address = %state.address, "Saved port has no controller, skipping");
            continue;
        };

        let Some(index) = port.find_controller(controller_id) else {
            warn!(
                address = %state.address,
                controller = %controller_id,
                "Saved controller not accepted by port, skipping"
            );
            continue;
        };

        if port.is_connected() {
            disconnect_port(port);
        }
        // Child ports start out like a fresh connection, then take their
        // saved state if there is any
        connect_port(port, index);
        restored += 1;

        if let (Some(controller), Some(saved)) = (port.active_controller_mut(), &state.controller) {
            restored += restore_ports(controller.hub_mut().ports_mut(), &saved.port);
        }
    }

    restored
}
