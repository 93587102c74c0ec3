//! Ports: the attachment points of a controller topology

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hub::ControllerNode;

/// Kind of device a port accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortType {
    /// Game controllers, multitaps and other hubs
    #[default]
    Controller,
    /// Keyboard port
    Keyboard,
    /// Mouse port
    Mouse,
}

impl PortType {
    /// Parse the value of a `type` attribute
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "controller" => Some(Self::Controller),
            "keyboard" => Some(Self::Keyboard),
            "mouse" => Some(Self::Mouse),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Keyboard => "keyboard",
            Self::Mouse => "mouse",
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat view of a port: its ID and the controllers it directly accepts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalPort {
    pub port_id: String,
    pub accepted_controllers: Vec<String>,
}

impl PhysicalPort {
    pub fn new(port_id: String, accepted_controllers: Vec<String>) -> Self {
        Self {
            port_id,
            accepted_controllers,
        }
    }

    /// Check if a controller can be plugged directly into this port
    pub fn is_compatible(&self, controller_id: &str) -> bool {
        self.accepted_controllers.iter().any(|c| c == controller_id)
    }
}

/// A single attachment point in a controller tree
///
/// A port lists the controllers that are compatible with it. While the port
/// is connected, one of them is active; that controller's own hub (for a
/// multitap) holds further ports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortNode {
    port_type: PortType,
    port_id: String,
    address: String,
    connected: bool,
    active: usize,
    controllers: Vec<ControllerNode>,
}

impl PortNode {
    /// Create a port with the given ID and no compatible controllers
    pub fn new(port_id: impl Into<String>) -> Self {
        Self {
            port_id: port_id.into(),
            ..Self::default()
        }
    }

    pub fn port_type(&self) -> PortType {
        self.port_type
    }

    pub fn set_port_type(&mut self, port_type: PortType) {
        self.port_type = port_type;
    }

    pub fn port_id(&self) -> &str {
        &self.port_id
    }

    pub fn set_port_id(&mut self, port_id: impl Into<String>) {
        self.port_id = port_id.into();
    }

    /// Full path of this port from the tree root, e.g. `/1/multitap/2`
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn set_address(&mut self, address: impl Into<String>) {
        self.address = address.into();
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Index of the active controller. Stale while the port is disconnected.
    pub fn active_index(&self) -> usize {
        self.active
    }

    /// Select the active controller by index, rejecting out-of-range values
    pub fn set_active_controller(&mut self, index: usize) -> bool {
        if index < self.controllers.len() {
            self.active = index;
            true
        } else {
            false
        }
    }

    /// Currently active controller, if the port is connected
    pub fn active_controller(&self) -> Option<&ControllerNode> {
        if self.connected {
            self.controllers.get(self.active)
        } else {
            None
        }
    }

    pub fn active_controller_mut(&mut self) -> Option<&mut ControllerNode> {
        if self.connected {
            self.controllers.get_mut(self.active)
        } else {
            None
        }
    }

    pub fn compatible_controllers(&self) -> &[ControllerNode] {
        &self.controllers
    }

    pub fn compatible_controllers_mut(&mut self) -> &mut [ControllerNode] {
        &mut self.controllers
    }

    pub fn set_compatible_controllers(&mut self, controllers: Vec<ControllerNode>) {
        self.controllers = controllers;
    }

    /// Position of a directly compatible controller
    pub fn find_controller(&self, controller_id: &str) -> Option<usize> {
        self.controllers
            .iter()
            .position(|c| c.controller_id() == controller_id)
    }

    /// Check if a controller is accepted by this port or by any port nested
    /// below one of its compatible controllers
    pub fn is_controller_accepted(&self, controller_id: &str) -> bool {
        if self.physical_port().is_compatible(controller_id) {
            return true;
        }

        self.controllers
            .iter()
            .any(|node| node.is_controller_accepted(controller_id))
    }

    /// Check if the port at `port_address` accepts a controller, searching
    /// this port and the ports nested below it
    pub fn is_controller_accepted_at(&self, port_address: &str, controller_id: &str) -> bool {
        if self.address == port_address {
            return self.physical_port().is_compatible(controller_id);
        }

        self.controllers
            .iter()
            .any(|node| node.is_controller_accepted_at(port_address, controller_id))
    }

    /// Project this port onto its ID and directly accepted controllers
    pub fn physical_port(&self) -> PhysicalPort {
        let accepts = self
            .controllers
            .iter()
            .map(|node| node.controller_id().to_string())
            .collect();

        PhysicalPort::new(self.port_id.clone(), accepts)
    }
}
