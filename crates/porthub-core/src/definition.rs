//! Topology definition XML parsing and serialization
//!
//! A definition is the static description of a controller tree: which ports
//! exist and which controllers each port accepts. The same element layout
//! is used as the body of a game client's `topology.xml` and inside the
//! `<definition>` element of the topology registry:
//!
//! ```xml
//! <logicaltopology playerlimit="4">
//!   <port type="controller" id="1">
//!     <accepts controller="game.controller.snes"/>
//!     <accepts controller="game.controller.snes.multitap">
//!       <port type="controller" id="1">
//!         <accepts controller="game.controller.snes"/>
//!       </port>
//!     </accepts>
//!   </port>
//! </logicaltopology>
//! ```

use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::se::to_string_with_root;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::hub::{ControllerHub, ControllerNode, ControllerTree};
use crate::port::{PortNode, PortType};

/// Root element of a game client's topology file
pub const XML_ELM_TOPOLOGY: &str = "logicaltopology";

#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Failed to parse topology definition: {0}")]
    ParseError(String),
    #[error("Failed to serialize topology definition: {0}")]
    SerializeError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Can't find root <{0}> tag")]
    InvalidRoot(&'static str),
    #[error("Invalid topology definition: {0}")]
    ValidationError(String),
}

/// `<port>` element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortElement {
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    pub port_type: Option<String>,
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub accepts: Vec<AcceptsElement>,
}

/// `<accepts>` element: one compatible controller and its own ports
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcceptsElement {
    #[serde(rename = "@controller", default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
    #[serde(default)]
    pub port: Vec<PortElement>,
}

/// Body of a topology definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    #[serde(rename = "@playerlimit", default, skip_serializing_if = "Option::is_none")]
    pub player_limit: Option<String>,
    #[serde(default)]
    pub port: Vec<PortElement>,
}

impl Definition {
    /// Parse a definition from XML, whatever its root element is called
    pub fn from_xml(xml: &str) -> Result<Self, DefinitionError> {
        from_str(xml).map_err(|e| DefinitionError::ParseError(e.to_string()))
    }

    /// Parse a `topology.xml` document, requiring a `<logicaltopology>` root
    pub fn from_topology_xml(xml: &str) -> Result<Self, DefinitionError> {
        if root_element_name(xml)?.as_deref() != Some(XML_ELM_TOPOLOGY) {
            return Err(DefinitionError::InvalidRoot(XML_ELM_TOPOLOGY));
        }
        Self::from_xml(xml)
    }

    /// Parse a `topology.xml` file
    pub fn from_file(path: &Path) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_topology_xml(&content)
    }

    /// Serialize under the given root element name
    pub fn to_xml_with_root(&self, root: &str) -> Result<String, DefinitionError> {
        to_string_with_root(root, self).map_err(|e| DefinitionError::SerializeError(e.to_string()))
    }

    /// Build a controller tree, validating every element and assigning
    /// addresses
    pub fn to_controller_tree(&self) -> Result<ControllerTree, DefinitionError> {
        let mut tree = ControllerTree::new();

        if let Some(limit) = &self.player_limit {
            let limit = limit.trim().parse::<u32>().map_err(|_| {
                DefinitionError::ValidationError(format!("invalid player limit \"{}\"", limit))
            })?;
            tree.set_player_limit(Some(limit));
        }

        tree.set_ports(build_ports(&self.port)?);
        tree.update_addresses();
        Ok(tree)
    }

    /// Describe the static part of a controller tree. Connection state is
    /// not part of a definition.
    pub fn from_controller_tree(tree: &ControllerTree) -> Self {
        Self {
            player_limit: tree.player_limit().map(|l| l.to_string()),
            port: port_elements(tree.ports()),
        }
    }
}

/// Canonical serialization of a tree's static structure, used for digests
pub fn canonical_xml(tree: &ControllerTree) -> Result<String, DefinitionError> {
    Definition::from_controller_tree(tree).to_xml_with_root(XML_ELM_TOPOLOGY)
}

/// Name of the first element in a document
pub fn root_element_name(xml: &str) -> Result<Option<String>, DefinitionError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(Some(String::from_utf8_lossy(e.name().as_ref()).into_owned()));
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(DefinitionError::ParseError(e.to_string())),
        }
    }
}

fn build_ports(elements: &[PortElement]) -> Result<Vec<PortNode>, DefinitionError> {
    elements.iter().map(build_port).collect()
}

fn build_port(element: &PortElement) -> Result<PortNode, DefinitionError> {
    let id = element
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            DefinitionError::ValidationError("<port> is missing attribute \"id\"".into())
        })?;

    let port_type = match element.port_type.as_deref() {
        Some(value) => PortType::parse(value).ok_or_else(|| {
            DefinitionError::ValidationError(format!("port {}: invalid type \"{}\"", id, value))
        })?,
        None => PortType::default(),
    };

    let controllers = element
        .accepts
        .iter()
        .map(|accepts| build_controller(id, accepts))
        .collect::<Result<Vec<_>, _>>()?;

    let mut port = PortNode::new(id);
    port.set_port_type(port_type);
    port.set_compatible_controllers(controllers);
    Ok(port)
}

fn build_controller(
    port_id: &str,
    element: &AcceptsElement,
) -> Result<ControllerNode, DefinitionError> {
    let controller_id = element
        .controller
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            DefinitionError::ValidationError(format!(
                "port {}: <accepts> is missing attribute \"controller\"",
                port_id
            ))
        })?;

    let mut hub = ControllerHub::new();
    hub.set_ports(build_ports(&element.port)?);

    let mut node = ControllerNode::new(controller_id);
    node.set_hub(hub);
    Ok(node)
}

fn port_elements(ports: &[PortNode]) -> Vec<PortElement> {
    ports
        .iter()
        .map(|port| PortElement {
            port_type: Some(port.port_type().as_str().to_string()),
            id: Some(port.port_id().to_string()),
            accepts: port
                .compatible_controllers()
                .iter()
                .map(|node| AcceptsElement {
                    controller: Some(node.controller_id().to_string()),
                    port: port_elements(node.hub().ports()),
                })
                .collect(),
        })
        .collect()
}
