//! Porthub Core - Controller topologies, topology registry and port state
//!
//! This crate provides the foundational types for Porthub:
//! - Port/controller trees describing which controllers may attach where
//! - Topology definition XML parsing and serialization
//! - Content-addressed agent topologies and the registry that deduplicates them
//! - Runtime port connection state with persistence
//! - Controller catalog for display metadata

pub mod controller;
pub mod definition;
pub mod game_client;
pub mod hub;
pub mod input_map;
pub mod port;
pub mod port_manager;
pub mod topology;

pub use controller::{CatalogError, ControllerCatalog, ControllerIndex, ControllerInfo};
pub use definition::{Definition, DefinitionError};
pub use game_client::GameClient;
pub use hub::{ControllerHub, ControllerNode, ControllerTree};
pub use input_map::{AgentInputMap, InputMapError};
pub use port::{PhysicalPort, PortNode, PortType};
pub use port_manager::{PortManager, PortManagerError};
pub use topology::{AgentTopology, TopologyError};
