//! Controller hubs and the recursive port/controller tree

use crate::port::PortNode;

/// The root of a topology is just a hub with no owning controller
pub type ControllerTree = ControllerHub;

/// A compatible controller of a port, together with the ports it exposes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerNode {
    controller_id: String,
    /// Address of this controller, e.g. `/1/multitap`
    address: String,
    /// Address of the port this controller plugs into
    port_address: String,
    hub: ControllerHub,
}

impl ControllerNode {
    pub fn new(controller_id: impl Into<String>) -> Self {
        Self {
            controller_id: controller_id.into(),
            ..Self::default()
        }
    }

    pub fn controller_id(&self) -> &str {
        &self.controller_id
    }

    pub fn set_controller_id(&mut self, controller_id: impl Into<String>) {
        self.controller_id = controller_id.into();
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port_address(&self) -> &str {
        &self.port_address
    }

    pub fn hub(&self) -> &ControllerHub {
        &self.hub
    }

    pub fn hub_mut(&mut self) -> &mut ControllerHub {
        &mut self.hub
    }

    pub fn set_hub(&mut self, hub: ControllerHub) {
        self.hub = hub;
    }

    /// A controller without child ports is a leaf
    pub fn is_hub(&self) -> bool {
        !self.hub.ports().is_empty()
    }

    /// Reset to an unbound controller with no ports
    pub fn clear(&mut self) {
        self.controller_id.clear();
        self.address.clear();
        self.port_address.clear();
        self.hub.clear();
    }

    pub fn is_controller_accepted(&self, controller_id: &str) -> bool {
        self.hub.is_controller_accepted(controller_id)
    }

    pub fn is_controller_accepted_at(&self, port_address: &str, controller_id: &str) -> bool {
        self.hub.is_controller_accepted_at(port_address, controller_id)
    }

    /// Append this controller and everything below it, skipping IDs
    /// that were already collected
    pub fn collect_controllers(&self, controllers: &mut Vec<String>) {
        if !controllers.iter().any(|c| c == &self.controller_id) {
            controllers.push(self.controller_id.clone());
        }

        self.hub.collect_controllers(controllers);
    }
}

/// Ordered collection of ports
///
/// Port order is presentation order: it drives listing and default-port
/// selection, so it is preserved through every load and save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerHub {
    ports: Vec<PortNode>,
    player_limit: Option<u32>,
}

impl ControllerHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.ports.clear();
        self.player_limit = None;
    }

    pub fn ports(&self) -> &[PortNode] {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut [PortNode] {
        &mut self.ports
    }

    pub fn set_ports(&mut self, ports: Vec<PortNode>) {
        self.ports = ports;
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Maximum number of simultaneous players, if the topology declares one
    pub fn player_limit(&self) -> Option<u32> {
        self.player_limit
    }

    pub fn set_player_limit(&mut self, player_limit: Option<u32>) {
        self.player_limit = player_limit;
    }

    /// True if any port at any depth accepts the controller
    pub fn is_controller_accepted(&self, controller_id: &str) -> bool {
        self.ports
            .iter()
            .any(|port| port.is_controller_accepted(controller_id))
    }

    /// True if the port at `port_address` accepts the controller
    pub fn is_controller_accepted_at(&self, port_address: &str, controller_id: &str) -> bool {
        self.ports
            .iter()
            .any(|port| port.is_controller_accepted_at(port_address, controller_id))
    }

    /// Every controller reachable from this hub, in tree order
    pub fn controllers(&self) -> Vec<String> {
        let mut controllers = Vec::new();
        self.collect_controllers(&mut controllers);
        controllers
    }

    pub fn collect_controllers(&self, controllers: &mut Vec<String>) {
        for port in &self.ports {
            for node in port.compatible_controllers() {
                node.collect_controllers(controllers);
            }
        }
    }

    /// Look up a port by address, descending into every compatible
    /// controller's hub
    pub fn port(&self, address: &str) -> Option<&PortNode> {
        self.ports
            .iter()
            .find_map(|port| Self::find_port(port, address))
    }

    fn find_port<'a>(port: &'a PortNode, address: &str) -> Option<&'a PortNode> {
        if port.address() == address {
            return Some(port);
        }

        port.compatible_controllers()
            .iter()
            .flat_map(|controller| controller.hub().ports())
            .find_map(|child| Self::find_port(child, address))
    }

    /// Recompute every address in the tree from port and controller IDs
    pub fn update_addresses(&mut self) {
        self.assign_addresses("");
    }

    fn assign_addresses(&mut self, base: &str) {
        for port in &mut self.ports {
            let port_address = format!("{}/{}", base, port.port_id());
            for controller in port.compatible_controllers_mut() {
                controller.address = format!("{}/{}", port_address, controller.controller_id);
                controller.port_address = port_address.clone();
                let controller_address = controller.address.clone();
                controller.hub.assign_addresses(&controller_address);
            }
            port.set_address(port_address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_port(id: &str, controllers: &[&str]) -> PortNode {
        let mut port = PortNode::new(id);
        port.set_compatible_controllers(
            controllers.iter().map(|c| ControllerNode::new(*c)).collect(),
        );
        port
    }

    /// Two top-level ports; port 2 takes a multitap with two gamepad ports
    fn sample_tree() -> ControllerTree {
        let mut multitap_hub = ControllerHub::new();
        multitap_hub.set_ports(vec![
            leaf_port("1", &["gamepad"]),
            leaf_port("2", &["gamepad", "lightgun"]),
        ]);
        let mut multitap = ControllerNode::new("multitap");
        multitap.set_hub(multitap_hub);

        let mut port2 = leaf_port("2", &["gamepad"]);
        let mut controllers = port2.compatible_controllers().to_vec();
        controllers.push(multitap);
        port2.set_compatible_controllers(controllers);

        let mut tree = ControllerTree::new();
        tree.set_ports(vec![leaf_port("1", &["gamepad", "mouse"]), port2]);
        tree.update_addresses();
        tree
    }

    #[test]
    fn test_addresses() {
        let tree = sample_tree();
        assert_eq!(tree.ports()[0].address(), "/1");
        assert_eq!(tree.ports()[1].address(), "/2");

        let multitap = &tree.ports()[1].compatible_controllers()[1];
        assert_eq!(multitap.address(), "/2/multitap");
        assert_eq!(multitap.port_address(), "/2");
        assert_eq!(multitap.hub().ports()[1].address(), "/2/multitap/2");
    }

    #[test]
    fn test_get_port() {
        let tree = sample_tree();
        assert_eq!(tree.port("/2").unwrap().port_id(), "2");

        let nested = tree.port("/2/multitap/2").unwrap();
        assert_eq!(nested.port_id(), "2");
        assert!(nested.physical_port().is_compatible("lightgun"));

        assert!(tree.port("/3").is_none());
        assert!(tree.port("").is_none());
    }

    #[test]
    fn test_controllers_in_tree_order() {
        let tree = sample_tree();
        assert_eq!(
            tree.controllers(),
            vec!["gamepad", "mouse", "multitap", "lightgun"]
        );
    }

    #[test]
    fn test_acceptance() {
        let tree = sample_tree();
        assert!(tree.is_controller_accepted("lightgun"));
        assert!(tree.is_controller_accepted("multitap"));
        assert!(!tree.is_controller_accepted("keyboard"));

        assert!(tree.is_controller_accepted_at("/2/multitap/2", "lightgun"));
        assert!(!tree.is_controller_accepted_at("/2/multitap/1", "lightgun"));
        assert!(!tree.is_controller_accepted_at("/1", "lightgun"));
    }

    #[test]
    fn test_controller_node_clear() {
        let tree = sample_tree();
        let mut multitap = tree.ports()[1].compatible_controllers()[1].clone();
        assert!(multitap.is_hub());

        multitap.clear();
        assert_eq!(multitap.controller_id(), "");
        assert_eq!(multitap.address(), "");
        assert!(!multitap.is_hub());
    }
}
