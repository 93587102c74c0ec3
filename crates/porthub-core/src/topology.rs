//! Agent topologies: a named, content-addressed controller tree shared by
//! one or more game clients

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

use crate::definition::{canonical_xml, Definition, DefinitionError};
use crate::hub::ControllerTree;

#[derive(Error, Debug)]
pub enum TopologyError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error("Invalid attribute \"id\": \"{0}\"")]
    InvalidId(String),
    #[error("Invalid attribute \"digestcreation\": \"{0}\"")]
    InvalidDigestCreation(String),
    #[error("Missing element <{0}>")]
    MissingElement(&'static str),
}

/// `<gameclients>` element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameClientsElement {
    #[serde(default)]
    pub gameclient: Vec<String>,
}

/// `<logicaltopology>` element of the topology registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "logicaltopology")]
pub struct TopologyElement {
    #[serde(rename = "@id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "@sha2-256", default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(rename = "@digestcreation", default, skip_serializing_if = "Option::is_none")]
    pub digest_creation: Option<String>,
    #[serde(default)]
    pub definition: Option<Definition>,
    #[serde(default)]
    pub gameclients: Option<GameClientsElement>,
}

/// A controller tree with a registry identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentTopology {
    id: u32,
    /// Hex SHA-256 of the tree's canonical definition
    digest: String,
    /// When the digest was computed; `None` means it must be recomputed
    digest_creation_utc: Option<DateTime<Utc>>,
    controller_tree: ControllerTree,
    game_clients: BTreeSet<String>,
}

impl AgentTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_controller_tree(controller_tree: ControllerTree) -> Self {
        Self {
            controller_tree,
            ..Self::default()
        }
    }

    /// Load the controller tree from a game client's `topology.xml`
    pub fn from_topology_file(path: &Path) -> Result<Self, TopologyError> {
        let tree = Definition::from_file(path)?.to_controller_tree()?;
        Ok(Self::with_controller_tree(tree))
    }

    pub fn clear(&mut self) {
        self.controller_tree.clear();
        self.game_clients.clear();
    }

    /// Compute the digest and stamp its creation time, unless a digest with
    /// a valid timestamp is already present
    pub fn update_digest(&mut self) -> Result<(), TopologyError> {
        if self.digest.is_empty() || self.digest_creation_utc.is_none() {
            let xml = canonical_xml(&self.controller_tree)?;
            self.digest = definition_digest(&xml);
            self.digest_creation_utc = Some(Utc::now().trunc_subsecs(0));
        }
        Ok(())
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn set_digest(&mut self, digest: impl Into<String>) {
        self.digest = digest.into();
    }

    pub fn digest_creation_utc(&self) -> Option<DateTime<Utc>> {
        self.digest_creation_utc
    }

    pub fn set_digest_creation_utc(&mut self, digest_creation_utc: Option<DateTime<Utc>>) {
        self.digest_creation_utc = digest_creation_utc;
    }

    pub fn controller_tree(&self) -> &ControllerTree {
        &self.controller_tree
    }

    pub fn game_clients(&self) -> &BTreeSet<String> {
        &self.game_clients
    }

    pub fn set_game_clients(&mut self, game_clients: BTreeSet<String>) {
        self.game_clients = game_clients;
    }

    /// Associate a game client, returning false if it already was
    pub fn add_game_client(&mut self, game_client_id: impl Into<String>) -> bool {
        self.game_clients.insert(game_client_id.into())
    }

    /// Describe this topology as a registry element
    pub fn to_element(&self) -> TopologyElement {
        TopologyElement {
            id: Some(self.id.to_string()),
            digest: Some(self.digest.clone()),
            digest_creation: self.digest_creation_utc.map(format_w3c),
            definition: Some(Definition::from_controller_tree(&self.controller_tree)),
            gameclients: Some(GameClientsElement {
                gameclient: self.game_clients.iter().cloned().collect(),
            }),
        }
    }

    /// Rebuild a topology from a registry element
    pub fn from_element(element: &TopologyElement) -> Result<Self, TopologyError> {
        let mut topology = Self::new();

        if let Some(id) = &element.id {
            topology.id = parse_id(id)?;
        }

        if let Some(digest) = &element.digest {
            topology.digest = digest.clone();
        }

        if let Some(creation) = &element.digest_creation {
            let creation = parse_w3c(creation)
                .ok_or_else(|| TopologyError::InvalidDigestCreation(creation.clone()))?;
            topology.digest_creation_utc = Some(creation);
        }

        let definition = element
            .definition
            .as_ref()
            .ok_or(TopologyError::MissingElement("definition"))?;
        topology.controller_tree = definition.to_controller_tree()?;

        let game_clients = element
            .gameclients
            .as_ref()
            .ok_or(TopologyError::MissingElement("gameclients"))?;
        if game_clients.gameclient.is_empty() {
            return Err(TopologyError::MissingElement("gameclient"));
        }
        topology.game_clients = game_clients
            .gameclient
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();

        Ok(topology)
    }

    /// Serialize a single `<logicaltopology>` element
    pub fn to_xml(&self) -> Result<String, TopologyError> {
        to_string(&self.to_element())
            .map_err(|e| DefinitionError::SerializeError(e.to_string()).into())
    }

    /// Parse a single `<logicaltopology>` element
    pub fn from_xml(xml: &str) -> Result<Self, TopologyError> {
        let element: TopologyElement =
            from_str(xml).map_err(|e| DefinitionError::ParseError(e.to_string()))?;
        Self::from_element(&element)
    }
}

/// Hex SHA-256 of a canonical definition
fn definition_digest(canonical: &str) -> String {
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

fn parse_id(value: &str) -> Result<u32, TopologyError> {
    let signed: i64 = value
        .trim()
        .parse()
        .map_err(|_| TopologyError::InvalidId(value.to_string()))?;
    u32::try_from(signed).map_err(|_| TopologyError::InvalidId(value.to_string()))
}

/// Format as a W3C date-time in UTC, e.g. `2024-03-01T12:30:00Z`
pub fn format_w3c(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a W3C date-time or a plain `YYYY-MM-DD` date
pub fn parse_w3c(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ControllerNode;
    use crate::port::PortNode;

    const GAMEPAD_TOPOLOGY: &str = r#"<logicaltopology>
    <port type="controller" id="1">
        <accepts controller="gamepad"/>
    </port>
</logicaltopology>"#;

    fn gamepad_tree() -> ControllerTree {
        Definition::from_topology_xml(GAMEPAD_TOPOLOGY)
            .unwrap()
            .to_controller_tree()
            .unwrap()
    }

    #[test]
    fn test_digest_is_structural() {
        // Same structure built by hand instead of parsed
        let mut port = PortNode::new("1");
        port.set_compatible_controllers(vec![ControllerNode::new("gamepad")]);
        let mut tree = ControllerTree::new();
        tree.set_ports(vec![port]);
        tree.update_addresses();

        let mut a = AgentTopology::with_controller_tree(gamepad_tree());
        let mut b = AgentTopology::with_controller_tree(tree);
        a.update_digest().unwrap();
        b.update_digest().unwrap();

        assert_eq!(a.digest().len(), 64);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn test_digest_covers_canonical_definition() {
        let tree = gamepad_tree();
        let canonical = canonical_xml(&tree).unwrap();
        assert!(canonical.starts_with("<logicaltopology"));
        assert!(canonical.contains(r#"controller="gamepad""#));

        let mut topology = AgentTopology::with_controller_tree(tree);
        topology.update_digest().unwrap();
        assert_eq!(topology.digest(), definition_digest(&canonical));
        assert!(topology.digest().chars().all(|c| c.is_ascii_hexdigit()));

        // Runtime state is not part of the definition
        let mut connected = gamepad_tree();
        connected.ports_mut()[0].set_connected(true);
        assert_eq!(canonical_xml(&connected).unwrap(), canonical);
    }

    #[test]
    fn test_different_trees_different_digests() {
        let mut other = PortNode::new("1");
        other.set_compatible_controllers(vec![ControllerNode::new("mouse")]);
        let mut tree = ControllerTree::new();
        tree.set_ports(vec![other]);

        let mut a = AgentTopology::with_controller_tree(gamepad_tree());
        let mut b = AgentTopology::with_controller_tree(tree);
        a.update_digest().unwrap();
        b.update_digest().unwrap();
        assert_ne!(a.digest(), b.digest());
    }

    #[test]
    fn test_digest_is_memoized() {
        let mut topology = AgentTopology::with_controller_tree(gamepad_tree());
        topology.update_digest().unwrap();
        let digest = topology.digest().to_string();
        let created = topology.digest_creation_utc();
        assert!(created.is_some());

        topology.update_digest().unwrap();
        assert_eq!(topology.digest(), digest);
        assert_eq!(topology.digest_creation_utc(), created);

        // A stored digest with a valid timestamp is trusted as-is
        topology.set_digest("abc123");
        topology.update_digest().unwrap();
        assert_eq!(topology.digest(), "abc123");

        // An invalid timestamp forces recomputation
        topology.set_digest_creation_utc(None);
        topology.update_digest().unwrap();
        assert_eq!(topology.digest(), digest);
    }

    #[test]
    fn test_game_clients_are_a_set() {
        let mut topology = AgentTopology::new();
        assert!(topology.add_game_client("snes9x"));
        assert!(!topology.add_game_client("snes9x"));
        assert!(topology.add_game_client("bsnes"));
        assert_eq!(topology.game_clients().len(), 2);
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut topology = AgentTopology::with_controller_tree(gamepad_tree());
        topology.set_id(7);
        topology.update_digest().unwrap();
        topology.add_game_client("snes9x");
        topology.add_game_client("bsnes");

        let xml = topology.to_xml().unwrap();
        assert!(xml.contains("sha2-256"));
        assert!(xml.contains("<gameclient>bsnes</gameclient>"));

        let restored = AgentTopology::from_xml(&xml).unwrap();
        assert_eq!(restored, topology);
        assert_eq!(restored.id(), 7);
        assert_eq!(restored.digest(), topology.digest());
        assert_eq!(restored.digest_creation_utc(), topology.digest_creation_utc());
    }

    #[test]
    fn test_negative_id_rejected() {
        let xml = r#"<logicaltopology id="-1" sha2-256="00">
            <definition><port id="1"><accepts controller="gamepad"/></port></definition>
            <gameclients><gameclient>snes9x</gameclient></gameclients>
        </logicaltopology>"#;
        assert!(matches!(
            AgentTopology::from_xml(xml),
            Err(TopologyError::InvalidId(_))
        ));
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        let xml = r#"<logicaltopology id="1" sha2-256="00" digestcreation="yesterday">
            <definition><port id="1"><accepts controller="gamepad"/></port></definition>
            <gameclients><gameclient>snes9x</gameclient></gameclients>
        </logicaltopology>"#;
        assert!(matches!(
            AgentTopology::from_xml(xml),
            Err(TopologyError::InvalidDigestCreation(_))
        ));
    }

    #[test]
    fn test_missing_elements_rejected() {
        let no_definition = r#"<logicaltopology id="1">
            <gameclients><gameclient>snes9x</gameclient></gameclients>
        </logicaltopology>"#;
        assert!(matches!(
            AgentTopology::from_xml(no_definition),
            Err(TopologyError::MissingElement("definition"))
        ));

        let no_clients = r#"<logicaltopology id="1">
            <definition><port id="1"><accepts controller="gamepad"/></port></definition>
        </logicaltopology>"#;
        assert!(matches!(
            AgentTopology::from_xml(no_clients),
            Err(TopologyError::MissingElement("gameclients"))
        ));
    }

    #[test]
    fn test_w3c_dates() {
        let dt = parse_w3c("2024-03-01T12:30:00Z").unwrap();
        assert_eq!(format_w3c(dt), "2024-03-01T12:30:00Z");

        let offset = parse_w3c("2024-03-01T14:30:00+02:00").unwrap();
        assert_eq!(offset, dt);

        let date = parse_w3c("2024-03-01").unwrap();
        assert_eq!(format_w3c(date), "2024-03-01T00:00:00Z");

        assert!(parse_w3c("not a date").is_none());
    }
}
