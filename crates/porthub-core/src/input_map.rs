//! Topology registry
//!
//! Every game client declares the static topology of its ports in a
//! `topology.xml` file. Identical topologies are stored once: a topology's
//! identity is the digest of its structure, so game clients with the same
//! port layout share one registry entry and one topology ID.
//!
//! The registry is persisted to `gametopologies.xml` in the profile
//! directory. Saves run on background threads that work on a snapshot of
//! the registry. Writers are serialized by a shared lock, a snapshot never
//! overwrites a newer one, and the registry waits for all of them when
//! dropped.

use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::game_client::GameClient;
use crate::hub::ControllerTree;
use crate::topology::{AgentTopology, TopologyElement, TopologyError};

/// Registry file in the profile directory
pub const TOPOLOGIES_XML_FILE: &str = "gametopologies.xml";

const XML_ELM_TOPOLOGIES: &str = "topologies";
const XML_ELM_TOPOLOGY: &str = "logicaltopology";

#[derive(Error, Debug)]
pub enum InputMapError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("{game_client}: can't load topology, file doesn't exist (tried {tried:?})")]
    TopologyFileNotFound {
        game_client: String,
        tried: Vec<PathBuf>,
    },
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("Failed to parse topologies: {0}")]
    ParseError(String),
    #[error("Failed to serialize topologies: {0}")]
    SerializeError(String),
    #[error("Can't find root <topologies> tag")]
    InvalidRoot,
    #[error("No topology IDs left")]
    IdsExhausted,
}

/// Root `<topologies>` element of the registry file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "topologies")]
pub struct TopologiesDocument {
    #[serde(rename = "logicaltopology", default)]
    pub topologies: Vec<TopologyElement>,
}

/// Registry of all known agent topologies
pub struct AgentInputMap {
    topologies_xml_path: PathBuf,
    save_tasks: Vec<JoinHandle<()>>,
    /// Generation of the most recent snapshot handed to a save task
    save_generation: u64,
    /// Generation of the snapshot last written to disk. Held while writing.
    saved_generation: Arc<Mutex<u64>>,
    /// Topologies ordered by ID; the next ID is the last key + 1
    topologies_by_id: BTreeMap<u32, AgentTopology>,
    /// Digest -> ID, covering exactly the entries of `topologies_by_id`
    ids_by_digest: HashMap<String, u32>,
}

impl AgentInputMap {
    /// Create an empty registry stored in the given profile directory
    pub fn new(profile_dir: &Path) -> Self {
        Self {
            topologies_xml_path: profile_dir.join(TOPOLOGIES_XML_FILE),
            save_tasks: Vec::new(),
            save_generation: 0,
            saved_generation: Arc::new(Mutex::new(0)),
            topologies_by_id: BTreeMap::new(),
            ids_by_digest: HashMap::new(),
        }
    }

    pub fn topologies_xml_path(&self) -> &Path {
        &self.topologies_xml_path
    }

    /// Forget all topologies. The registry file is left alone.
    pub fn clear(&mut self) {
        self.topologies_by_id.clear();
        self.ids_by_digest.clear();
    }

    pub fn len(&self) -> usize {
        self.topologies_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topologies_by_id.is_empty()
    }

    /// Static controller tree of a topology
    pub fn get_agent_topology(&self, topology_id: u32) -> Option<&ControllerTree> {
        self.topologies_by_id
            .get(&topology_id)
            .map(|topology| topology.controller_tree())
    }

    pub fn topology(&self, topology_id: u32) -> Option<&AgentTopology> {
        self.topologies_by_id.get(&topology_id)
    }

    pub fn topology_by_digest(&self, digest: &str) -> Option<&AgentTopology> {
        self.ids_by_digest
            .get(digest)
            .and_then(|id| self.topologies_by_id.get(id))
    }

    /// All topologies in ID order
    pub fn topologies(&self) -> impl Iterator<Item = &AgentTopology> {
        self.topologies_by_id.values()
    }

    /// Register a game client's topology, returning the ID of the topology
    /// it is now associated with
    ///
    /// A topology that is structurally identical to a registered one reuses
    /// that entry. Nothing is changed if the topology can't be loaded.
    pub fn add_game_client(&mut self, game_client: &GameClient) -> Result<u32, InputMapError> {
        let topology_path = match game_client.find_topology_file() {
            Some(path) => path,
            None => {
                let tried = game_client.topology_candidates();
                for path in &tried {
                    debug!(
                        game_client = %game_client.id,
                        path = %path.display(),
                        "Tried topology file"
                    );
                }
                return Err(InputMapError::TopologyFileNotFound {
                    game_client: game_client.id.clone(),
                    tried,
                });
            }
        };

        info!(
            game_client = %game_client.id,
            path = %topology_path.display(),
            "Loading topology"
        );

        let mut topology = AgentTopology::from_topology_file(&topology_path)?;
        topology.update_digest()?;

        if let Some(&id) = self.ids_by_digest.get(topology.digest()) {
            let added = self
                .topologies_by_id
                .get_mut(&id)
                .map(|existing| existing.add_game_client(game_client.id.clone()))
                .unwrap_or(false);

            if added {
                info!(
                    game_client = %game_client.id,
                    topology = id,
                    "Added game client to existing topology"
                );
                self.save_xml_async();
            }
            return Ok(id);
        }

        let id = self.next_topology_id()?;
        topology.set_id(id);
        topology.add_game_client(game_client.id.clone());

        info!(
            game_client = %game_client.id,
            topology = id,
            digest = %topology.digest(),
            "Registered new topology"
        );

        self.insert(topology);
        self.save_xml_async();

        Ok(id)
    }

    fn next_topology_id(&self) -> Result<u32, InputMapError> {
        match self.topologies_by_id.keys().next_back() {
            Some(last) => last.checked_add(1).ok_or(InputMapError::IdsExhausted),
            None => Ok(0),
        }
    }

    fn insert(&mut self, topology: AgentTopology) {
        self.ids_by_digest
            .insert(topology.digest().to_string(), topology.id());
        self.topologies_by_id.insert(topology.id(), topology);
    }

    /// Replace the in-memory registry with the contents of the registry file
    ///
    /// Returns the number of topologies loaded. A missing file leaves the
    /// registry empty. Invalid or duplicate entries are logged and skipped.
    pub fn load_xml(&mut self) -> Result<usize, InputMapError> {
        self.clear();

        if !self.topologies_xml_path.exists() {
            debug!(
                path = %self.topologies_xml_path.display(),
                "Can't load topologies, file doesn't exist"
            );
            return Ok(0);
        }

        info!(path = %self.topologies_xml_path.display(), "Loading topologies");

        let content = std::fs::read_to_string(&self.topologies_xml_path)?;
        self.deserialize_topologies(&content)
    }

    fn deserialize_topologies(&mut self, xml: &str) -> Result<usize, InputMapError> {
        for (index, entry) in topology_entries(xml)?.into_iter().enumerate() {
            let element: TopologyElement = match from_str(entry) {
                Ok(element) => element,
                Err(e) => {
                    error!(index, error = %e, "Unparsable topology, skipping");
                    continue;
                }
            };

            let mut topology = match AgentTopology::from_element(&element) {
                Ok(topology) => topology,
                Err(e) => {
                    error!(id = ?element.id, error = %e, "Invalid topology, skipping");
                    continue;
                }
            };

            if let Err(e) = topology.update_digest() {
                error!(
                    id = topology.id(),
                    error = %e,
                    "Failed to compute topology digest, skipping"
                );
                continue;
            }

            if self.topologies_by_id.contains_key(&topology.id()) {
                error!(
                    id = topology.id(),
                    digest = %topology.digest(),
                    "Duplicate topology ID"
                );
                continue;
            }

            if let Some(existing) = self.ids_by_digest.get(topology.digest()) {
                error!(
                    id = topology.id(),
                    existing = *existing,
                    digest = %topology.digest(),
                    "Duplicate topology digest"
                );
                continue;
            }

            self.insert(topology);
        }

        info!(count = self.len(), "Loaded topologies");
        Ok(self.len())
    }

    /// Save a snapshot of the registry on a background thread
    pub fn save_xml_async(&mut self) {
        let topologies: Vec<AgentTopology> = self.topologies_by_id.values().cloned().collect();

        self.prune_save_tasks();

        self.save_generation += 1;
        let generation = self.save_generation;
        let path = self.topologies_xml_path.clone();
        let saved_generation = Arc::clone(&self.saved_generation);

        let spawned = thread::Builder::new()
            .name("topology-save".to_string())
            .spawn(move || {
                debug!(path = %path.display(), count = topologies.len(), "Saving topologies");

                let xml = match serialize_topologies(&topologies) {
                    Ok(xml) => xml,
                    Err(e) => {
                        error!(error = %e, "Failed to serialize topologies");
                        return;
                    }
                };

                let mut saved = saved_generation.lock().unwrap_or_else(PoisonError::into_inner);
                if *saved > generation {
                    debug!(generation, "Newer topologies already saved, skipping");
                    return;
                }
                match write_file(&path, &xml) {
                    Ok(()) => *saved = generation,
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "Failed to save topologies")
                    }
                }
            });

        match spawned {
            Ok(handle) => self.save_tasks.push(handle),
            Err(e) => error!(error = %e, "Failed to start topology save task"),
        }
    }

    /// Block until every outstanding save has finished
    pub fn wait_for_saves(&mut self) {
        for task in self.save_tasks.drain(..) {
            if task.join().is_err() {
                warn!("Topology save task panicked");
            }
        }
    }

    fn prune_save_tasks(&mut self) {
        let (finished, pending): (Vec<_>, Vec<_>) = self
            .save_tasks
            .drain(..)
            .partition(|task| task.is_finished());

        for task in finished {
            if task.join().is_err() {
                warn!("Topology save task panicked");
            }
        }

        self.save_tasks = pending;
    }
}

impl Drop for AgentInputMap {
    fn drop(&mut self) {
        self.wait_for_saves();
    }
}

/// Serialize topologies into a registry document
pub fn serialize_topologies(topologies: &[AgentTopology]) -> Result<String, InputMapError> {
    let document = TopologiesDocument {
        topologies: topologies.iter().map(AgentTopology::to_element).collect(),
    };
    let xml = to_string(&document).map_err(|e| InputMapError::SerializeError(e.to_string()))?;
    Ok(format!("<?xml version='1.0'?>\n{}", xml))
}

/// Source text of each `<logicaltopology>` child of the `<topologies>` root
///
/// Other children are ignored. Entries are returned unparsed so a bad entry
/// can't take the rest of the document down with it.
fn topology_entries(xml: &str) -> Result<Vec<&str>, InputMapError> {
    let mut reader = Reader::from_str(xml);
    let parse_error = |e: quick_xml::Error| InputMapError::ParseError(e.to_string());

    // Find the root element
    loop {
        match reader.read_event().map_err(parse_error)? {
            Event::Start(e) if e.name().as_ref() == XML_ELM_TOPOLOGIES.as_bytes() => break,
            Event::Empty(e) if e.name().as_ref() == XML_ELM_TOPOLOGIES.as_bytes() => {
                return Ok(Vec::new());
            }
            Event::Start(_) | Event::Empty(_) | Event::Eof => {
                error!("Can't find root <{}> tag", XML_ELM_TOPOLOGIES);
                return Err(InputMapError::InvalidRoot);
            }
            _ => {}
        }
    }

    let mut entries = Vec::new();
    loop {
        let start = reader.buffer_position() as usize;
        match reader.read_event().map_err(parse_error)? {
            Event::Start(e) => {
                let is_topology = e.name().as_ref() == XML_ELM_TOPOLOGY.as_bytes();
                reader.read_to_end(e.name()).map_err(parse_error)?;
                if is_topology {
                    entries.push(&xml[start..reader.buffer_position() as usize]);
                }
            }
            Event::Empty(e) => {
                if e.name().as_ref() == XML_ELM_TOPOLOGY.as_bytes() {
                    entries.push(&xml[start..reader.buffer_position() as usize]);
                }
            }
            Event::End(_) | Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
}
