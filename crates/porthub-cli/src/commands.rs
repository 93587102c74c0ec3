//! Subcommand implementations

use anyhow::{anyhow, bail, Context, Result};
use porthub_core::topology::format_w3c;
use porthub_core::{
    AgentInputMap, ControllerCatalog, ControllerIndex, ControllerTree, GameClient, PortManager,
    PortNode,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;

/// Registry entry as printed by `list`
#[derive(Debug, Clone, Serialize)]
pub struct TopologySummary {
    pub id: u32,
    pub digest: String,
    pub digest_creation: Option<String>,
    pub ports: usize,
    pub controllers: Vec<String>,
    pub game_clients: Vec<String>,
}

pub fn register(config: &Config, client: Option<GameClient>) -> Result<()> {
    let clients = match client {
        Some(client) => vec![client],
        None => config.game_clients.clone(),
    };
    if clients.is_empty() {
        bail!("No game clients given and none configured");
    }

    let mut input_map = load_input_map(&config.profile.path)?;

    let mut failures = 0;
    for client in &clients {
        match input_map.add_game_client(client) {
            Ok(id) => println!("{}: topology {}", client.id, id),
            Err(e) => {
                warn!(game_client = %client.id, error = %e, "Failed to register game client");
                eprintln!("{}: {}", client.id, e);
                failures += 1;
            }
        }
    }

    // Block until the registry is on disk
    input_map.wait_for_saves();

    if failures == clients.len() {
        bail!("No game client could be registered");
    }
    Ok(())
}

pub fn list(config: &Config, json: bool) -> Result<()> {
    let input_map = load_input_map(&config.profile.path)?;
    let summaries = summarize(&input_map);

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No topologies registered");
        return Ok(());
    }

    for summary in summaries {
        println!(
            "{:>4}  {}  {}  ports={}  clients={}",
            summary.id,
            short_digest(&summary.digest),
            summary.digest_creation.as_deref().unwrap_or("-"),
            summary.ports,
            summary.game_clients.join(",")
        );
    }
    Ok(())
}

pub fn show(config: &Config, topology_id: u32) -> Result<()> {
    let input_map = load_input_map(&config.profile.path)?;
    let manager = load_port_manager(config, &input_map, topology_id)?;
    let catalog = load_catalog(&config.controllers.path);

    print!("{}", render_tree(manager.controller_tree(), &catalog));
    Ok(())
}

pub fn connect(
    config: &Config,
    topology_id: u32,
    address: &str,
    connected: bool,
    controller_id: Option<&str>,
) -> Result<()> {
    let input_map = load_input_map(&config.profile.path)?;
    let mut manager = load_port_manager(config, &input_map, topology_id)?;

    manager.connect_controller(address, connected, controller_id)?;
    manager.save_xml()?;

    let port = manager
        .controller_tree()
        .port(address)
        .ok_or_else(|| anyhow!("Port {} disappeared", address))?;
    match port.active_controller() {
        Some(controller) => println!("{}: {}", address, controller.controller_id()),
        None => println!("{}: disconnected", address),
    }
    Ok(())
}

/// Leading characters of a digest for display
fn short_digest(digest: &str) -> String {
    digest.chars().take(12).collect()
}

pub fn summarize(input_map: &AgentInputMap) -> Vec<TopologySummary> {
    input_map
        .topologies()
        .map(|topology| TopologySummary {
            id: topology.id(),
            digest: topology.digest().to_string(),
            digest_creation: topology.digest_creation_utc().map(format_w3c),
            ports: topology.controller_tree().ports().len(),
            controllers: topology.controller_tree().controllers(),
            game_clients: topology.game_clients().iter().cloned().collect(),
        })
        .collect()
}

/// Indented listing of a tree with live state
pub fn render_tree(tree: &ControllerTree, catalog: &dyn ControllerCatalog) -> String {
    let mut out = String::new();
    if let Some(limit) = tree.player_limit() {
        let _ = writeln!(out, "Player limit: {}", limit);
    }
    render_ports(&mut out, tree.ports(), catalog, 0);
    out
}

fn render_ports(
    out: &mut String,
    ports: &[PortNode],
    catalog: &dyn ControllerCatalog,
    depth: usize,
) {
    let indent = "  ".repeat(depth);
    for port in ports {
        let state = match port.active_controller() {
            Some(controller) => catalog.label(controller.controller_id()).to_string(),
            None => "disconnected".to_string(),
        };
        let _ = writeln!(out, "{}{} ({}): {}", indent, port.address(), port.port_type(), state);

        for controller in port.compatible_controllers() {
            let id = controller.controller_id();
            let _ = write!(out, "{}  - {} [{}]", indent, catalog.label(id), id);
            if let Some(info) = catalog.controller(id) {
                if let Some(description) = &info.description {
                    let _ = write!(out, " {}", description);
                }
                if let Some(image) = &info.image {
                    let _ = write!(out, " ({})", image);
                }
            }
            out.push('\n');
            render_ports(out, controller.hub().ports(), catalog, depth + 2);
        }
    }
}

fn load_input_map(profile_dir: &Path) -> Result<AgentInputMap> {
    let mut input_map = AgentInputMap::new(profile_dir);
    input_map
        .load_xml()
        .with_context(|| format!("Loading {}", input_map.topologies_xml_path().display()))?;
    Ok(input_map)
}

fn load_port_manager(
    config: &Config,
    input_map: &AgentInputMap,
    topology_id: u32,
) -> Result<PortManager> {
    let tree = input_map
        .get_agent_topology(topology_id)
        .ok_or_else(|| anyhow!("No topology with ID {}", topology_id))?;

    let mut manager = PortManager::for_topology(&config.profile.path, topology_id);
    manager.set_controller_tree(tree.clone());
    manager.load_xml()?;
    Ok(manager)
}

/// Load the controller catalog or use an empty one
fn load_catalog(path: &Path) -> ControllerIndex {
    if !path.exists() {
        info!(path = %path.display(), "Controller catalog not found, using IDs as labels");
        return ControllerIndex::default();
    }

    match ControllerIndex::from_file(path) {
        Ok(index) => {
            info!(
                path = %path.display(),
                count = index.controller.len(),
                "Loaded controller catalog"
            );
            index
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to load controller catalog");
            ControllerIndex::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ControllersConfig, ProfileConfig};
    use tempfile::TempDir;

    const TOPOLOGY: &str = r#"<logicaltopology playerlimit="2">
    <port type="controller" id="1">
        <accepts controller="game.controller.snes"/>
        <accepts controller="game.controller.snes.multitap">
            <port type="controller" id="1">
                <accepts controller="game.controller.snes"/>
            </port>
        </accepts>
    </port>
</logicaltopology>"#;

    fn setup(temp: &Path) -> Config {
        let client_dir = temp.join("snes9x");
        std::fs::create_dir_all(client_dir.join("resources")).unwrap();
        std::fs::write(client_dir.join("resources/topology.xml"), TOPOLOGY).unwrap();

        std::fs::write(
            temp.join("controllers.toml"),
            r#"
[[controller]]
id = "game.controller.snes.multitap"
label = "Super Multitap"
description = "Four extra ports"
image = "resources/multitap.png"
"#,
        )
        .unwrap();

        Config {
            profile: ProfileConfig {
                path: temp.join("profile"),
            },
            controllers: ControllersConfig {
                path: temp.join("controllers.toml"),
            },
            game_clients: vec![GameClient::new("snes9x", client_dir)],
        }
    }

    #[test]
    fn test_register_and_summarize() {
        let temp = TempDir::new().unwrap();
        let config = setup(temp.path());

        register(&config, None).unwrap();

        let input_map = load_input_map(&config.profile.path).unwrap();
        let summaries = summarize(&input_map);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, 0);
        assert_eq!(summaries[0].game_clients, vec!["snes9x"]);
        assert_eq!(
            summaries[0].controllers,
            vec!["game.controller.snes", "game.controller.snes.multitap"]
        );
    }

    #[test]
    fn test_register_without_clients_fails() {
        let temp = TempDir::new().unwrap();
        let mut config = setup(temp.path());
        config.game_clients.clear();
        assert!(register(&config, None).is_err());
    }

    #[test]
    fn test_connect_persists_state() {
        let temp = TempDir::new().unwrap();
        let config = setup(temp.path());
        register(&config, None).unwrap();

        connect(&config, 0, "/1", true, Some("game.controller.snes.multitap")).unwrap();

        let input_map = load_input_map(&config.profile.path).unwrap();
        let manager = load_port_manager(&config, &input_map, 0).unwrap();
        let nested = manager
            .controller_tree()
            .port("/1/game.controller.snes.multitap/1")
            .unwrap();
        assert!(nested.is_connected());

        assert!(connect(&config, 0, "/1", true, Some("game.controller.n64")).is_err());
        assert!(connect(&config, 7, "/1", false, None).is_err());
    }

    #[test]
    fn test_port_state_is_per_topology() {
        let temp = TempDir::new().unwrap();
        let mut config = setup(temp.path());

        let duo_dir = temp.path().join("duo");
        std::fs::create_dir_all(duo_dir.join("resources")).unwrap();
        std::fs::write(
            duo_dir.join("resources/topology.xml"),
            r#"<logicaltopology>
    <port id="1"><accepts controller="game.controller.snes"/></port>
    <port id="2"><accepts controller="game.controller.snes"/></port>
</logicaltopology>"#,
        )
        .unwrap();
        config.game_clients.push(GameClient::new("duo", duo_dir));
        register(&config, None).unwrap();

        connect(&config, 0, "/1", true, Some("game.controller.snes")).unwrap();

        let input_map = load_input_map(&config.profile.path).unwrap();
        let first = load_port_manager(&config, &input_map, 0).unwrap();
        assert!(first.controller_tree().port("/1").unwrap().is_connected());

        let second = load_port_manager(&config, &input_map, 1).unwrap();
        assert!(!second.controller_tree().port("/1").unwrap().is_connected());
        assert_ne!(first.xml_path(), second.xml_path());
    }

    #[test]
    fn test_list_with_non_ascii_digest() {
        let temp = TempDir::new().unwrap();
        let config = setup(temp.path());
        std::fs::create_dir_all(&config.profile.path).unwrap();
        std::fs::write(
            config.profile.path.join("gametopologies.xml"),
            r#"<topologies>
    <logicaltopology id="0" sha2-256="aaaaaaaaaaaé" digestcreation="2024-03-01T12:30:00Z">
        <definition><port id="1"><accepts controller="gamepad"/></port></definition>
        <gameclients><gameclient>snes9x</gameclient></gameclients>
    </logicaltopology>
</topologies>"#,
        )
        .unwrap();

        list(&config, false).unwrap();
        assert_eq!(short_digest("aaaaaaaaaaaébcd"), "aaaaaaaaaaaé");
        assert_eq!(short_digest("abc"), "abc");
    }

    #[test]
    fn test_render_tree() {
        let temp = TempDir::new().unwrap();
        let config = setup(temp.path());
        register(&config, None).unwrap();
        connect(&config, 0, "/1", true, Some("game.controller.snes.multitap")).unwrap();

        let input_map = load_input_map(&config.profile.path).unwrap();
        let manager = load_port_manager(&config, &input_map, 0).unwrap();
        let catalog = load_catalog(&config.controllers.path);

        let rendered = render_tree(manager.controller_tree(), &catalog);
        assert!(rendered.starts_with("Player limit: 2\n"));
        assert!(rendered.contains("/1 (controller): Super Multitap"));
        assert!(rendered.contains("- game.controller.snes [game.controller.snes]\n"));
        assert!(rendered.contains(
            "- Super Multitap [game.controller.snes.multitap] Four extra ports \
             (resources/multitap.png)"
        ));
        assert!(rendered
            .contains("/1/game.controller.snes.multitap/1 (controller): game.controller.snes"));
    }
}
