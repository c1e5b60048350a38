//! Serializable snapshot types for EcoGrid+ persistence.
//!
//! Two artifacts: topology (nodes and edges, required to round-trip
//! exactly) and an optional history of recent per-node readings. Format
//! is JSON via `serde_json`; the layout itself is implementation-defined,
//! only round-trip fidelity of topology is a contract.

use ecogrid_core::{EcoGridError, EcoGridResult, Graph, NodeId, NodeKind, PowerLine, PowerNode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Schema for a single node, flattened out of `PowerNode` for stable
/// on-disk representation independent of the in-memory struct's layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: u64,
    pub kind: NodeKindSnapshot,
    pub max_capacity: f64,
    pub current_load: f64,
    pub x: f64,
    pub y: f64,
    pub efficiency: f64,
    pub active: bool,
    pub parent_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKindSnapshot {
    Substation,
    Transformer,
    Consumer,
}

impl From<NodeKind> for NodeKindSnapshot {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Substation => NodeKindSnapshot::Substation,
            NodeKind::Transformer => NodeKindSnapshot::Transformer,
            NodeKind::Consumer => NodeKindSnapshot::Consumer,
        }
    }
}

impl From<NodeKindSnapshot> for NodeKind {
    fn from(kind: NodeKindSnapshot) -> Self {
        match kind {
            NodeKindSnapshot::Substation => NodeKind::Substation,
            NodeKindSnapshot::Transformer => NodeKind::Transformer,
            NodeKindSnapshot::Consumer => NodeKind::Consumer,
        }
    }
}

/// Schema for one unordered physical edge (the topology stores it once;
/// the Graph rebuilds both directed records on load).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub u: u64,
    pub v: u64,
    pub distance_km: f64,
    pub resistance_ohm: f64,
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub readings_by_node: Vec<(u64, Vec<f64>)>,
}

impl TopologySnapshot {
    pub fn capture(graph: &Graph) -> Self {
        let mut nodes: Vec<NodeSnapshot> = graph.nodes().map(node_to_snapshot).collect();
        nodes.sort_by_key(|n| n.id);

        let mut edges = Vec::new();
        for (a, b) in graph.unordered_edges() {
            if let Some(edge) = graph.get_edge(a, b) {
                edges.push(edge_to_snapshot(edge));
            }
        }
        edges.sort_by_key(|e| (e.u, e.v));

        Self { nodes, edges }
    }

    /// Rebuilds a `Graph` from this snapshot. Nodes are added in
    /// substation -> transformer -> consumer order so `add_node`'s
    /// root/children registration sees parents before children.
    pub fn restore(&self) -> EcoGridResult<Graph> {
        let mut graph = Graph::new();
        let mut ordered = self.nodes.clone();
        ordered.sort_by_key(|n| node_kind_rank(n.kind));

        for snapshot in &ordered {
            graph.add_node(snapshot_to_node(snapshot));
        }
        for edge in &self.edges {
            graph.add_edge(NodeId(edge.u), NodeId(edge.v), edge.distance_km, edge.resistance_ohm, edge.efficiency)?;
        }
        Ok(graph)
    }
}

impl HistorySnapshot {
    pub fn capture(graph: &Graph) -> Self {
        let mut readings_by_node: Vec<(u64, Vec<f64>)> =
            graph.nodes().map(|n| (n.id.0, n.readings.ordered())).collect();
        readings_by_node.sort_by_key(|(id, _)| *id);
        Self { readings_by_node }
    }
}

fn node_kind_rank(kind: NodeKindSnapshot) -> u8 {
    match kind {
        NodeKindSnapshot::Substation => 0,
        NodeKindSnapshot::Transformer => 1,
        NodeKindSnapshot::Consumer => 2,
    }
}

fn node_to_snapshot(node: &PowerNode) -> NodeSnapshot {
    NodeSnapshot {
        id: node.id.0,
        kind: node.kind.into(),
        max_capacity: node.max_capacity,
        current_load: node.current_load,
        x: node.x,
        y: node.y,
        efficiency: node.efficiency,
        active: node.active,
        parent_id: node.parent_id.map(|p| p.0),
    }
}

fn snapshot_to_node(snapshot: &NodeSnapshot) -> PowerNode {
    let mut node = PowerNode::new(
        NodeId(snapshot.id),
        snapshot.kind.into(),
        snapshot.max_capacity,
        snapshot.x,
        snapshot.y,
        snapshot.efficiency,
        snapshot.parent_id.map(NodeId),
    );
    node.current_load = snapshot.current_load;
    node.active = snapshot.active;
    node
}

fn edge_to_snapshot(edge: &PowerLine) -> EdgeSnapshot {
    EdgeSnapshot {
        u: edge.source_id.0,
        v: edge.target_id.0,
        distance_km: edge.distance_km,
        resistance_ohm: edge.resistance_ohm,
        efficiency: edge.efficiency,
    }
}

/// Serializes the topology to `path` as JSON.
pub fn save_state_manual(graph: &Graph, path: impl AsRef<Path>) -> EcoGridResult<()> {
    let snapshot = TopologySnapshot::capture(graph);
    let json = serde_json::to_string_pretty(&snapshot).map_err(|e| EcoGridError::Serde(e.to_string()))?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Deserializes a topology previously written by `save_state_manual` and
/// rebuilds a `Graph` from it.
pub fn load_state_manual(path: impl AsRef<Path>) -> EcoGridResult<Graph> {
    let json = std::fs::read_to_string(path)?;
    let snapshot: TopologySnapshot = serde_json::from_str(&json).map_err(|e| EcoGridError::Serde(e.to_string()))?;
    snapshot.restore()
}
