//! Undirected physical adjacency plus an explicit parent/children tree
//! overlay (the hierarchy). The tree overlay is represented by ids, not
//! object handles, so there is no possibility of a reference cycle.

use crate::edge::PowerLine;
use crate::error::{EcoGridError, EcoGridResult};
use crate::ids::NodeId;
use crate::node::{NodeKind, PowerNode};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, PowerNode>,
    adj_list: HashMap<NodeId, Vec<PowerLine>>,
    pub root_nodes: Vec<NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node`, wiring it into the hierarchy: a SUBSTATION with no
    /// parent becomes a root; any node with a parent already present is
    /// appended to that parent's `children_ids`.
    pub fn add_node(&mut self, node: PowerNode) {
        let id = node.id;
        let kind = node.kind;
        let parent_id = node.parent_id;
        self.nodes.insert(id, node);
        self.adj_list.entry(id).or_default();

        if kind == NodeKind::Substation && parent_id.is_none() {
            if !self.root_nodes.contains(&id) {
                self.root_nodes.push(id);
            }
        } else if let Some(pid) = parent_id {
            if let Some(parent) = self.nodes.get_mut(&pid) {
                if !parent.children_ids.contains(&id) {
                    parent.children_ids.push(id);
                }
            }
        }
    }

    /// Inserts two directed `PowerLine` records with identical physical
    /// parameters, forming one undirected logical edge.
    pub fn add_edge(
        &mut self,
        u: NodeId,
        v: NodeId,
        distance_km: f64,
        resistance_ohm: f64,
        efficiency: f64,
    ) -> EcoGridResult<()> {
        if !self.nodes.contains_key(&u) {
            return Err(EcoGridError::UnknownNode(u.value()));
        }
        if !self.nodes.contains_key(&v) {
            return Err(EcoGridError::UnknownNode(v.value()));
        }
        self.adj_list
            .entry(u)
            .or_default()
            .push(PowerLine::new(u, v, distance_km, resistance_ohm, efficiency));
        self.adj_list
            .entry(v)
            .or_default()
            .push(PowerLine::new(v, u, distance_km, resistance_ohm, efficiency));
        Ok(())
    }

    pub fn get_node(&self, id: NodeId) -> Option<&PowerNode> {
        self.nodes.get(&id)
    }

    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut PowerNode> {
        self.nodes.get_mut(&id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PowerNode> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut PowerNode> {
        self.nodes.values_mut()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn get_neighbors(&self, id: NodeId) -> &[PowerLine] {
        self.adj_list.get(&id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn get_edge(&self, u: NodeId, v: NodeId) -> Option<&PowerLine> {
        self.adj_list.get(&u)?.iter().find(|line| line.target_id == v)
    }

    pub fn get_edge_mut(&mut self, u: NodeId, v: NodeId) -> Option<&mut PowerLine> {
        self.adj_list.get_mut(&u)?.iter_mut().find(|line| line.target_id == v)
    }

    pub fn get_children(&self, id: NodeId) -> Vec<&PowerNode> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        node.children_ids
            .iter()
            .filter_map(|cid| self.nodes.get(cid))
            .collect()
    }

    pub fn get_parent(&self, id: NodeId) -> Option<&PowerNode> {
        let node = self.nodes.get(&id)?;
        let pid = node.parent_id?;
        self.nodes.get(&pid)
    }

    /// Every unordered pair appears once, regardless of which direction is
    /// stored first in `adj_list`.
    pub fn unordered_edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut seen = std::collections::HashSet::new();
        let mut pairs = Vec::new();
        for (&id, lines) in self.adj_list.iter() {
            for line in lines {
                let key = if id.value() < line.target_id.value() {
                    (id, line.target_id)
                } else {
                    (line.target_id, id)
                };
                if seen.insert(key) {
                    pairs.push(key);
                }
            }
        }
        pairs
    }

    /// Rebinds `child_id`'s parent to `new_parent_id`, removing it from the
    /// old parent's `children_ids` and appending it to the new parent's.
    pub fn rebind_parent(&mut self, child_id: NodeId, new_parent_id: Option<NodeId>) {
        if let Some(node) = self.nodes.get(&child_id) {
            if let Some(old_parent_id) = node.parent_id {
                if let Some(old_parent) = self.nodes.get_mut(&old_parent_id) {
                    old_parent.children_ids.retain(|&c| c != child_id);
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(&child_id) {
            node.parent_id = new_parent_id;
        }
        if let Some(pid) = new_parent_id {
            if let Some(parent) = self.nodes.get_mut(&pid) {
                if !parent.children_ids.contains(&child_id) {
                    parent.children_ids.push(child_id);
                }
            }
        }
    }
}
