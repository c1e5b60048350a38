//! Neighbor-cascade load balancer: when a node is pushed over its target
//! load fraction, excess is shoved outward along physical edges that
//! respect the hierarchy, one depth-limited recursive step at a time.

use ecogrid_core::{CapacityIndex, Graph, NodeId, NodeKind};
use std::collections::HashSet;

pub const TARGET_LOAD_PCT: f64 = 0.70;
pub const EMERGENCY_CAP_PCT: f64 = 0.99;
pub const MAX_CASCADE_DEPTH: u32 = 15;

/// Whether load may move from `source_kind` to `target_kind`, independent
/// of capacity. Physical connectivity is checked by the caller.
fn can_transfer_to(source_kind: NodeKind, target_kind: NodeKind) -> bool {
    use NodeKind::*;
    match (source_kind, target_kind) {
        (Consumer, Consumer) => false,
        (Transformer, Consumer) => false,
        (Transformer, Transformer) => false,
        _ => target_kind.level() >= source_kind.level(),
    }
}

/// Owns the capacity-by-available-headroom index used to steer cascades;
/// the index must be kept in sync with the graph via [`Balancer::sync_node`].
pub struct Balancer {
    capacity_index: CapacityIndex,
}

impl Default for Balancer {
    fn default() -> Self {
        Self::new()
    }
}

impl Balancer {
    pub fn new() -> Self {
        Self { capacity_index: CapacityIndex::new() }
    }

    /// Rebuilds the capacity index entry for `id` from the graph's current
    /// node state. Call after any load change outside of `update_node_load`.
    pub fn sync_node(&mut self, graph: &Graph, id: NodeId) {
        if let Some(node) = graph.get_node(id) {
            self.capacity_index.update(id, node.available_capacity());
        }
    }

    pub fn sync_all(&mut self, graph: &Graph) {
        for node in graph.nodes() {
            self.capacity_index.update(node.id, node.available_capacity());
        }
    }

    /// Sets `id`'s load and, if that pushes it past `TARGET_LOAD_PCT` of
    /// capacity, cascades the excess outward. Returns a human-readable log
    /// of every action taken (including the single error line if `id` is
    /// unknown).
    pub fn update_node_load(&mut self, graph: &mut Graph, id: NodeId, new_load: f64) -> Vec<String> {
        let Some(node) = graph.get_node_mut(id) else {
            return vec![format!("Error: node {} not found in graph.", id)];
        };
        let old_load = node.current_load;
        node.set_load(new_load);
        self.sync_node(graph, id);

        let mut logs = vec![format!("Node {}: load changed {:.2} -> {:.2} kW", id, old_load, new_load)];

        let node = graph.get_node(id).expect("just updated");
        let threshold = node.max_capacity * TARGET_LOAD_PCT;
        if node.current_load > threshold {
            let mut visited = HashSet::new();
            visited.insert(id);
            let target = threshold;
            logs.extend(self.cascade(graph, id, target, &mut visited, MAX_CASCADE_DEPTH));
        }
        logs
    }

    /// Depth-limited recursive push of excess load from `source_id` toward
    /// `target`. Returns immediately (with no log) once excess drops to or
    /// below 0.1 kW or depth is exhausted.
    fn cascade(
        &mut self,
        graph: &mut Graph,
        source_id: NodeId,
        target: f64,
        visited: &mut HashSet<NodeId>,
        depth: u32,
    ) -> Vec<String> {
        let mut logs = Vec::new();
        let Some(source) = graph.get_node(source_id) else {
            return logs;
        };
        let mut excess = source.current_load - target;
        if excess <= 0.1 || depth == 0 {
            return logs;
        }
        let source_kind = source.kind;

        let mut candidates: Vec<(NodeId, f64)> = graph
            .get_neighbors(source_id)
            .iter()
            .filter_map(|line| {
                let neighbor = graph.get_node(line.target_id)?;
                if visited.contains(&neighbor.id) || !neighbor.active {
                    return None;
                }
                if !can_transfer_to(source_kind, neighbor.kind) {
                    return None;
                }
                let score = neighbor.load_percentage() + 0.05 * line.resistance_ohm;
                Some((neighbor.id, score))
            })
            .collect();
        candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        for (neighbor_id, _score) in candidates {
            if excess <= 0.1 {
                break;
            }
            visited.insert(neighbor_id);

            let mut room = {
                let neighbor = graph.get_node(neighbor_id).expect("candidate exists");
                neighbor.max_capacity * EMERGENCY_CAP_PCT - neighbor.current_load
            };

            if room < excess {
                let neighbor_target = {
                    let neighbor = graph.get_node(neighbor_id).expect("candidate exists");
                    neighbor.max_capacity * TARGET_LOAD_PCT
                };
                logs.extend(self.cascade(graph, neighbor_id, neighbor_target, visited, depth - 1));
                room = {
                    let neighbor = graph.get_node(neighbor_id).expect("candidate exists");
                    neighbor.max_capacity * EMERGENCY_CAP_PCT - neighbor.current_load
                };
            }

            if room > 1.0 {
                let transfer = excess.min(room);
                if let Some(neighbor) = graph.get_node_mut(neighbor_id) {
                    let new_load = neighbor.current_load + transfer;
                    neighbor.set_load(new_load);
                }
                if let Some(source) = graph.get_node_mut(source_id) {
                    let new_load = source.current_load - transfer;
                    source.set_load(new_load);
                }
                if let Some(edge) = graph.get_edge_mut(source_id, neighbor_id) {
                    edge.current_flow += transfer;
                }
                if let Some(edge) = graph.get_edge_mut(neighbor_id, source_id) {
                    edge.current_flow += transfer;
                }
                self.sync_node(graph, source_id);
                self.sync_node(graph, neighbor_id);
                excess -= transfer;
                logs.push(format!(" >> transferred {:.2} kW to neighbor {}", transfer, neighbor_id));
            }
        }

        if excess > 0.1 {
            logs.push(format!(
                "CRITICAL: could not fully redistribute. Remaining excess: {:.2} kW",
                excess
            ));
        } else {
            logs.push("SUCCESS: load balanced among neighbors.".to_string());
        }
        logs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecogrid_core::PowerNode;

    fn node(id: u64, kind: NodeKind, cap: f64, parent: Option<u64>) -> PowerNode {
        PowerNode::new(NodeId(id), kind, cap, 0.0, 0.0, 0.98, parent.map(NodeId))
    }

    #[test]
    fn test_can_transfer_to_rules() {
        assert!(!can_transfer_to(NodeKind::Consumer, NodeKind::Consumer));
        assert!(!can_transfer_to(NodeKind::Transformer, NodeKind::Consumer));
        assert!(!can_transfer_to(NodeKind::Transformer, NodeKind::Transformer));
        assert!(can_transfer_to(NodeKind::Transformer, NodeKind::Substation));
        assert!(can_transfer_to(NodeKind::Substation, NodeKind::Transformer));
    }

    #[test]
    fn test_cascade_spills_excess_to_neighbor_transformer() {
        let mut g = Graph::new();
        g.add_node(node(1, NodeKind::Substation, 10000.0, None));
        g.add_node(node(2, NodeKind::Transformer, 100.0, Some(1)));
        g.add_node(node(3, NodeKind::Transformer, 500.0, Some(1)));
        g.add_edge(NodeId(2), NodeId(3), 1.0, 0.1, 0.99).unwrap();
        g.add_edge(NodeId(1), NodeId(2), 1.0, 0.1, 0.99).unwrap();
        g.add_edge(NodeId(1), NodeId(3), 1.0, 0.1, 0.99).unwrap();

        let mut balancer = Balancer::new();
        balancer.sync_all(&g);
        let logs = balancer.update_node_load(&mut g, NodeId(2), 150.0);
        assert!(!logs.is_empty());

        let t_small = g.get_node(NodeId(2)).unwrap();
        let t_big = g.get_node(NodeId(3)).unwrap();
        assert!(t_small.current_load <= 100.0 * EMERGENCY_CAP_PCT + 1e-6);
        assert!(t_big.current_load > 0.0);

        let edge = g.get_edge(NodeId(2), NodeId(3)).unwrap();
        assert!(edge.current_flow > 0.0);
        let reverse = g.get_edge(NodeId(3), NodeId(2)).unwrap();
        assert!(reverse.current_flow > 0.0);
    }

    #[test]
    fn test_unknown_node_returns_single_error_log() {
        let mut g = Graph::new();
        let mut balancer = Balancer::new();
        let logs = balancer.update_node_load(&mut g, NodeId(999), 10.0);
        assert_eq!(logs.len(), 1);
        assert!(logs[0].contains("not found"));
    }

    #[test]
    fn test_cascade_leaves_source_overloaded_when_no_capacity_found() {
        let mut g = Graph::new();
        g.add_node(node(1, NodeKind::Transformer, 100.0, None));
        let mut balancer = Balancer::new();
        balancer.sync_all(&g);
        let logs = balancer.update_node_load(&mut g, NodeId(1), 500.0);
        assert!(logs.iter().any(|l| l.contains("CRITICAL")));
        assert!(g.get_node(NodeId(1)).unwrap().is_overloaded());
    }
}
