//! Global efficiency metric: a single number summarizing how much useful
//! load the network moves relative to its losses.

use ecogrid_core::{Graph, NodeKind};

const SATURATION: f64 = 1000.0;

fn is_hierarchical_pair(graph: &Graph, a: ecogrid_core::NodeId, b: ecogrid_core::NodeId) -> Option<(ecogrid_core::NodeId, ecogrid_core::NodeId)> {
    let node_a = graph.get_node(a)?;
    let node_b = graph.get_node(b)?;
    if node_a.kind == NodeKind::Transformer && node_b.kind == NodeKind::Consumer && node_b.parent_id == Some(a) {
        return Some((a, b));
    }
    if node_b.kind == NodeKind::Transformer && node_a.kind == NodeKind::Consumer && node_a.parent_id == Some(b) {
        return Some((b, a));
    }
    if node_a.kind == NodeKind::Substation && node_b.kind == NodeKind::Transformer && node_b.parent_id == Some(a) {
        return Some((a, b));
    }
    if node_b.kind == NodeKind::Substation && node_a.kind == NodeKind::Transformer && node_a.parent_id == Some(b) {
        return Some((b, a));
    }
    None
}

/// `E = numerator / denominator`, saturated at 1000. 0 if both are 0; 1000
/// if denominator is 0 but numerator is positive (a lossless network).
pub fn calculate_global_efficiency(graph: &Graph) -> f64 {
    let mut numerator = 0.0;
    let mut denominator = 0.0;

    for node in graph.nodes() {
        if node.active {
            numerator += node.current_load * node.efficiency;
        }
    }

    for node in graph.nodes() {
        if node.active && node.current_load > 0.0 && node.efficiency > 0.0 && node.efficiency < 1.0 {
            denominator += node.current_load * (1.0 - node.efficiency) / node.efficiency;
        }
    }

    for (a, b) in graph.unordered_edges() {
        let (Some(node_a), Some(node_b)) = (graph.get_node(a), graph.get_node(b)) else {
            continue;
        };
        if !node_a.active || !node_b.active {
            continue;
        }

        let flow_ab = graph.get_edge(a, b).map(|e| e.current_flow).unwrap_or(0.0);
        let flow_ba = graph.get_edge(b, a).map(|e| e.current_flow).unwrap_or(0.0);

        let (load_passing, edge) = if flow_ab > 0.1 || flow_ba > 0.1 {
            if flow_ab >= flow_ba {
                (flow_ab, graph.get_edge(a, b))
            } else {
                (flow_ba, graph.get_edge(b, a))
            }
        } else if let Some((parent, child)) = is_hierarchical_pair(graph, a, b) {
            let child_load = graph.get_node(child).map(|n| n.current_load).unwrap_or(0.0);
            (child_load, graph.get_edge(parent, child))
        } else {
            continue;
        };

        if load_passing <= 1.0 {
            continue;
        }
        let Some(edge) = edge else { continue };
        if edge.efficiency > 0.0 && edge.efficiency < 1.0 {
            denominator += load_passing * (1.0 - edge.efficiency) / edge.efficiency;
        }
    }

    if denominator == 0.0 {
        if numerator == 0.0 {
            return 0.0;
        }
        return SATURATION;
    }

    (numerator / denominator).min(SATURATION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecogrid_core::{NodeId, PowerNode};

    fn node(id: u64, kind: NodeKind, cap: f64, eta: f64, parent: Option<u64>) -> PowerNode {
        PowerNode::new(NodeId(id), kind, cap, 0.0, 0.0, eta, parent.map(NodeId))
    }

    #[test]
    fn test_zero_load_yields_zero_efficiency() {
        let mut g = Graph::new();
        g.add_node(node(1, NodeKind::Substation, 1000.0, 0.98, None));
        assert_eq!(calculate_global_efficiency(&g), 0.0);
    }

    #[test]
    fn test_lossless_network_saturates() {
        let mut g = Graph::new();
        let mut s = node(1, NodeKind::Substation, 1000.0, 1.0, None);
        s.set_load(100.0);
        g.add_node(s);
        assert_eq!(calculate_global_efficiency(&g), SATURATION);
    }

    #[test]
    fn test_lossy_transformer_reduces_efficiency_below_saturation() {
        let mut g = Graph::new();
        let mut t = node(1, NodeKind::Transformer, 1000.0, 0.9, None);
        t.set_load(500.0);
        g.add_node(t);
        let e = calculate_global_efficiency(&g);
        assert!(e > 0.0 && e < SATURATION);
    }
}
