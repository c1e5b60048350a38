//! Infrastructure roll-up: after the sensor fabric updates consumer
//! loads, rebuild transformer and substation loads so hierarchical
//! conservation holds up to advertised losses. Idempotent — running it
//! twice in a row with no intervening load change produces the same
//! state.

use ecogrid_core::{Graph, NodeId, NodeKind};
use std::collections::HashMap;

const TRANSFORMER_LOSS_FACTOR: f64 = 0.05;
const SUBSTATION_IDLE_BASELINE_PCT: f64 = 0.05;

/// Runs the full five-step roll-up and returns a short log of any
/// corrective actions taken (parent rebinds, flow rescales).
pub fn roll_up(graph: &mut Graph) -> Vec<String> {
    let mut logs = Vec::new();
    logs.extend(ensure_all_consumers_have_transformer(graph));
    logs.extend(validate_proportional_distributions(graph));
    let mapping = calculate_consumer_transformer_mapping(graph);
    apply_transformer_loads(graph, &mapping);
    apply_substation_loads(graph);
    logs
}

/// Step 1: any active consumer whose parent is missing, inactive, or not
/// physically connected is rebound to the connected active transformer
/// that maximizes `eta_transformer * eta_edge`.
fn ensure_all_consumers_have_transformer(graph: &mut Graph) -> Vec<String> {
    let mut logs = Vec::new();
    let consumer_ids: Vec<NodeId> = graph
        .nodes()
        .filter(|n| n.active && n.kind == NodeKind::Consumer)
        .map(|n| n.id)
        .collect();

    for consumer_id in consumer_ids {
        let parent_ok = graph
            .get_node(consumer_id)
            .and_then(|c| c.parent_id)
            .and_then(|p| graph.get_node(p))
            .map(|p| p.active && graph.get_edge(consumer_id, p.id).is_some())
            .unwrap_or(false);
        if parent_ok {
            continue;
        }

        let mut best: Option<(NodeId, f64)> = None;
        for line in graph.get_neighbors(consumer_id) {
            let Some(candidate) = graph.get_node(line.target_id) else { continue };
            if candidate.kind != NodeKind::Transformer || !candidate.active {
                continue;
            }
            let score = candidate.efficiency * line.efficiency;
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((candidate.id, score));
            }
        }

        if let Some((new_parent, _)) = best {
            graph.rebind_parent(consumer_id, Some(new_parent));
            logs.push(format!("[ROLLUP] consumer {} rebound to transformer {}", consumer_id, new_parent));
        }
    }
    logs
}

/// Step 2: clamp each consumer's incoming transformer flows so they never
/// exceed its current load, and reconcile shortfall/excess against the
/// hierarchical parent edge.
fn validate_proportional_distributions(graph: &mut Graph) -> Vec<String> {
    let mut logs = Vec::new();
    let consumer_ids: Vec<NodeId> = graph
        .nodes()
        .filter(|n| n.active && n.kind == NodeKind::Consumer)
        .map(|n| n.id)
        .collect();

    for consumer_id in consumer_ids {
        let load = graph.get_node(consumer_id).map(|c| c.current_load).unwrap_or(0.0);
        let transformer_ids: Vec<NodeId> = graph
            .get_neighbors(consumer_id)
            .iter()
            .filter_map(|line| graph.get_node(line.target_id))
            .filter(|n| n.kind == NodeKind::Transformer)
            .map(|n| n.id)
            .collect();

        for &t in &transformer_ids {
            if let Some(e) = graph.get_edge_mut(t, consumer_id) {
                if e.current_flow > load {
                    e.current_flow = load;
                }
            }
        }

        let total: f64 = transformer_ids
            .iter()
            .filter_map(|&t| graph.get_edge(t, consumer_id))
            .map(|e| e.current_flow.max(0.0))
            .sum();

        if total <= 0.0 {
            if graph.get_node(consumer_id).and_then(|c| c.parent_id).is_none() {
                if let Some(&first) = transformer_ids.first() {
                    graph.rebind_parent(consumer_id, Some(first));
                }
            }
            continue;
        }

        let tolerance = (0.01 * load).max(0.1);
        if total > load + tolerance {
            let scale = load / total;
            for &t in &transformer_ids {
                if let Some(e) = graph.get_edge_mut(t, consumer_id) {
                    e.current_flow *= scale;
                }
            }
            logs.push(format!("[ROLLUP] consumer {} flows rescaled down by {:.3}", consumer_id, scale));
        } else if total < load - 0.001 {
            let remainder = load - total;
            if let Some(parent) = graph.get_node(consumer_id).and_then(|c| c.parent_id) {
                if graph.get_edge(parent, consumer_id).is_none() {
                    let _ = graph.add_edge(parent, consumer_id, 1.0, 0.05, 0.95);
                }
                if let Some(e) = graph.get_edge_mut(parent, consumer_id) {
                    e.current_flow += remainder;
                }
            }
        }
    }
    logs
}

/// Step 3: consumer -> [(transformer_id, portion)] built from positive
/// edge flows, topped up against the hierarchical parent when short.
fn calculate_consumer_transformer_mapping(graph: &Graph) -> HashMap<NodeId, Vec<(NodeId, f64)>> {
    let mut mapping: HashMap<NodeId, Vec<(NodeId, f64)>> = HashMap::new();

    for consumer in graph.nodes().filter(|n| n.active && n.kind == NodeKind::Consumer) {
        let load = consumer.current_load;
        let mut portions: Vec<(NodeId, f64)> = graph
            .get_neighbors(consumer.id)
            .iter()
            .filter(|line| graph.get_node(line.target_id).map(|n| n.kind == NodeKind::Transformer).unwrap_or(false))
            .filter_map(|line| graph.get_edge(line.target_id, consumer.id).map(|e| (line.target_id, e.current_flow.max(0.0).min(load))))
            .filter(|(_, portion)| *portion > 0.0)
            .collect();

        let mut total: f64 = portions.iter().map(|(_, p)| p).sum();

        if total < 0.99 * load {
            if let Some(parent_id) = consumer.parent_id {
                if graph.get_node(parent_id).map(|p| p.active).unwrap_or(false) {
                    let shortfall = load - total;
                    if let Some(entry) = portions.iter_mut().find(|(t, _)| *t == parent_id) {
                        entry.1 += shortfall;
                    } else {
                        portions.push((parent_id, shortfall));
                    }
                    total = load;
                }
            }
        }

        if total > 0.0 && (total - load).abs() > 0.1 {
            let scale = load / total;
            for (_, p) in portions.iter_mut() {
                *p *= scale;
            }
        } else if total == 0.0 {
            if let Some(parent_id) = consumer.parent_id {
                portions.push((parent_id, load));
            }
        }

        mapping.insert(consumer.id, portions);
    }
    mapping
}

/// Step 4: for each active transformer, sum allocated consumer portions,
/// add transformer and cable losses, and set the resulting load. When no
/// consumer edge is actively carrying a redistributed flow, the result is
/// smoothed against the previous load (`0.7*old + 0.3*new`), matching the
/// sensor fabric's description of transformer readings.
fn apply_transformer_loads(graph: &mut Graph, mapping: &HashMap<NodeId, Vec<(NodeId, f64)>>) {
    let transformer_ids: Vec<NodeId> = graph.nodes().filter(|n| n.active && n.kind == NodeKind::Transformer).map(|n| n.id).collect();

    for transformer_id in transformer_ids {
        let mut total_children = 0.0;
        let mut cable_losses = 0.0;
        let mut has_active_redistribution = false;

        for (&consumer_id, portions) in mapping.iter() {
            for &(t, portion) in portions {
                if t != transformer_id {
                    continue;
                }
                let consumer_load = graph.get_node(consumer_id).map(|c| c.current_load).unwrap_or(0.0);
                let capped = portion.min(consumer_load);
                total_children += capped;
                if let Some(edge) = graph.get_edge(transformer_id, consumer_id) {
                    cable_losses += edge.loss_kw(capped / 220.0);
                    if edge.current_flow > 0.0 {
                        has_active_redistribution = true;
                    }
                }
            }
        }

        let transformer_losses = TRANSFORMER_LOSS_FACTOR * total_children;
        let natural_load = total_children + transformer_losses + cable_losses;

        let old_load = graph.get_node(transformer_id).map(|t| t.current_load).unwrap_or(0.0);
        let final_load = if has_active_redistribution { natural_load } else { 0.7 * old_load + 0.3 * natural_load };

        if let Some(t) = graph.get_node_mut(transformer_id) {
            t.set_load(final_load);
        }
    }
}

/// Step 5: substation load is the sum of its distinct active transformer
/// children's current load, or a 5% idle baseline if it has none.
fn apply_substation_loads(graph: &mut Graph) {
    let substation_ids: Vec<NodeId> = graph.nodes().filter(|n| n.active && n.kind == NodeKind::Substation).map(|n| n.id).collect();

    for substation_id in substation_ids {
        let children: Vec<NodeId> = graph
            .get_children(substation_id)
            .iter()
            .filter(|c| c.active && c.kind == NodeKind::Transformer)
            .map(|c| c.id)
            .collect();

        let new_load = if children.is_empty() {
            graph.get_node(substation_id).map(|s| s.max_capacity * SUBSTATION_IDLE_BASELINE_PCT).unwrap_or(0.0)
        } else {
            children.iter().filter_map(|&id| graph.get_node(id)).map(|n| n.current_load).sum()
        };

        if let Some(s) = graph.get_node_mut(substation_id) {
            s.set_load(new_load);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecogrid_core::PowerNode;

    fn node(id: u64, kind: NodeKind, cap: f64, parent: Option<u64>) -> PowerNode {
        PowerNode::new(NodeId(id), kind, cap, 0.0, 0.0, 0.95, parent.map(NodeId))
    }

    fn three_tier() -> Graph {
        let mut g = Graph::new();
        g.add_node(node(1, NodeKind::Substation, 10000.0, None));
        g.add_node(node(10, NodeKind::Transformer, 1000.0, Some(1)));
        let mut c = node(100, NodeKind::Consumer, 200.0, Some(10));
        c.set_load(80.0);
        g.add_node(c);
        g.add_edge(NodeId(1), NodeId(10), 1.0, 0.05, 0.98).unwrap();
        g.add_edge(NodeId(10), NodeId(100), 0.5, 0.02, 0.97).unwrap();
        g
    }

    #[test]
    fn test_rollup_assigns_flow_to_hierarchical_parent_when_no_flow_present() {
        let mut g = three_tier();
        roll_up(&mut g);
        let edge = g.get_edge(NodeId(10), NodeId(100)).unwrap();
        assert!(edge.current_flow > 0.0);
        let transformer = g.get_node(NodeId(10)).unwrap();
        assert!(transformer.current_load > 0.0);
    }

    #[test]
    fn test_rollup_is_idempotent_once_settled() {
        let mut g = three_tier();
        roll_up(&mut g);
        let first_pass = g.get_node(NodeId(10)).unwrap().current_load;
        roll_up(&mut g);
        let second_pass = g.get_node(NodeId(10)).unwrap().current_load;
        assert!((first_pass - second_pass).abs() < 1e-6);
    }

    #[test]
    fn test_substation_uses_idle_baseline_with_no_children() {
        let mut g = Graph::new();
        g.add_node(node(1, NodeKind::Substation, 1000.0, None));
        roll_up(&mut g);
        assert_eq!(g.get_node(NodeId(1)).unwrap().current_load, 50.0);
    }

    #[test]
    fn test_rebinds_consumer_with_missing_parent() {
        let mut g = Graph::new();
        g.add_node(node(1, NodeKind::Substation, 10000.0, None));
        g.add_node(node(10, NodeKind::Transformer, 1000.0, Some(1)));
        let mut c = node(100, NodeKind::Consumer, 200.0, None);
        c.set_load(50.0);
        g.add_node(c);
        g.add_edge(NodeId(10), NodeId(100), 0.5, 0.02, 0.97).unwrap();
        roll_up(&mut g);
        assert_eq!(g.get_node(NodeId(100)).unwrap().parent_id, Some(NodeId(10)));
    }
}
