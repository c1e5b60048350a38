//! Failure injection and reactivation state machine. Failures cascade
//! downward with explicit failover rules; reactivation rebinds children to
//! whichever parent maximizes simulated global efficiency.

use crate::efficiency::calculate_global_efficiency;
use crate::redistributor::Redistributor;
use ecogrid_core::{Graph, NodeId, NodeKind};

/// Deactivates `id`, clearing its load and adjacent flows, and attempts to
/// fail over dependents according to their kind. Idempotent if already
/// inactive.
pub fn inject_failure(graph: &mut Graph, id: NodeId) -> Vec<String> {
    let mut logs = Vec::new();
    let Some(kind) = graph.get_node(id).map(|n| n.kind) else {
        logs.push(format!("Error: node {} not found.", id));
        return logs;
    };
    if !graph.get_node(id).unwrap().active {
        return logs;
    }

    match kind {
        NodeKind::Consumer => {
            deactivate_and_clear(graph, id);
            logs.push(format!("Node {} (consumer) failed.", id));
        }
        NodeKind::Transformer => {
            logs.extend(fail_transformer(graph, id));
        }
        NodeKind::Substation => {
            logs.extend(fail_substation(graph, id));
        }
    }
    logs
}

fn deactivate_and_clear(graph: &mut Graph, id: NodeId) {
    let neighbor_ids: Vec<NodeId> = graph.get_neighbors(id).iter().map(|l| l.target_id).collect();
    if let Some(node) = graph.get_node_mut(id) {
        node.deactivate();
    }
    for neighbor_id in neighbor_ids {
        if let Some(e) = graph.get_edge_mut(id, neighbor_id) {
            e.current_flow = 0.0;
        }
        if let Some(e) = graph.get_edge_mut(neighbor_id, id) {
            e.current_flow = 0.0;
        }
    }
}

fn fail_transformer(graph: &mut Graph, transformer_id: NodeId) -> Vec<String> {
    let mut logs = Vec::new();
    let served_consumers: Vec<NodeId> = graph
        .get_neighbors(transformer_id)
        .iter()
        .filter_map(|line| {
            let n = graph.get_node(line.target_id)?;
            let served = n.kind == NodeKind::Consumer
                && (n.parent_id == Some(transformer_id)
                    || graph.get_edge(transformer_id, n.id).map(|e| e.current_flow > 0.0).unwrap_or(false));
            served.then_some(n.id)
        })
        .collect();

    deactivate_and_clear(graph, transformer_id);
    logs.push(format!("Transformer {} failed.", transformer_id));

    for consumer_id in served_consumers {
        let consumer_load = graph.get_node(consumer_id).map(|n| n.current_load).unwrap_or(0.0);
        let mut alternates: Vec<NodeId> = graph
            .get_neighbors(consumer_id)
            .iter()
            .filter_map(|line| {
                let n = graph.get_node(line.target_id)?;
                let qualifies = n.kind == NodeKind::Transformer
                    && n.active
                    && n.id != transformer_id
                    && n.available_capacity() > 0.1 * consumer_load;
                qualifies.then_some(n.id)
            })
            .collect();

        if alternates.is_empty() {
            logs.extend(inject_failure(graph, consumer_id));
            continue;
        }

        if alternates.len() == 1 {
            let alt = alternates.remove(0);
            migrate_consumer(graph, consumer_id, alt, consumer_load);
            logs.push(format!("Consumer {} migrated to transformer {}.", consumer_id, alt));
        } else {
            let total_capacity: f64 = alternates.iter().filter_map(|&a| graph.get_node(a)).map(|n| n.available_capacity()).sum();
            if total_capacity <= 0.0 {
                logs.extend(inject_failure(graph, consumer_id));
                continue;
            }
            for alt in &alternates {
                let share = graph.get_node(*alt).map(|n| n.available_capacity()).unwrap_or(0.0) / total_capacity;
                let portion = (consumer_load * share).min(graph.get_node(*alt).map(|n| n.available_capacity()).unwrap_or(0.0));
                if let Some(e) = graph.get_edge_mut(*alt, consumer_id) {
                    e.current_flow += portion;
                }
            }
            if let Some(first) = alternates.first() {
                if let Some(c) = graph.get_node_mut(consumer_id) {
                    c.parent_id = Some(*first);
                }
            }
            logs.push(format!("Consumer {} split across {} alternates.", consumer_id, alternates.len()));
        }
    }

    logs
}

fn migrate_consumer(graph: &mut Graph, consumer_id: NodeId, new_parent: NodeId, consumer_load: f64) {
    let old_parent = graph.get_node(consumer_id).and_then(|c| c.parent_id);
    if let Some(old) = old_parent {
        if let Some(e) = graph.get_edge_mut(old, consumer_id) {
            e.current_flow = 0.0;
        }
    }
    graph.rebind_parent(consumer_id, Some(new_parent));
    if let Some(e) = graph.get_edge_mut(new_parent, consumer_id) {
        e.current_flow = consumer_load;
    }
}

fn fail_substation(graph: &mut Graph, substation_id: NodeId) -> Vec<String> {
    let mut logs = Vec::new();
    let served_transformers: Vec<NodeId> = graph
        .get_neighbors(substation_id)
        .iter()
        .filter_map(|line| {
            let n = graph.get_node(line.target_id)?;
            let served = n.kind == NodeKind::Transformer
                && (n.parent_id == Some(substation_id)
                    || graph.get_edge(substation_id, n.id).map(|e| e.current_flow > 0.0).unwrap_or(false));
            served.then_some(n.id)
        })
        .collect();

    deactivate_and_clear(graph, substation_id);
    logs.push(format!("Substation {} failed.", substation_id));

    for transformer_id in served_transformers {
        let alt_substation = graph
            .get_neighbors(transformer_id)
            .iter()
            .filter_map(|line| graph.get_node(line.target_id))
            .find(|n| n.kind == NodeKind::Substation && n.active && n.id != substation_id)
            .map(|n| n.id);

        match alt_substation {
            Some(alt) => {
                let flow = graph.get_edge(substation_id, transformer_id).map(|e| e.current_flow).unwrap_or(0.0);
                graph.rebind_parent(transformer_id, Some(alt));
                if let Some(e) = graph.get_edge_mut(alt, transformer_id) {
                    e.current_flow = flow;
                }
                logs.push(format!("Transformer {} rebound to substation {}.", transformer_id, alt));
            }
            None => {
                logs.extend(inject_failure(graph, transformer_id));
            }
        }
    }

    logs
}

/// Reactivates `id`. No-op if already active. Removes outstanding
/// NODE_FAILURE events and enqueues a MAINTENANCE event; callers own the
/// queue interaction since it lives in the orchestrator.
pub fn reactivate_node(graph: &mut Graph, redistributor: &mut Redistributor, id: NodeId, current_tick: u64) -> Vec<String> {
    let mut logs = Vec::new();
    let Some(node) = graph.get_node(id) else {
        logs.push(format!("Error: node {} not found.", id));
        return logs;
    };
    if node.active {
        return logs;
    }
    let kind = node.kind;

    match kind {
        NodeKind::Consumer => {
            if let Some(n) = graph.get_node_mut(id) {
                n.active = true;
            }
            logs.push(format!("Consumer {} reactivated.", id));
        }
        NodeKind::Transformer => {
            if let Some(n) = graph.get_node_mut(id) {
                n.active = true;
                n.last_reactivation_tick = Some(current_tick);
            }
            redistributor.mark_recently_reactivated(id);
            logs.extend(reactivate_transformer(graph, id));
        }
        NodeKind::Substation => {
            if let Some(n) = graph.get_node_mut(id) {
                n.active = true;
            }
            logs.extend(reactivate_substation(graph, id));
        }
    }
    logs
}

fn reactivate_transformer(graph: &mut Graph, transformer_id: NodeId) -> Vec<String> {
    let mut logs = Vec::new();
    let neighbor_ids: Vec<NodeId> = graph.get_neighbors(transformer_id).iter().map(|l| l.target_id).collect();
    for n in &neighbor_ids {
        if let Some(e) = graph.get_edge_mut(transformer_id, *n) {
            e.current_flow = 0.0;
        }
    }

    let candidate_consumers: Vec<NodeId> = neighbor_ids
        .iter()
        .copied()
        .filter(|&n| graph.get_node(n).map(|c| c.kind == NodeKind::Consumer).unwrap_or(false))
        .collect();

    let mut claimed_total = 0.0;
    for consumer_id in &candidate_consumers {
        let connected_transformers: Vec<NodeId> = graph
            .get_neighbors(*consumer_id)
            .iter()
            .filter_map(|line| graph.get_node(line.target_id))
            .filter(|n| n.kind == NodeKind::Transformer && n.active)
            .map(|n| n.id)
            .collect();

        let consumer_load = graph.get_node(*consumer_id).map(|c| c.current_load).unwrap_or(0.0);
        let mut best: Option<(NodeId, f64)> = None;
        for &t in &connected_transformers {
            let score = score_parent_candidate(graph, t, *consumer_id, consumer_load);
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((t, score));
            }
        }

        if let Some((winner, _)) = best {
            for &t in &connected_transformers {
                if t != winner {
                    if let Some(e) = graph.get_edge_mut(t, *consumer_id) {
                        e.current_flow = 0.0;
                    }
                }
            }
            if winner == transformer_id {
                graph.rebind_parent(*consumer_id, Some(transformer_id));
                if let Some(e) = graph.get_edge_mut(transformer_id, *consumer_id) {
                    e.current_flow = consumer_load;
                }
                claimed_total += consumer_load;
            }
        }
    }

    if claimed_total > 0.0 {
        if let Some(t) = graph.get_node_mut(transformer_id) {
            t.set_load(claimed_total * 1.05);
        }
    }
    logs.push(format!("Transformer {} reactivated, claimed {:.1} kW of consumer load.", transformer_id, claimed_total));
    logs
}

fn score_parent_candidate(graph: &mut Graph, transformer_id: NodeId, consumer_id: NodeId, transfer: f64) -> f64 {
    let old_load = graph.get_node(transformer_id).map(|n| n.current_load).unwrap_or(0.0);
    if let Some(t) = graph.get_node_mut(transformer_id) {
        t.current_load += transfer;
    }
    let simulated = calculate_global_efficiency(graph);
    if let Some(t) = graph.get_node_mut(transformer_id) {
        t.current_load = old_load;
    }

    let normalized = (simulated / 1000.0).min(1.0);
    let transformer_eta = graph.get_node(transformer_id).map(|n| n.efficiency).unwrap_or(0.9);
    let edge_eta = graph.get_edge(transformer_id, consumer_id).map(|e| e.efficiency).unwrap_or(0.95);
    0.7 * normalized + 0.3 * transformer_eta * edge_eta
}

fn reactivate_substation(graph: &mut Graph, substation_id: NodeId) -> Vec<String> {
    let mut logs = Vec::new();
    let children: Vec<NodeId> = graph
        .get_neighbors(substation_id)
        .iter()
        .filter_map(|line| graph.get_node(line.target_id))
        .filter(|n| n.kind == NodeKind::Transformer)
        .map(|n| n.id)
        .collect();

    for child_id in children {
        let child_inactive = graph.get_node(child_id).map(|n| !n.active).unwrap_or(false);
        let has_active_substation = graph
            .get_neighbors(child_id)
            .iter()
            .filter_map(|line| graph.get_node(line.target_id))
            .any(|n| n.kind == NodeKind::Substation && n.active);

        if child_inactive && !has_active_substation {
            graph.rebind_parent(child_id, Some(substation_id));
            if let Some(e) = graph.get_edge_mut(substation_id, child_id) {
                e.current_flow = 0.0;
            }
            logs.push(format!("Transformer {} reactivated as part of substation {}.", child_id, substation_id));
        } else if graph.get_node(child_id).map(|n| n.active).unwrap_or(false) {
            graph.rebind_parent(child_id, Some(substation_id));
            if let Some(e) = graph.get_edge_mut(substation_id, child_id) {
                e.current_flow = 0.0;
            }
        }
    }
    logs
}

/// Pins `load` onto a consumer and scales any existing proportional flows.
pub fn inject_manual_load(graph: &mut Graph, id: NodeId, load: f64) -> Vec<String> {
    let mut logs = Vec::new();
    let Some(node) = graph.get_node(id) else {
        logs.push(format!("Error: node {} not found.", id));
        return logs;
    };
    if node.kind != NodeKind::Consumer {
        logs.push(format!("Node {} is not a consumer; manual load ignored.", id));
        return logs;
    }
    let old_load = node.current_load;

    let neighbor_ids: Vec<NodeId> = graph.get_neighbors(id).iter().map(|l| l.target_id).collect();
    if let Some(n) = graph.get_node_mut(id) {
        n.set_load(load);
        n.manual_load = true;
    }

    if old_load > 0.1 && (load - old_load).abs() > 0.1 {
        for neighbor_id in neighbor_ids {
            if let Some(e) = graph.get_edge_mut(neighbor_id, id) {
                if e.current_flow > 0.0 {
                    e.current_flow = (e.current_flow * load / old_load).max(0.0);
                }
            }
        }
    }

    logs.push(format!("Node {}: manual load set to {:.2} kW.", id, load));
    logs
}

/// Clears an overloaded node back to 60% of capacity and its flows to 0.
pub fn normalize_node(graph: &mut Graph, id: NodeId) -> Vec<String> {
    let mut logs = Vec::new();
    let Some(node) = graph.get_node(id) else {
        logs.push(format!("Error: node {} not found.", id));
        return logs;
    };
    if !node.is_overloaded() {
        return logs;
    }
    let max_capacity = node.max_capacity;

    let neighbor_ids: Vec<NodeId> = graph.get_neighbors(id).iter().map(|l| l.target_id).collect();
    if let Some(n) = graph.get_node_mut(id) {
        n.set_load(max_capacity * 0.60);
        n.manual_load = false;
    }
    for neighbor_id in neighbor_ids {
        if let Some(e) = graph.get_edge_mut(id, neighbor_id) {
            e.current_flow = 0.0;
        }
        if let Some(e) = graph.get_edge_mut(neighbor_id, id) {
            e.current_flow = 0.0;
        }
    }
    logs.push(format!("Node {} normalized to 60% capacity.", id));
    logs
}
