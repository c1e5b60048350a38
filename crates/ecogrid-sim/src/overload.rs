//! Overload detection (every third tick, §4.10) and the single-consumer
//! auto-protection response to a critically overloaded transformer
//! (§4.11).

use ecogrid_core::{Event, EventType, Graph, NodeId, NodeKind, Priority, PriorityQueue};

const CRITICAL_RATIO: f64 = 1.5;
const HIGH_RATIO: f64 = 1.2;
const MEDIUM_RATIO: f64 = 1.0;

fn classify(ratio: f64) -> Option<Priority> {
    if ratio >= CRITICAL_RATIO {
        Some(Priority::Critical)
    } else if ratio >= HIGH_RATIO {
        Some(Priority::High)
    } else if ratio >= MEDIUM_RATIO {
        Some(Priority::Medium)
    } else {
        None
    }
}

/// Two-pass sweep over transformers and substations: first drops stale
/// warnings for nodes that recovered, then raises/upgrades warnings for
/// nodes currently overloaded.
pub fn detect_overloads(graph: &Graph, queue: &mut PriorityQueue, tick: u64) {
    let infra_ids: Vec<NodeId> = graph
        .nodes()
        .filter(|n| matches!(n.kind, NodeKind::Transformer | NodeKind::Substation))
        .map(|n| n.id)
        .collect();

    for &id in &infra_ids {
        let Some(node) = graph.get_node(id) else { continue };
        if !node.is_overloaded() {
            queue.remove_event(id, EventType::OverloadWarning);
        }
    }

    for &id in &infra_ids {
        let Some(node) = graph.get_node(id) else { continue };
        if !node.active || !node.is_overloaded() {
            continue;
        }
        let ratio = node.load_percentage();
        let Some(class) = classify(ratio) else { continue };

        if queue.has_event(id, EventType::OverloadWarning) {
            queue.update_priority(id, EventType::OverloadWarning, class);
        } else {
            queue.push(Event::new(class, tick, EventType::OverloadWarning, id), true);
        }
    }
}

/// If any transformer is critically overloaded (≥150% capacity),
/// deactivates its single worst-contributing consumer to relieve it.
/// Never touches more than one consumer per critical transformer per
/// call.
pub fn auto_protect_critical_transformers(graph: &mut Graph, queue: &mut PriorityQueue, tick: u64) -> Vec<String> {
    let mut logs = Vec::new();
    let critical_transformers: Vec<NodeId> = graph
        .nodes()
        .filter(|n| n.active && n.kind == NodeKind::Transformer && n.load_percentage() >= CRITICAL_RATIO)
        .map(|n| n.id)
        .collect();

    for transformer_id in critical_transformers {
        let Some(transformer) = graph.get_node(transformer_id) else { continue };
        let t_capacity = transformer.max_capacity;

        let mut worst: Option<(NodeId, f64)> = None;
        for line in graph.get_neighbors(transformer_id) {
            let Some(consumer) = graph.get_node(line.target_id) else { continue };
            if consumer.kind != NodeKind::Consumer || !consumer.active {
                continue;
            }
            let consumer_portion = graph.get_edge(transformer_id, consumer.id).map(|e| e.current_flow.max(0.0)).unwrap_or(0.0);
            let cable_loss = graph.get_edge(transformer_id, consumer.id).map(|e| e.loss_kw(consumer_portion / 220.0)).unwrap_or(0.0);
            let impact_pct = if t_capacity > 0.0 { (consumer_portion * 1.05 + cable_loss) / t_capacity * 100.0 } else { 0.0 };
            let overload_ratio = consumer.load_percentage();

            if overload_ratio <= 1.0 && impact_pct <= 20.0 {
                continue;
            }
            let abnormal_score = 0.6 * overload_ratio + 0.4 * (impact_pct / 100.0);
            if worst.map(|(_, s)| abnormal_score > s).unwrap_or(true) {
                worst = Some((consumer.id, abnormal_score));
            }
        }

        if let Some((consumer_id, _)) = worst {
            if let Some(c) = graph.get_node_mut(consumer_id) {
                c.deactivate();
            }
            for &(a, b) in &[(transformer_id, consumer_id), (consumer_id, transformer_id)] {
                if let Some(e) = graph.get_edge_mut(a, b) {
                    e.current_flow = 0.0;
                }
            }
            queue.remove_event(consumer_id, EventType::OverloadWarning);
            queue.push(
                Event::new(Priority::Critical, tick, EventType::NodeFailure, consumer_id)
                    .with_payload("auto_deactivated=true"),
                true,
            );
            logs.push(format!(
                "[AUTO-PROTECT] consumer {} auto-deactivated to relieve transformer {}",
                consumer_id, transformer_id
            ));
        }
    }
    logs
}
