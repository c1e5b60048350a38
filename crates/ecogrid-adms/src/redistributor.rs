//! Consumer-to-transformer redistributor: when a transformer runs hot,
//! shift some of its consumers' load toward cooler alternates, weighted
//! by simulated global efficiency, transformer/edge efficiency, and
//! remaining headroom. Predictive cleanup reverts stale redistributions
//! once the source transformer has cooled back down.

use crate::efficiency::calculate_global_efficiency;
use ecogrid_core::{Graph, NodeId, NodeKind};
use std::collections::HashSet;

pub const THRESHOLD: f64 = 0.60;
pub const TARGET: f64 = 0.50;
pub const MIN_AMOUNT: f64 = 10.0;
pub const MIN_LOAD_DIFFERENCE: f64 = 0.15;
pub const MAX_PER_CYCLE_PCT: f64 = 0.20;
const SAFETY_MARGIN: f64 = 0.05;

#[derive(Default)]
pub struct Redistributor {
    recently_reactivated: HashSet<NodeId>,
}

impl Redistributor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_recently_reactivated(&mut self, transformer_id: NodeId) {
        self.recently_reactivated.insert(transformer_id);
    }

    fn expire_recently_reactivated(&mut self, graph: &Graph, current_tick: u64) {
        let mut expired = Vec::new();
        for &id in &self.recently_reactivated {
            let Some(t) = graph.get_node(id) else {
                expired.push(id);
                continue;
            };
            if !t.active {
                expired.push(id);
                continue;
            }
            if let Some(reactivated_at) = t.last_reactivation_tick {
                if current_tick.saturating_sub(reactivated_at) >= 9 {
                    expired.push(id);
                    continue;
                }
            }
            if t.current_load > t.max_capacity * 0.05 {
                expired.push(id);
            }
        }
        for id in expired {
            self.recently_reactivated.remove(&id);
        }
    }

    /// Finds overloaded transformers (load_pct > THRESHOLD) and processes
    /// the top 3 by severity. Does not run cleanup — the orchestrator
    /// calls [`Redistributor::cleanup_old_redistributions`] separately,
    /// on its own unconditional cadence.
    pub fn check_and_redistribute(&mut self, graph: &mut Graph, current_tick: u64) -> Vec<String> {
        self.expire_recently_reactivated(graph, current_tick);
        let mut logs = Vec::new();

        let mut overloaded: Vec<(NodeId, f64)> = graph
            .nodes()
            .filter(|n| n.active && n.kind == NodeKind::Transformer && n.load_percentage() > THRESHOLD)
            .map(|n| (n.id, n.load_percentage()))
            .collect();
        overloaded.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        overloaded.truncate(3);

        for (transformer_id, pct) in overloaded {
            logs.push(format!(
                "[REDISTRIBUTE] Transformer {} at {:.1}% usage",
                transformer_id,
                pct * 100.0
            ));
            logs.extend(self.redistribute_transformer(graph, transformer_id));
        }

        logs
    }

    fn connected_consumers(&self, graph: &Graph, transformer_id: NodeId) -> Vec<NodeId> {
        graph
            .get_neighbors(transformer_id)
            .iter()
            .filter_map(|line| {
                let n = graph.get_node(line.target_id)?;
                (n.active && n.kind == NodeKind::Consumer).then_some(n.id)
            })
            .collect()
    }

    fn redistribute_transformer(&mut self, graph: &mut Graph, transformer_id: NodeId) -> Vec<String> {
        let mut logs = Vec::new();
        let consumers = self.connected_consumers(graph, transformer_id);
        if consumers.is_empty() {
            logs.push(format!("  no consumers connected to transformer {}", transformer_id));
            return logs;
        }

        let transformer = graph.get_node(transformer_id).expect("exists");
        let excess_load = transformer.current_load - transformer.max_capacity * TARGET;
        if excess_load < MIN_AMOUNT {
            return logs;
        }
        let per_cycle_cap = excess_load.min(transformer.max_capacity * MAX_PER_CYCLE_PCT);
        if per_cycle_cap < MIN_AMOUNT {
            return logs;
        }

        let mut consumers_sorted: Vec<(NodeId, f64)> = consumers
            .iter()
            .filter_map(|&id| graph.get_node(id).map(|n| (id, n.current_load)))
            .collect();
        consumers_sorted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut remaining = per_cycle_cap;
        for (consumer_id, consumer_load) in consumers_sorted {
            if remaining <= 0.1 {
                break;
            }
            let max_redistributable = (0.5 * consumer_load).min(remaining);
            if max_redistributable < MIN_AMOUNT {
                continue;
            }

            let candidates = self.find_alternative_transformers(graph, consumer_id, transformer_id, max_redistributable);
            if candidates.is_empty() {
                logs.push(format!("  consumer {} has no alternative transformers", consumer_id));
                continue;
            }

            let applied = self.distribute_to_candidates(graph, consumer_id, transformer_id, &candidates, max_redistributable);
            logs.extend(applied);
            remaining -= max_redistributable;
        }

        logs
    }

    fn find_alternative_transformers(
        &self,
        graph: &mut Graph,
        consumer_id: NodeId,
        exclude_transformer_id: NodeId,
        estimated_transfer: f64,
    ) -> Vec<(NodeId, f64, f64)> {
        let source_pct = graph.get_node(exclude_transformer_id).map(|s| s.load_percentage()).unwrap_or(0.0);
        let neighbor_ids: Vec<NodeId> = graph.get_neighbors(consumer_id).iter().map(|l| l.target_id).collect();

        // First pass (immutable borrows only): filter down to qualifying
        // candidates and their static attributes.
        let mut screened: Vec<(NodeId, f64, f64)> = Vec::new();
        for candidate_id in neighbor_ids {
            let Some(candidate) = graph.get_node(candidate_id) else { continue };
            if candidate.kind != NodeKind::Transformer || candidate.id == exclude_transformer_id || !candidate.active {
                continue;
            }
            if candidate.load_percentage() > THRESHOLD {
                continue;
            }
            if self.recently_reactivated.contains(&candidate.id) {
                continue;
            }
            if source_pct - candidate.load_percentage() < MIN_LOAD_DIFFERENCE {
                continue;
            }
            let available = candidate.available_capacity() * 0.8;
            if available <= MIN_AMOUNT {
                continue;
            }
            screened.push((candidate.id, available, candidate.load_percentage()));
        }

        // Second pass: score each candidate one at a time, each scoring call
        // getting its own exclusive (temporary) mutation of the graph.
        let mut out = Vec::new();
        for (candidate_id, available, load_pct) in screened {
            let transfer_for_score = estimated_transfer.min(available);
            let efficiency_score = self.score_candidate(graph, candidate_id, exclude_transformer_id, consumer_id, transfer_for_score);
            let stability_score = (1.0 - load_pct) * 0.3;
            let combined = efficiency_score * 0.7 + stability_score * 0.3;
            out.push((candidate_id, available, combined));
        }
        out.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        out
    }

    /// Simulates moving `transfer` kW from `source_id` to `candidate_id`,
    /// scoring the resulting global efficiency plus static edge/transformer
    /// quality, then restores real state before returning.
    fn score_candidate(&self, graph: &mut Graph, candidate_id: NodeId, source_id: NodeId, consumer_id: NodeId, transfer: f64) -> f64 {
        let mut scratch = CloneableSnapshot::capture(graph, source_id, candidate_id);

        if let Some(source) = graph.get_node_mut(source_id) {
            let new_load = (source.current_load - transfer).max(0.0);
            source.current_load = new_load;
        }
        if let Some(candidate) = graph.get_node_mut(candidate_id) {
            candidate.current_load += transfer;
        }
        let global_efficiency = calculate_global_efficiency(graph);
        scratch.restore(graph);

        let normalized_global = (global_efficiency / 1000.0).min(1.0);
        let candidate = graph.get_node(candidate_id);
        let transformer_efficiency = candidate.map(|c| c.efficiency).unwrap_or(0.95);
        let edge_efficiency = graph.get_edge(candidate_id, consumer_id).map(|e| e.efficiency).unwrap_or(0.95);
        let capacity_ratio = candidate
            .map(|c| if c.max_capacity > 0.0 { (c.available_capacity() / c.max_capacity).min(1.0) } else { 0.0 })
            .unwrap_or(0.0);

        normalized_global * 0.6 + transformer_efficiency * 0.2 + edge_efficiency * 0.1 + capacity_ratio * 0.1
    }

    fn distribute_to_candidates(
        &self,
        graph: &mut Graph,
        consumer_id: NodeId,
        source_id: NodeId,
        candidates: &[(NodeId, f64, f64)],
        amount: f64,
    ) -> Vec<String> {
        let mut logs = Vec::new();
        let total_score: f64 = candidates.iter().map(|(_, _, s)| s).sum();
        let total_capacity: f64 = candidates.iter().map(|(_, c, _)| c).sum();
        if total_score <= 0.0 && total_capacity <= 0.0 {
            return logs;
        }

        let mut remaining = amount;
        for &(candidate_id, capacity, score) in candidates {
            if remaining <= 0.1 {
                break;
            }
            let proportion = if total_score > 0.0 { score / total_score } else { capacity / total_capacity };
            let mut transfer = (remaining * proportion).min(capacity).min(remaining);

            let Some(candidate) = graph.get_node(candidate_id) else { continue };
            let max_receive_per_cycle = candidate.max_capacity * MAX_PER_CYCLE_PCT;
            transfer = transfer.min(max_receive_per_cycle);

            let would_be = candidate.current_load + transfer;
            let would_be_pct = if candidate.max_capacity > 0.0 { would_be / candidate.max_capacity } else { 0.0 };
            if would_be_pct > THRESHOLD {
                let max_safe = candidate.max_capacity * THRESHOLD - candidate.current_load;
                transfer = transfer.min(max_safe.max(0.0));
            }
            if transfer < MIN_AMOUNT {
                continue;
            }

            if self.apply_transfer(graph, consumer_id, source_id, candidate_id, transfer) {
                logs.push(format!(
                    "    redistributed {:.1}kW of consumer {} from transformer {} to {}",
                    transfer, consumer_id, source_id, candidate_id
                ));
                remaining -= transfer;
            }
        }
        logs
    }

    fn apply_transfer(&self, graph: &mut Graph, consumer_id: NodeId, source_id: NodeId, candidate_id: NodeId, amount: f64) -> bool {
        let consumer_load = graph.get_node(consumer_id).map(|n| n.current_load).unwrap_or(0.0);

        let Some(source_edge) = graph.get_edge_mut(source_id, consumer_id) else {
            return false;
        };
        let current_source_flow = if source_edge.current_flow > 0.0 { source_edge.current_flow } else { consumer_load };
        let mut new_source_flow = (current_source_flow - amount).max(0.0);
        if graph.get_node(consumer_id).and_then(|c| c.parent_id) == Some(source_id) && new_source_flow < consumer_load * 0.1 {
            new_source_flow = new_source_flow.max(consumer_load * 0.1);
        }
        graph.get_edge_mut(source_id, consumer_id).unwrap().current_flow = new_source_flow;

        let Some(target_edge) = graph.get_edge_mut(candidate_id, consumer_id) else {
            return false;
        };
        let current_target_flow = target_edge.current_flow.max(0.0);
        target_edge.current_flow = current_target_flow + amount;
        true
    }

    /// Reverts redistributions once the hierarchical parent transformer is
    /// no longer at risk of cascading if they return.
    /// Reverts stale redistributions once the transformer they were moved
    /// away from has cooled back down. Runs unconditionally on its own
    /// cadence, independent of [`Redistributor::check_and_redistribute`].
    pub fn cleanup_old_redistributions(&self, graph: &mut Graph) -> Vec<String> {
        let mut logs = Vec::new();
        let consumer_ids: Vec<NodeId> = graph
            .nodes()
            .filter(|n| n.active && n.kind == NodeKind::Consumer)
            .map(|n| n.id)
            .collect();

        for consumer_id in consumer_ids {
            let flows: Vec<(NodeId, f64)> = graph
                .get_neighbors(consumer_id)
                .iter()
                .filter_map(|line| {
                    let n = graph.get_node(line.target_id)?;
                    if n.active && n.kind == NodeKind::Transformer {
                        let flow = graph.get_edge(n.id, consumer_id)?.current_flow;
                        (flow > 10.0).then_some((n.id, flow))
                    } else {
                        None
                    }
                })
                .collect();
            if flows.is_empty() {
                continue;
            }

            let parent_id = graph.get_node(consumer_id).and_then(|c| c.parent_id);
            let parent = parent_id.and_then(|p| graph.get_node(p)).filter(|p| p.active && p.kind == NodeKind::Transformer);
            let Some(parent) = parent else {
                let has_overloaded = flows.iter().any(|&(t, _)| graph.get_node(t).map(|n| n.load_percentage() > THRESHOLD).unwrap_or(false));
                if !has_overloaded {
                    for (t, _) in &flows {
                        if graph.get_node(*t).map(|n| n.load_percentage() <= THRESHOLD).unwrap_or(false) {
                            if let Some(e) = graph.get_edge_mut(*t, consumer_id) {
                                e.current_flow = 0.0;
                                logs.push(format!("[CLEANUP] no hierarchical parent for consumer {}: zeroed T{}", consumer_id, t));
                            }
                        }
                    }
                }
                continue;
            };
            let parent_id = parent.id;
            let parent_pct = parent.load_percentage();
            if parent_pct >= THRESHOLD {
                continue;
            }

            if parent_pct < 0.40 {
                for (t, _) in &flows {
                    if graph.get_node(*t).map(|n| n.load_percentage() <= THRESHOLD).unwrap_or(false) {
                        if let Some(e) = graph.get_edge_mut(*t, consumer_id) {
                            e.current_flow = 0.0;
                            logs.push(format!("[AGGRESSIVE CLEANUP] T{} far below threshold: zeroed T{}", parent_id, t));
                        }
                    }
                }
                continue;
            }

            let to_clean: Vec<(NodeId, f64)> = flows
                .iter()
                .filter(|(t, _)| graph.get_node(*t).map(|n| n.load_percentage() <= THRESHOLD).unwrap_or(false))
                .cloned()
                .collect();
            if to_clean.is_empty() {
                continue;
            }
            let total_returning: f64 = to_clean.iter().map(|(_, f)| f).sum();
            let simulated_pct = if parent.max_capacity > 0.0 {
                (parent.current_load + total_returning) / parent.max_capacity
            } else {
                0.0
            };
            let safety_threshold = if parent_pct < 0.50 { THRESHOLD - SAFETY_MARGIN } else { 0.52 };
            if simulated_pct >= safety_threshold {
                logs.push(format!(
                    "[PREDICTIVE CHECK] T{} at {:.1}% but cleanup would reach {:.1}% - keeping redistribution",
                    parent_id,
                    parent_pct * 100.0,
                    simulated_pct * 100.0
                ));
                continue;
            }

            for (t, _) in &flows {
                if *t != parent_id && graph.get_node(*t).map(|n| n.load_percentage() <= THRESHOLD).unwrap_or(false) {
                    if let Some(e) = graph.get_edge_mut(*t, consumer_id) {
                        e.current_flow = 0.0;
                        logs.push(format!("[CLEANUP] T{} back to normal: reverted T{}->consumer {}", parent_id, t, consumer_id));
                    }
                }
            }
        }

        logs
    }
}

/// Captures and restores the load of exactly two nodes, used to run a
/// temporary efficiency simulation without a full graph clone.
struct CloneableSnapshot {
    a: (NodeId, f64),
    b: (NodeId, f64),
}

impl CloneableSnapshot {
    fn capture(graph: &Graph, a: NodeId, b: NodeId) -> Self {
        Self {
            a: (a, graph.get_node(a).map(|n| n.current_load).unwrap_or(0.0)),
            b: (b, graph.get_node(b).map(|n| n.current_load).unwrap_or(0.0)),
        }
    }

    fn restore(&mut self, graph: &mut Graph) {
        if let Some(n) = graph.get_node_mut(self.a.0) {
            n.current_load = self.a.1;
        }
        if let Some(n) = graph.get_node_mut(self.b.0) {
            n.current_load = self.b.1;
        }
    }
}
