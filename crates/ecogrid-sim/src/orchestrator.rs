//! `GridSimulator`: owns the whole engine and drives the per-tick
//! pipeline described by the component design. Every public command
//! method is infallible from the caller's perspective — failures are
//! absorbed into the bounded log.

use crate::overload::{auto_protect_critical_transformers, detect_overloads};
use crate::rollup::roll_up;
use crate::sensor::run_sensor_fabric;
use ecogrid_adms::{calculate_global_efficiency, inject_failure, inject_manual_load, normalize_node, reactivate_node, Redistributor};
use ecogrid_balancer::Balancer;
use ecogrid_core::{EventType, Graph, NodeId, NodeKind, PowerNode, PriorityQueue, QueueStatistics};
use std::collections::VecDeque;
use tracing::debug;

const LOG_CAPACITY: usize = 50;
const EVENT_AGE_PURGE_TICKS: u64 = 300;
const REDISTRIBUTION_COOLDOWN_TICKS: u64 = 6;
const MAX_EVENTS_PER_TICK: usize = 5;

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub enable_noise: bool,
    pub queue_max_size: Option<usize>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self { enable_noise: true, queue_max_size: Some(500) }
    }
}

pub struct GridSimulator {
    graph: Graph,
    balancer: Balancer,
    redistributor: Redistributor,
    queue: PriorityQueue,
    tick: u64,
    last_redistribution_tick: Option<u64>,
    log: VecDeque<String>,
    config: SimulatorConfig,
}

impl GridSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let queue_max_size = config.queue_max_size;
        Self {
            graph: Graph::new(),
            balancer: Balancer::new(),
            redistributor: Redistributor::new(),
            queue: PriorityQueue::new(queue_max_size),
            tick: 0,
            last_redistribution_tick: None,
            log: VecDeque::with_capacity(LOG_CAPACITY),
            config,
        }
    }

    fn push_log(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!("{line}");
        if self.log.len() == LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(line);
    }

    fn push_logs(&mut self, lines: Vec<String>) {
        for line in lines {
            self.push_log(line);
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn get_log(&self) -> Vec<String> {
        self.log.iter().cloned().collect()
    }

    pub fn get_queue_statistics(&self) -> QueueStatistics {
        self.queue.get_statistics()
    }

    pub fn get_metrics(&self) -> SimulatorMetrics {
        SimulatorMetrics {
            tick: self.tick,
            total_load: self.graph.nodes().filter(|n| n.active).map(|n| n.current_load).sum(),
            global_efficiency: calculate_global_efficiency(&self.graph),
            active_node_count: self.graph.nodes().filter(|n| n.active).count(),
            total_node_count: self.graph.node_count(),
            queue_statistics: self.get_queue_statistics(),
        }
    }

    pub fn add_node(&mut self, node: PowerNode) {
        self.graph.add_node(node);
    }

    pub fn add_edge(&mut self, u: NodeId, v: NodeId, distance_km: f64, resistance_ohm: f64, efficiency: f64) {
        if let Err(e) = self.graph.add_edge(u, v, distance_km, resistance_ohm, efficiency) {
            self.push_log(format!("Error: {e}"));
        }
    }

    pub fn inject_failure(&mut self, id: NodeId) {
        let logs = inject_failure(&mut self.graph, id);
        self.push_logs(logs);
        roll_up(&mut self.graph);
        self.balancer.sync_all(&self.graph);
    }

    pub fn reactivate_node(&mut self, id: NodeId) {
        let logs = reactivate_node(&mut self.graph, &mut self.redistributor, id, self.tick);
        self.push_logs(logs);
        self.queue.remove_event(id, EventType::NodeFailure);
        self.queue.push(
            ecogrid_core::Event::new(ecogrid_core::Priority::Medium, self.tick, EventType::Maintenance, id),
            true,
        );
        roll_up(&mut self.graph);
        self.balancer.sync_all(&self.graph);
    }

    pub fn inject_manual_load(&mut self, id: NodeId, load: f64) {
        let logs = inject_manual_load(&mut self.graph, id, load);
        self.push_logs(logs);
        if let Some(node) = self.graph.get_node(id) {
            let ratio = node.load_percentage();
            let priority = classify_overload_priority(ratio);
            self.queue.push(
                ecogrid_core::Event::new(priority, self.tick, EventType::OverloadWarning, id),
                true,
            );
        }
        roll_up(&mut self.graph);
        self.balancer.sync_all(&self.graph);
    }

    pub fn normalize_node(&mut self, id: NodeId) {
        let logs = normalize_node(&mut self.graph, id);
        let did_normalize = !logs.is_empty();
        self.push_logs(logs);
        if !did_normalize {
            return;
        }
        self.queue.remove_event(id, EventType::OverloadWarning);
        self.queue.push(
            ecogrid_core::Event::new(ecogrid_core::Priority::Medium, self.tick, EventType::Maintenance, id),
            true,
        );
        roll_up(&mut self.graph);
        self.balancer.sync_all(&self.graph);
    }

    /// Rebinds every consumer to whichever connected, active transformer
    /// maximizes `eta_transformer * eta_edge`, then rolls up. Intended for
    /// initial topology setup before the first `step()`.
    pub fn optimize_initial_transformer_assignment(&mut self) {
        let consumer_ids: Vec<NodeId> = self.graph.nodes().filter(|n| n.active && n.kind == NodeKind::Consumer).map(|n| n.id).collect();
        for consumer_id in consumer_ids {
            let mut best: Option<(NodeId, f64)> = None;
            for line in self.graph.get_neighbors(consumer_id) {
                let Some(candidate) = self.graph.get_node(line.target_id) else { continue };
                if candidate.kind != NodeKind::Transformer || !candidate.active {
                    continue;
                }
                let score = candidate.efficiency * line.efficiency;
                if best.map(|(_, s)| score > s).unwrap_or(true) {
                    best = Some((candidate.id, score));
                }
            }
            if let Some((best_parent, _)) = best {
                self.graph.rebind_parent(consumer_id, Some(best_parent));
            }
        }
        roll_up(&mut self.graph);
        self.balancer.sync_all(&self.graph);
    }

    /// Advances the simulation by one tick, running the full eight-step
    /// pipeline. Infallible: every internal error condition is absorbed
    /// into the bounded log.
    pub fn step(&mut self) {
        self.tick += 1;

        if self.config.enable_noise {
            self.run_sensor_step();
        }

        if self.tick % 3 == 0 {
            self.run_redistribution_step();
        }

        if self.tick % 3 == 0 {
            detect_overloads(&self.graph, &mut self.queue, self.tick);
            let logs = auto_protect_critical_transformers(&mut self.graph, &mut self.queue, self.tick);
            self.push_logs(logs);
        }

        if self.tick % 50 == 0 {
            let purged = self.queue.clear_old_events(self.tick, EVENT_AGE_PURGE_TICKS);
            if purged > 0 {
                self.push_log(format!("[QUEUE] purged {purged} stale events"));
            }
        }

        self.process_events();
        self.decay_unused_flows();
        roll_up(&mut self.graph);
        self.balancer.sync_all(&self.graph);
    }

    fn run_sensor_step(&mut self) {
        let snapshot: Vec<(NodeId, f64)> = self
            .graph
            .nodes()
            .filter(|n| {
                n.active
                    && n.kind == NodeKind::Consumer
                    && self
                        .graph
                        .get_neighbors(n.id)
                        .iter()
                        .any(|line| self.graph.get_edge(line.target_id, n.id).map(|e| e.current_flow > 0.0).unwrap_or(false))
            })
            .map(|n| (n.id, n.current_load))
            .collect();

        run_sensor_fabric(&mut self.graph, self.tick, self.config.enable_noise);

        for (consumer_id, old_load) in snapshot {
            let new_load = self.graph.get_node(consumer_id).map(|n| n.current_load).unwrap_or(old_load);
            if (new_load - old_load).abs() > 0.1 {
                self.recalculate_proportional_distribution(consumer_id, old_load, new_load);
            }
        }
        roll_up(&mut self.graph);
    }

    /// Scales every positive-flow transformer->consumer edge by `new/old`
    /// when the consumer's load changed meaningfully this tick.
    fn recalculate_proportional_distribution(&mut self, consumer_id: NodeId, old_load: f64, new_load: f64) {
        if old_load <= 0.0 {
            return;
        }
        let scale = new_load / old_load;
        let transformer_ids: Vec<NodeId> = self
            .graph
            .get_neighbors(consumer_id)
            .iter()
            .filter(|line| self.graph.get_node(line.target_id).map(|n| n.kind == NodeKind::Transformer).unwrap_or(false))
            .map(|line| line.target_id)
            .collect();
        for t in transformer_ids {
            if let Some(e) = self.graph.get_edge_mut(t, consumer_id) {
                if e.current_flow > 0.0 {
                    e.current_flow = (e.current_flow * scale).max(0.0);
                }
            }
        }
    }

    fn run_redistribution_step(&mut self) {
        let cleanup_logs = self.redistributor.cleanup_old_redistributions(&mut self.graph);
        if !cleanup_logs.is_empty() {
            self.push_logs(cleanup_logs);
            roll_up(&mut self.graph);
        }

        let due = self.last_redistribution_tick.map(|last| self.tick.saturating_sub(last) >= REDISTRIBUTION_COOLDOWN_TICKS).unwrap_or(true);
        if !due {
            return;
        }
        let logs = self.redistributor.check_and_redistribute(&mut self.graph, self.tick);
        if !logs.is_empty() {
            self.last_redistribution_tick = Some(self.tick);
            self.push_logs(logs);
            roll_up(&mut self.graph);
        }
    }

    fn process_events(&mut self) {
        let mut to_reinsert = Vec::new();
        for _ in 0..MAX_EVENTS_PER_TICK {
            let Some(event) = self.queue.pop() else { break };
            if self.handle_event(&event) == EventOutcome::Keep {
                to_reinsert.push(event);
            }
        }
        for event in to_reinsert {
            self.queue.push(event, false);
        }
    }

    fn handle_event(&mut self, event: &ecogrid_core::Event) -> EventOutcome {
        match event.event_type {
            EventType::NodeFailure => {
                self.push_log(format!("[EVENT] node failure acknowledged for {}", event.node_id));
                EventOutcome::Drop
            }
            EventType::OverloadWarning => {
                let still_overloaded = self.graph.get_node(event.node_id).map(|n| n.is_overloaded()).unwrap_or(false);
                if still_overloaded {
                    EventOutcome::Keep
                } else {
                    EventOutcome::Drop
                }
            }
            EventType::Maintenance => {
                self.push_log(format!("[EVENT] maintenance acknowledged for {}", event.node_id));
                EventOutcome::Drop
            }
            EventType::LoadChange => EventOutcome::Drop,
        }
    }

    /// Hierarchical transformer<->consumer flow with positive current is
    /// preserved across ticks; every other edge decays toward zero.
    fn decay_unused_flows(&mut self) {
        let pairs = self.graph.unordered_edges();
        for (a, b) in pairs {
            let is_hierarchical_with_flow = {
                let node_a = self.graph.get_node(a);
                let node_b = self.graph.get_node(b);
                match (node_a, node_b) {
                    (Some(na), Some(nb)) => {
                        let is_t_c_pair = matches!(
                            (na.kind, nb.kind),
                            (NodeKind::Transformer, NodeKind::Consumer) | (NodeKind::Consumer, NodeKind::Transformer)
                        );
                        is_t_c_pair
                            && (self.graph.get_edge(a, b).map(|e| e.current_flow > 0.0).unwrap_or(false)
                                || self.graph.get_edge(b, a).map(|e| e.current_flow > 0.0).unwrap_or(false))
                    }
                    _ => false,
                }
            };
            if is_hierarchical_with_flow {
                continue;
            }
            for &(x, y) in &[(a, b), (b, a)] {
                if let Some(e) = self.graph.get_edge_mut(x, y) {
                    e.current_flow = if e.current_flow > 1.0 { e.current_flow * 0.7 } else { 0.0 };
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum EventOutcome {
    Keep,
    Drop,
}

fn classify_overload_priority(ratio: f64) -> ecogrid_core::Priority {
    use ecogrid_core::Priority::*;
    if ratio >= 1.5 {
        Critical
    } else if ratio >= 1.2 {
        High
    } else if ratio >= 1.0 {
        Medium
    } else {
        Low
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorMetrics {
    pub tick: u64,
    pub total_load: f64,
    pub global_efficiency: f64,
    pub active_node_count: usize,
    pub total_node_count: usize,
    pub queue_statistics: QueueStatistics,
}
