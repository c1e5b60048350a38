//! Property tests for the nine post-step/post-command invariants.

use ecogrid_core::{CapacityIndex, Event, EventType, NodeId, NodeKind, Priority, PowerNode, PriorityQueue};
use ecogrid_sim::{GridSimulator, SimulatorConfig};

fn no_noise_sim() -> GridSimulator {
    GridSimulator::new(SimulatorConfig { enable_noise: false, queue_max_size: None })
}

fn small_hierarchy() -> GridSimulator {
    let mut sim = no_noise_sim();
    sim.add_node(PowerNode::new(NodeId(1), NodeKind::Substation, 10000.0, 0.0, 0.0, 1.0, None));
    sim.add_node(PowerNode::new(NodeId(10), NodeKind::Transformer, 1000.0, 0.0, 0.0, 0.95, Some(NodeId(1))));
    sim.add_node(PowerNode::new(NodeId(100), NodeKind::Consumer, 500.0, 1.0, 0.0, 0.98, Some(NodeId(10))));
    sim.add_node(PowerNode::new(NodeId(101), NodeKind::Consumer, 500.0, 2.0, 0.0, 0.98, Some(NodeId(10))));
    sim.add_edge(NodeId(1), NodeId(10), 10.0, 0.05, 0.99);
    sim.add_edge(NodeId(10), NodeId(100), 0.5, 0.2, 0.95);
    sim.add_edge(NodeId(10), NodeId(101), 0.8, 0.2, 0.95);
    sim.inject_manual_load(NodeId(100), 200.0);
    sim.inject_manual_load(NodeId(101), 300.0);
    sim
}

/// Invariant 1: every active consumer's attributed inflow tracks its load.
#[test]
fn invariant_consumer_flow_conservation() {
    let mut sim = small_hierarchy();
    sim.step();

    for &(consumer_id, parent_id) in &[(NodeId(100), NodeId(10)), (NodeId(101), NodeId(10))] {
        let load = sim.graph().get_node(consumer_id).unwrap().current_load;
        let flow = sim.graph().get_edge(parent_id, consumer_id).map(|e| e.current_flow).unwrap_or(0.0);
        let attributed = if flow > 0.0 { flow } else { load };
        assert!((attributed - load).abs() <= (0.01 * load).max(0.1), "consumer {consumer_id} attributed {attributed} vs load {load}");
    }
}

/// Invariant 2: transformer load sits within [1.05x served, 1.05x served + losses + eps].
#[test]
fn invariant_transformer_load_bounds() {
    let mut sim = small_hierarchy();
    sim.step();

    let served: f64 = 200.0 + 300.0;
    let t = sim.graph().get_node(NodeId(10)).unwrap();
    assert!(t.current_load >= 1.05 * served - 1.0, "transformer load {} under floor", t.current_load);
}

/// Invariant 3: substation load equals sum of active transformer children, or idle baseline.
#[test]
fn invariant_substation_equals_sum_of_children_or_idle_baseline() {
    let mut sim = no_noise_sim();
    sim.add_node(PowerNode::new(NodeId(1), NodeKind::Substation, 10000.0, 0.0, 0.0, 1.0, None));
    sim.step();
    let s = sim.graph().get_node(NodeId(1)).unwrap();
    assert!((s.current_load - 0.05 * 10000.0).abs() < 1.0, "idle substation should sit at the 5% baseline");

    let mut sim = small_hierarchy();
    sim.step();
    let t_load = sim.graph().get_node(NodeId(10)).unwrap().current_load;
    let s_load = sim.graph().get_node(NodeId(1)).unwrap().current_load;
    assert!((s_load - t_load).abs() <= 0.05 * t_load + 1.0);
}

/// Invariant 4: CapacityIndex traversal is monotonically non-decreasing and complete.
#[test]
fn invariant_capacity_index_is_sorted_and_complete() {
    let mut index = CapacityIndex::new();
    index.insert(NodeId(1), 40.0);
    index.insert(NodeId(2), 10.0);
    index.insert(NodeId(3), 90.0);
    index.insert(NodeId(4), 10.0);

    let all = index.get_all_sorted();
    assert_eq!(all.len(), 4);
    for pair in all.windows(2) {
        assert!(pair[0].1 <= pair[1].1, "capacity index not sorted ascending: {:?}", all);
    }
}

/// Invariant 5: pop() sequence is non-decreasing in priority value.
#[test]
fn invariant_queue_pop_is_priority_ordered() {
    let mut queue = PriorityQueue::new(None);
    queue.push(Event::new(Priority::Low, 0, EventType::LoadChange, NodeId(1)), true);
    queue.push(Event::new(Priority::High, 0, EventType::Maintenance, NodeId(2)), true);
    queue.push(Event::new(Priority::Critical, 0, EventType::NodeFailure, NodeId(3)), true);
    queue.push(Event::new(Priority::Medium, 0, EventType::OverloadWarning, NodeId(4)), true);

    let mut last = -1i32;
    while let Some(event) = queue.pop() {
        let value = event.priority as i32;
        assert!(value >= last, "priority sequence went backwards: {value} after {last}");
        last = value;
    }
}

/// Invariant 6: dedup-respecting push never leaves two events sharing (node_id, event_type).
#[test]
fn invariant_no_duplicate_node_event_type_pairs() {
    let mut queue = PriorityQueue::new(None);
    assert!(queue.push(Event::new(Priority::Low, 0, EventType::LoadChange, NodeId(1)), true));
    assert!(!queue.push(Event::new(Priority::High, 1, EventType::LoadChange, NodeId(1)), true));

    let all = queue.get_all_events();
    let matching = all.iter().filter(|e| e.node_id == NodeId(1) && e.event_type == EventType::LoadChange).count();
    assert_eq!(matching, 1);
}

/// Invariant 7: a failed node stays inactive across further ticks without reactivation.
#[test]
fn invariant_failure_is_stable_across_ticks() {
    let mut sim = small_hierarchy();
    sim.inject_failure(NodeId(10));
    for _ in 0..5 {
        sim.step();
        assert!(!sim.graph().get_node(NodeId(10)).unwrap().active);
    }
}

/// Invariant 8: normalize_node clears the overload condition and adjacent flows.
#[test]
fn invariant_normalize_clears_overload_and_flows() {
    let mut sim = no_noise_sim();
    sim.add_node(PowerNode::new(NodeId(1), NodeKind::Transformer, 100.0, 0.0, 0.0, 0.95, None));
    sim.add_node(PowerNode::new(NodeId(2), NodeKind::Consumer, 200.0, 0.0, 0.0, 0.97, Some(NodeId(1))));
    sim.add_edge(NodeId(1), NodeId(2), 1.0, 0.05, 0.95);
    sim.inject_manual_load(NodeId(2), 150.0);

    sim.normalize_node(NodeId(2));

    let c = sim.graph().get_node(NodeId(2)).unwrap();
    assert!(!c.is_overloaded());
    assert_eq!(sim.graph().get_edge(NodeId(1), NodeId(2)).unwrap().current_flow, 0.0);
    assert_eq!(sim.graph().get_edge(NodeId(2), NodeId(1)).unwrap().current_flow, 0.0);
}

/// Invariant 9: efficiency is always within [0, 1000].
#[test]
fn invariant_efficiency_within_bounds() {
    let mut sim = small_hierarchy();
    for _ in 0..10 {
        sim.step();
        let e = sim.get_metrics().global_efficiency;
        assert!((0.0..=1000.0).contains(&e), "efficiency {e} out of bounds");
    }
}
