//! End-to-end scenario tests mirroring the six concrete scenarios: each
//! builds the exact fixture topology and asserts the expected outcome
//! after the described commands/ticks.

use ecogrid_balancer::{Balancer, EMERGENCY_CAP_PCT};
use ecogrid_core::{Event, EventType, NodeId, NodeKind, Priority, PowerNode, PriorityQueue};
use ecogrid_sim::{GridSimulator, SimulatorConfig};

fn no_noise_sim() -> GridSimulator {
    GridSimulator::new(SimulatorConfig { enable_noise: false, queue_max_size: None })
}

/// Scenario A — single-link overflow.
#[test]
fn scenario_a_single_link_overflow() {
    let mut graph = ecogrid_core::Graph::new();
    graph.add_node(PowerNode::new(NodeId(1), NodeKind::Transformer, 100.0, 0.0, 0.0, 0.95, None));
    graph.add_node(PowerNode::new(NodeId(2), NodeKind::Transformer, 1000.0, 0.0, 0.0, 0.95, None));
    graph.add_edge(NodeId(1), NodeId(2), 10.0, 0.1, 0.98).unwrap();

    let mut balancer = Balancer::new();
    balancer.sync_all(&graph);
    balancer.update_node_load(&mut graph, NodeId(1), 150.0);

    let t_small = graph.get_node(NodeId(1)).unwrap();
    let t_big = graph.get_node(NodeId(2)).unwrap();
    assert!(t_small.current_load <= 100.0 * EMERGENCY_CAP_PCT + 0.5);
    assert!(t_big.current_load >= 49.0);

    let fwd = graph.get_edge(NodeId(1), NodeId(2)).unwrap().current_flow;
    let rev = graph.get_edge(NodeId(2), NodeId(1)).unwrap().current_flow;
    assert!(fwd > 0.0 || rev > 0.0, "expected current_flow on at least one direction of the cascaded edge");
}

/// Scenario B — priority correctness.
#[test]
fn scenario_b_priority_correctness() {
    let mut queue = PriorityQueue::new(None);
    queue.push(Event::new(Priority::Low, 0, EventType::LoadChange, NodeId(1)), true);
    queue.push(Event::new(Priority::Critical, 0, EventType::NodeFailure, NodeId(99)), true);
    queue.push(Event::new(Priority::Medium, 0, EventType::Maintenance, NodeId(2)), true);

    let first = queue.pop().unwrap();
    let second = queue.pop().unwrap();
    let third = queue.pop().unwrap();
    assert_eq!(first.priority as i32, Priority::Critical as i32);
    assert_eq!(second.priority as i32, Priority::Medium as i32);
    assert_eq!(third.priority as i32, Priority::Low as i32);
}

/// Scenario C — tiny hierarchy roll-up.
#[test]
fn scenario_c_tiny_hierarchy_rollup() {
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

    sim.step();

    let t = sim.graph().get_node(NodeId(10)).unwrap();
    let s = sim.graph().get_node(NodeId(1)).unwrap();
    assert!(t.current_load >= 1.05 * 500.0 - 1.0, "transformer load {} below served portion floor", t.current_load);
    assert!((s.current_load - t.current_load).abs() <= 0.05 * t.current_load + 1.0);
}

/// Scenario D — redistribution triggers only above threshold.
#[test]
fn scenario_d_redistribution_above_threshold() {
    let mut sim = no_noise_sim();
    sim.add_node(PowerNode::new(NodeId(1), NodeKind::Substation, 10000.0, 0.0, 0.0, 1.0, None));
    sim.add_node(PowerNode::new(NodeId(10), NodeKind::Transformer, 1000.0, 0.0, 0.0, 0.95, Some(NodeId(1))));
    sim.add_node(PowerNode::new(NodeId(11), NodeKind::Transformer, 1000.0, 0.0, 0.0, 0.95, Some(NodeId(1))));
    sim.add_node(PowerNode::new(NodeId(100), NodeKind::Consumer, 500.0, 5.0, 0.0, 0.97, Some(NodeId(10))));
    sim.add_edge(NodeId(1), NodeId(10), 1.0, 0.05, 0.99);
    sim.add_edge(NodeId(1), NodeId(11), 1.0, 0.05, 0.99);
    sim.add_edge(NodeId(10), NodeId(100), 0.5, 0.05, 0.96);
    sim.add_edge(NodeId(11), NodeId(100), 0.5, 0.05, 0.96);
    sim.inject_manual_load(NodeId(100), 200.0);

    // The original scenario pins Ta/Tb's starting loads directly; the only
    // public way to reach those levels here is through consumer load, so a
    // second consumer on each transformer supplies the rest of Ta's 650 and
    // all of Tb's 400.
    sim.add_node(PowerNode::new(NodeId(101), NodeKind::Consumer, 1000.0, 6.0, 0.0, 0.97, Some(NodeId(10))));
    sim.add_edge(NodeId(10), NodeId(101), 0.5, 0.05, 0.96);
    sim.inject_manual_load(NodeId(101), 430.0);
    sim.add_node(PowerNode::new(NodeId(102), NodeKind::Consumer, 1000.0, 7.0, 0.0, 0.97, Some(NodeId(11))));
    sim.add_edge(NodeId(11), NodeId(102), 0.5, 0.05, 0.96);
    sim.inject_manual_load(NodeId(102), 400.0);

    let ta_pct_before = sim.graph().get_node(NodeId(10)).unwrap().load_percentage();
    assert!(ta_pct_before > 0.60, "fixture should start Ta above THRESHOLD, got {ta_pct_before}");

    for _ in 0..3 {
        sim.step();
    }

    let flow_a = sim.graph().get_edge(NodeId(10), NodeId(100)).map(|e| e.current_flow).unwrap_or(0.0);
    let flow_b = sim.graph().get_edge(NodeId(11), NodeId(100)).map(|e| e.current_flow).unwrap_or(0.0);
    let cx_load = sim.graph().get_node(NodeId(100)).unwrap().current_load;
    assert!((flow_a + flow_b - cx_load).abs() <= 0.01 * cx_load + 1.0, "split flows {flow_a}+{flow_b} should track Cx's load {cx_load}");

    let ta_pct_after = sim.graph().get_node(NodeId(10)).unwrap().load_percentage();
    assert!(ta_pct_after < ta_pct_before, "Ta's load_pct should drop toward TARGET after redistribution: before={ta_pct_before} after={ta_pct_after}");

    assert!(flow_b > 0.0, "expected Tb to pick up a meaningful inbound flow from Cx, got {flow_b}");
}

/// Scenario E — failure-driven failover.
#[test]
fn scenario_e_failure_failover() {
    let mut sim = no_noise_sim();
    sim.add_node(PowerNode::new(NodeId(1), NodeKind::Substation, 10000.0, 0.0, 0.0, 1.0, None));
    sim.add_node(PowerNode::new(NodeId(10), NodeKind::Transformer, 1000.0, 0.0, 0.0, 0.95, Some(NodeId(1))));
    sim.add_node(PowerNode::new(NodeId(11), NodeKind::Transformer, 1000.0, 10.0, 0.0, 0.95, Some(NodeId(1))));
    sim.add_node(PowerNode::new(NodeId(100), NodeKind::Consumer, 500.0, 5.0, 0.0, 0.97, Some(NodeId(10))));
    sim.add_edge(NodeId(1), NodeId(10), 1.0, 0.05, 0.99);
    sim.add_edge(NodeId(1), NodeId(11), 1.0, 0.05, 0.99);
    sim.add_edge(NodeId(10), NodeId(100), 0.5, 0.05, 0.96);
    sim.add_edge(NodeId(11), NodeId(100), 0.5, 0.05, 0.96);
    sim.inject_manual_load(NodeId(100), 150.0);

    sim.inject_failure(NodeId(10));

    let t1 = sim.graph().get_node(NodeId(10)).unwrap();
    assert!(!t1.active);
    assert_eq!(t1.current_load, 0.0);

    let c = sim.graph().get_node(NodeId(100)).unwrap();
    assert_eq!(c.parent_id, Some(NodeId(11)));
    assert!(c.active);

    assert_eq!(sim.graph().get_edge(NodeId(10), NodeId(100)).unwrap().current_flow, 0.0);
    let flow_to_t2 = sim.graph().get_edge(NodeId(11), NodeId(100)).unwrap().current_flow;
    assert!((flow_to_t2 - c.current_load).abs() < 0.5);
}

/// Scenario F — reactivation remaps consumers optimally.
#[test]
fn scenario_f_reactivation_remaps_optimally() {
    let mut sim = no_noise_sim();
    sim.add_node(PowerNode::new(NodeId(1), NodeKind::Substation, 10000.0, 0.0, 0.0, 1.0, None));
    sim.add_node(PowerNode::new(NodeId(10), NodeKind::Transformer, 1000.0, 0.0, 0.0, 0.90, Some(NodeId(1))));
    sim.add_node(PowerNode::new(NodeId(11), NodeKind::Transformer, 1000.0, 10.0, 0.0, 0.95, Some(NodeId(1))));
    sim.add_node(PowerNode::new(NodeId(12), NodeKind::Transformer, 1000.0, 20.0, 0.0, 0.98, Some(NodeId(1))));
    sim.add_node(PowerNode::new(NodeId(100), NodeKind::Consumer, 500.0, 5.0, 0.0, 0.97, Some(NodeId(10))));
    sim.add_edge(NodeId(1), NodeId(10), 1.0, 0.05, 0.99);
    sim.add_edge(NodeId(1), NodeId(11), 1.0, 0.05, 0.99);
    sim.add_edge(NodeId(1), NodeId(12), 1.0, 0.05, 0.99);
    sim.add_edge(NodeId(10), NodeId(100), 0.5, 0.05, 0.96);
    sim.add_edge(NodeId(11), NodeId(100), 0.5, 0.05, 0.96);
    sim.add_edge(NodeId(12), NodeId(100), 0.5, 0.05, 0.96);
    sim.inject_failure(NodeId(11));
    sim.inject_failure(NodeId(12));
    sim.inject_manual_load(NodeId(100), 150.0);

    sim.reactivate_node(NodeId(12));

    let c = sim.graph().get_node(NodeId(100)).unwrap();
    assert_eq!(c.parent_id, Some(NodeId(12)));

    let flow_10 = sim.graph().get_edge(NodeId(10), NodeId(100)).map(|e| e.current_flow).unwrap_or(0.0);
    let flow_11 = sim.graph().get_edge(NodeId(11), NodeId(100)).map(|e| e.current_flow).unwrap_or(0.0);
    assert_eq!(flow_10, 0.0);
    assert_eq!(flow_11, 0.0);
}
