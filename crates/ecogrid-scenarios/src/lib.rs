//! Named, fixed-topology scenario fixtures used by the test suite and by
//! the `ecogrid-cli run --scenario` command. Each fixture builds a fully
//! wired `GridSimulator` from scratch — no external file format, since
//! every scenario here is a small, exactly-specified hierarchy rather
//! than an arbitrary imported grid.

use anyhow::{anyhow, Result};
use ecogrid_core::{NodeId, NodeKind, PowerNode};
use ecogrid_sim::{GridSimulator, SimulatorConfig};

#[derive(Debug, Clone)]
pub struct ScenarioInfo {
    pub id: &'static str,
    pub description: &'static str,
}

const SCENARIOS: &[ScenarioInfo] = &[
    ScenarioInfo { id: "single-link-overflow", description: "One transformer overflows into a larger neighbor via the balancer cascade." },
    ScenarioInfo { id: "priority-correctness", description: "Three events of different priority pop in CRITICAL, MEDIUM, LOW order." },
    ScenarioInfo { id: "tiny-hierarchy-rollup", description: "A single substation/transformer/two-consumer hierarchy settles after one step." },
    ScenarioInfo { id: "redistribution-threshold", description: "A consumer's load shifts from an overloaded transformer to a cooler alternate." },
    ScenarioInfo { id: "failure-failover", description: "A transformer failure migrates its consumer to the remaining alternate." },
    ScenarioInfo { id: "reactivation-remap", description: "Reactivating the most efficient of three transformers reclaims the shared consumer." },
];

pub fn list_scenarios() -> &'static [ScenarioInfo] {
    SCENARIOS
}

/// Builds the named scenario's simulator, ready to `step()`. Returns an
/// error (not a panic) for unknown names, since this is reachable from
/// CLI-supplied input.
pub fn build_scenario(id: &str) -> Result<GridSimulator> {
    match id {
        "single-link-overflow" => Ok(single_link_overflow()),
        "priority-correctness" => Ok(priority_correctness()),
        "tiny-hierarchy-rollup" => Ok(tiny_hierarchy_rollup()),
        "redistribution-threshold" => Ok(redistribution_threshold()),
        "failure-failover" => Ok(failure_failover()),
        "reactivation-remap" => Ok(reactivation_remap()),
        other => Err(anyhow!("unknown scenario '{other}'; run `ecogrid-cli scenarios` to list available names")),
    }
}

fn no_noise_sim() -> GridSimulator {
    GridSimulator::new(SimulatorConfig { enable_noise: false, queue_max_size: None })
}

/// Scenario A: T_small (cap 100) and T_big (cap 1000), a single edge
/// between them. Loading T_small to 150 should cascade excess to T_big.
fn single_link_overflow() -> GridSimulator {
    let mut sim = no_noise_sim();
    sim.add_node(PowerNode::new(NodeId(1), NodeKind::Substation, 10000.0, 0.0, 0.0, 1.0, None));
    sim.add_node(PowerNode::new(NodeId(10), NodeKind::Transformer, 100.0, 0.0, 0.0, 0.98, Some(NodeId(1))));
    sim.add_node(PowerNode::new(NodeId(11), NodeKind::Transformer, 1000.0, 5.0, 0.0, 0.98, Some(NodeId(1))));
    sim.add_edge(NodeId(1), NodeId(10), 1.0, 0.05, 0.99);
    sim.add_edge(NodeId(1), NodeId(11), 1.0, 0.05, 0.99);
    sim.add_edge(NodeId(10), NodeId(11), 10.0, 0.1, 0.98);
    sim
}

/// Scenario B: three nodes to carry dedicated events; the queue itself is
/// driven directly by the test, this fixture only supplies node ids.
fn priority_correctness() -> GridSimulator {
    let mut sim = no_noise_sim();
    sim.add_node(PowerNode::new(NodeId(1), NodeKind::Consumer, 100.0, 0.0, 0.0, 0.97, None));
    sim.add_node(PowerNode::new(NodeId(2), NodeKind::Consumer, 100.0, 0.0, 0.0, 0.97, None));
    sim.add_node(PowerNode::new(NodeId(99), NodeKind::Transformer, 500.0, 0.0, 0.0, 0.95, None));
    sim
}

/// Scenario C: S -> T -> {C1, C2}, with C1=200kW and C2=300kW.
fn tiny_hierarchy_rollup() -> GridSimulator {
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

/// Scenario D: Ta (load 650) and Tb (load 400) both connected to a shared
/// consumer Cx (load 200, parented to Ta). Ta's 65% usage should push
/// some of Cx's load toward the cooler Tb.
fn redistribution_threshold() -> GridSimulator {
    let mut sim = no_noise_sim();
    sim.add_node(PowerNode::new(NodeId(1), NodeKind::Substation, 10000.0, 0.0, 0.0, 1.0, None));
    sim.add_node(PowerNode::new(NodeId(10), NodeKind::Transformer, 1000.0, 0.0, 0.0, 0.95, Some(NodeId(1))));
    sim.add_node(PowerNode::new(NodeId(11), NodeKind::Transformer, 1000.0, 10.0, 0.0, 0.95, Some(NodeId(1))));
    sim.add_node(PowerNode::new(NodeId(100), NodeKind::Consumer, 500.0, 5.0, 0.0, 0.97, Some(NodeId(10))));
    sim.add_edge(NodeId(1), NodeId(10), 1.0, 0.05, 0.99);
    sim.add_edge(NodeId(1), NodeId(11), 1.0, 0.05, 0.99);
    sim.add_edge(NodeId(10), NodeId(100), 0.5, 0.05, 0.96);
    sim.add_edge(NodeId(11), NodeId(100), 0.5, 0.05, 0.96);
    sim.inject_manual_load(NodeId(100), 200.0);
    sim
}

/// Scenario E: S with two transformer children T1, T2; consumer C
/// parented to T1 but also reachable via T2. Failing T1 should migrate C.
fn failure_failover() -> GridSimulator {
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
    sim
}

/// Scenario F: three transformers of efficiency 0.90, 0.95, 0.98, all
/// connected to a shared consumer initially parented to the 0.90 one.
fn reactivation_remap() -> GridSimulator {
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
    sim
}
