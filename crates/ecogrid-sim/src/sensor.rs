//! Sensor fabric: per-tick generation of consumer load. Transformer and
//! substation readings are derived quantities and are the responsibility
//! of [`crate::rollup`]; the sensor fabric only originates the one
//! genuinely exogenous signal in the system — what a consumer is drawing
//! this tick.

use ecogrid_core::{Graph, NodeKind};
use rand::Rng;

const PEAK_HOUR_START: u64 = 6;
const PEAK_HOUR_END: u64 = 22;
const PEAK_LOAD_LOW_PCT: f64 = 0.4;
const PEAK_LOAD_HIGH_PCT: f64 = 0.8;
const OFFPEAK_LOAD_LOW_PCT: f64 = 0.1;
const OFFPEAK_LOAD_HIGH_PCT: f64 = 0.3;
const MODULATION_LOW: f64 = 0.8;
const MODULATION_HIGH: f64 = 1.2;

/// Drives every active, non-manually-pinned consumer's load for this tick
/// from a daily demand curve plus bounded noise. Consumers under
/// `manual_load` are left untouched.
pub fn run_sensor_fabric(graph: &mut Graph, tick: u64, enable_noise: bool) {
    let mut rng = rand::thread_rng();
    let hour = tick % 24;
    let is_peak = hour >= PEAK_HOUR_START && hour <= PEAK_HOUR_END;

    let consumer_ids: Vec<_> = graph
        .nodes()
        .filter(|n| n.active && n.kind == NodeKind::Consumer && !n.manual_load)
        .map(|n| n.id)
        .collect();

    for id in consumer_ids {
        let Some(node) = graph.get_node(id) else { continue };
        let (low_pct, high_pct) = if is_peak {
            (PEAK_LOAD_LOW_PCT, PEAK_LOAD_HIGH_PCT)
        } else {
            (OFFPEAK_LOAD_LOW_PCT, OFFPEAK_LOAD_HIGH_PCT)
        };
        let base = node.max_capacity * rng.gen_range(low_pct..=high_pct);
        let modulated = if enable_noise {
            base * rng.gen_range(MODULATION_LOW..=MODULATION_HIGH)
        } else {
            base
        };

        if let Some(node) = graph.get_node_mut(id) {
            node.set_load(modulated.min(node.max_capacity));
        }
    }
}
