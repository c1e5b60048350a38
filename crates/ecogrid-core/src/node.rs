//! The three-level hierarchy: substations feed transformers, transformers
//! feed consumers.

use crate::circular_buffer::CircularBuffer;
use crate::ids::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Substation,
    Transformer,
    Consumer,
}

impl NodeKind {
    /// Hierarchy level used by `can_transfer_to` (substation=1 < transformer=2 < consumer=3).
    pub fn level(&self) -> u8 {
        match self {
            NodeKind::Substation => 1,
            NodeKind::Transformer => 2,
            NodeKind::Consumer => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PowerNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub max_capacity: f64,
    pub current_load: f64,
    pub active: bool,
    pub x: f64,
    pub y: f64,
    /// In (0, 1]; never mutated by runtime logic once the node is created.
    pub efficiency: f64,
    pub parent_id: Option<NodeId>,
    pub children_ids: Vec<NodeId>,
    pub nominal_voltage: f64,
    pub derived_current: f64,
    /// Set when an external agent pins a consumer's load; the sensor fabric
    /// then never overwrites `current_load`. Only meaningful for CONSUMER.
    pub manual_load: bool,
    pub last_reactivation_tick: Option<u64>,
    pub readings: CircularBuffer<f64>,
    internal_clock: u64,
}

impl PowerNode {
    pub fn new(
        id: NodeId,
        kind: NodeKind,
        max_capacity: f64,
        x: f64,
        y: f64,
        efficiency: f64,
        parent_id: Option<NodeId>,
    ) -> Self {
        Self {
            id,
            kind,
            max_capacity,
            current_load: 0.0,
            active: true,
            x,
            y,
            efficiency,
            parent_id,
            children_ids: Vec::new(),
            nominal_voltage: 220.0,
            derived_current: 0.0,
            manual_load: false,
            last_reactivation_tick: None,
            readings: CircularBuffer::new(24),
            internal_clock: 0,
        }
    }

    pub fn available_capacity(&self) -> f64 {
        (self.max_capacity - self.current_load).max(0.0)
    }

    pub fn load_percentage(&self) -> f64 {
        if self.max_capacity <= 0.0 {
            return 0.0;
        }
        self.current_load / self.max_capacity
    }

    pub fn is_overloaded(&self) -> bool {
        self.current_load > self.max_capacity
    }

    /// Sets `current_load`, records it in the reading history, recomputes
    /// `derived_current`, and advances the node's internal clock.
    pub fn set_load(&mut self, new_load: f64) {
        self.current_load = new_load.max(0.0);
        self.readings.push(self.current_load);
        self.derived_current = if self.nominal_voltage > 0.0 {
            self.current_load / self.nominal_voltage
        } else {
            0.0
        };
        self.internal_clock += 1;
    }

    pub fn tick_count(&self) -> u64 {
        self.internal_clock
    }

    /// Deactivates the node and zeroes its load without recording history
    /// (failures are not "readings").
    pub fn deactivate(&mut self) {
        self.active = false;
        self.current_load = 0.0;
        self.derived_current = 0.0;
    }
}
