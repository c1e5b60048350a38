//! Directed storage slot for an undirected physical power line. Every
//! unordered pair {u,v} is represented by two `PowerLine` records with
//! identical physical parameters, one per direction.

use crate::ids::NodeId;

#[derive(Debug, Clone)]
pub struct PowerLine {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub distance_km: f64,
    pub resistance_ohm: f64,
    pub efficiency: f64,
    /// kW this directed side is carrying. The transformer->consumer
    /// direction is authoritative for the redistributor; the balancer
    /// updates both directions for visual symmetry.
    pub current_flow: f64,
}

impl PowerLine {
    pub fn new(source_id: NodeId, target_id: NodeId, distance_km: f64, resistance_ohm: f64, efficiency: f64) -> Self {
        Self {
            source_id,
            target_id,
            distance_km,
            resistance_ohm,
            efficiency,
            current_flow: 0.0,
        }
    }

    /// Routing weight: distance * resistance / efficiency.
    pub fn weight(&self) -> f64 {
        if self.efficiency <= 0.0 {
            return f64::INFINITY;
        }
        (self.distance_km * self.resistance_ohm) / self.efficiency
    }

    /// Resistive loss at the given current in amperes, converted from watts to kW.
    pub fn loss_kw(&self, current_amperes: f64) -> f64 {
        if current_amperes <= 0.0 {
            return 0.0;
        }
        (current_amperes.powi(2) * self.resistance_ohm) / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_infinite_at_zero_efficiency() {
        let line = PowerLine::new(NodeId(1), NodeId(2), 10.0, 0.1, 0.0);
        assert!(line.weight().is_infinite());
    }

    #[test]
    fn test_loss_kw_nonnegative_current() {
        let line = PowerLine::new(NodeId(1), NodeId(2), 10.0, 0.5, 0.98);
        assert_eq!(line.loss_kw(-5.0), 0.0);
        assert!(line.loss_kw(100.0) > 0.0);
    }
}
