//! Simulation engine: sensor fabric, infrastructure roll-up, overload
//! detection, and the `GridSimulator` orchestrator that ties the whole
//! per-tick pipeline together.

pub mod orchestrator;
pub mod overload;
pub mod rollup;
pub mod sensor;

pub use orchestrator::{GridSimulator, SimulatorConfig, SimulatorMetrics};
pub use rollup::roll_up;
pub use sensor::run_sensor_fabric;
