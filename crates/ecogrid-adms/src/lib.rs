//! Advanced distribution management: the consumer-redistribution
//! algorithm, the failure/reactivation state machine, and the global
//! efficiency metric they both consult.

pub mod efficiency;
pub mod failure;
pub mod redistributor;

pub use efficiency::calculate_global_efficiency;
pub use failure::{inject_failure, inject_manual_load, normalize_node, reactivate_node};
pub use redistributor::Redistributor;
