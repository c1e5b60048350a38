//! Core data model for the EcoGrid+ distribution network: node/edge
//! types, the hierarchy graph, the logical indexes used to keep
//! balancing and redistribution fast, and the shared error type.

pub mod capacity_index;
pub mod circular_buffer;
pub mod edge;
pub mod error;
pub mod graph;
pub mod ids;
pub mod keyed_index;
pub mod node;
pub mod priority_queue;

pub use capacity_index::CapacityIndex;
pub use circular_buffer::CircularBuffer;
pub use edge::PowerLine;
pub use error::{EcoGridError, EcoGridResult};
pub use graph::Graph;
pub use ids::NodeId;
pub use keyed_index::KeyedIndex;
pub use node::{NodeKind, PowerNode};
pub use priority_queue::{Event, EventType, Priority, PriorityQueue, QueueStatistics};
