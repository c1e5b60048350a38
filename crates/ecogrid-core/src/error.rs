//! Unified error type for the EcoGrid+ engine.
//!
//! Per the simulation's propagation policy, algorithms inside a tick never
//! return `Result`: overload, missing-neighbor, and capacity conditions are
//! recovered locally and surfaced as bounded log lines. `EcoGridError` exists
//! for the boundary operations that *can* fail meaningfully to a caller:
//! topology construction (`add_node`/`add_edge`) and persistence.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EcoGridError {
    /// An id referenced by a command or algorithm has no entry in the graph.
    #[error("unknown node: {0}")]
    UnknownNode(u64),

    /// An edge was looked up between two ids that have no connecting line.
    #[error("unknown edge: {0} <-> {1}")]
    UnknownEdge(u64, u64),

    /// A hierarchy relationship (parent/child, level ordering) was violated.
    #[error("invalid hierarchy: {0}")]
    InvalidHierarchy(String),

    /// I/O failure during snapshot save/load.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// (De)serialization failure during snapshot save/load.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Catch-all for conditions that don't fit the above.
    #[error("{0}")]
    Other(String),
}

pub type EcoGridResult<T> = Result<T, EcoGridError>;

impl From<String> for EcoGridError {
    fn from(s: String) -> Self {
        EcoGridError::Other(s)
    }
}

impl From<&str> for EcoGridError {
    fn from(s: &str) -> Self {
        EcoGridError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EcoGridError::UnknownNode(42);
        assert!(err.to_string().contains("unknown node"));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> EcoGridResult<()> {
            Err(EcoGridError::InvalidHierarchy("bad parent".into()))
        }
        fn outer() -> EcoGridResult<()> {
            inner()?;
            Ok(())
        }
        assert!(outer().is_err());
    }
}
