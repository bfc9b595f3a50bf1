//! Access to the code-structure graph.
//!
//! The graph holds a Component → File → Class → Method containment hierarchy
//! joined by `CONTAINS` relationships. Everything here is read-only.

/// Store and session traits plus the fixed query catalog.
pub mod store;

/// Neo4j-backed store.
pub mod neo4j;

/// In-process store with the same query semantics.
pub mod memory;

pub use memory::{Label, MemoryGraph, NodeId};
pub use neo4j::Neo4jStore;
pub use store::{GraphQuery, GraphSession, GraphStore};
