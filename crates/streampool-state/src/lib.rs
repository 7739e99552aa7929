//! streampool-state — persistent record of pool assignments.
//!
//! The orchestrator writes one record per successfully deployed rendering
//! pool (which TURN endpoint its nodes relay through, which job provisioned
//! it). The store is write-only from the core's perspective; operators
//! consult it when tracing a VM back to its pool. Backed by redb with
//! JSON-serialized values, supporting on-disk and in-memory backends.

mod error;
mod store;

pub use error::{StateError, StateResult};
pub use store::{AssignmentStore, PoolAssignment};
