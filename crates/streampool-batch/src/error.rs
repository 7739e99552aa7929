//! Error types for the batch-compute capability layer.

use thiserror::Error;

use crate::types::{JobId, NodeId, PoolId};

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors reported by a batch-compute provider.
///
/// `PoolExists` and `JobExists` are structured variants rather than opaque
/// request rejections because the orchestrator treats them specially:
/// pool creation is idempotent and swallows `PoolExists`, while `JobExists`
/// fails a deployment fast before anything needs rolling back.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("pool {0} already exists")]
    PoolExists(PoolId),

    #[error("job {0} already exists")]
    JobExists(JobId),

    #[error("pool {0} not found")]
    PoolNotFound(PoolId),

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("node {0} not found")]
    NodeNotFound(NodeId),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}
