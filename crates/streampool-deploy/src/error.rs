//! Deployment error taxonomy.
//!
//! Display strings double as the user-visible API messages, so they are
//! fixed text rather than interpolated detail. Provider errors pass
//! through with their own message.

use streampool_batch::ProviderError;
use thiserror::Error;

/// Validation message when signaling configuration is missing.
pub const MSG_SIGNALING_REQUIRED: &str = "Signaling is required";

/// Validation message when a pool would have zero dedicated nodes.
pub const MSG_DEDICATED_NODE_REQUIRED: &str = "Pools must have at least one dedicated node";

/// Validation message when a rendering node would have zero max users.
pub const MSG_MAX_USER_REQUIRED: &str = "Rendering nodes must have at least one max user";

/// Errors surfaced by the lifecycle orchestrator.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Eager configuration check failed; nothing was created.
    #[error("{0}")]
    InvalidConfiguration(&'static str),

    #[error("The rendering pool id already exists, use a different id.")]
    RenderingPoolExists,

    #[error("The job id already exists, use a different id.")]
    JobExists,

    /// The TURN pool never reached `Steady` within the wait timeout.
    #[error("Creating a TURN pool was not successful. Please check the batch client for errors.")]
    TurnPoolNotReady,

    /// No usable TURN node: none present, readiness wait failed, or the
    /// login endpoint could not be retrieved.
    #[error("The TURN server nodes are in an invalid state. Please check the batch client for errors.")]
    TurnNodeInvalid,

    /// The rendering pool never reached `Steady` within the wait timeout.
    #[error("Creating a rendering pool was not successful. Please check the batch client for errors.")]
    RenderingPoolNotReady,

    #[error("One or more tasks failed to reach the Completed state within the timeout period")]
    TasksTimedOut,

    #[error("The specified poolId does not exist in the batch client")]
    PoolIdNotFound,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl DeployError {
    /// Whether this is an infrastructure-readiness failure (mapped to a
    /// server error at the HTTP layer) rather than a request problem.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            DeployError::TurnNodeInvalid
                | DeployError::RenderingPoolNotReady
                | DeployError::TasksTimedOut
        )
    }
}
