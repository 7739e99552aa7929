//! Fixed API result message strings.
//!
//! These are part of the wire contract: callers match on them, so they
//! never carry interpolated detail. Deployment failures reuse the
//! `DeployError` display strings.

pub const BODY_REQUIRED: &str = "A json body is required";
pub const POOL_ID_REQUIRED: &str = "poolId is required for delete";
pub const NO_AUTOSCALING: &str = "Auto scaling is not enabled";
