//! streampool-deploy — pool/job lifecycle orchestration.
//!
//! Drives the deployment pipeline: create a job, bring up the TURN relay
//! pool and the rendering pool, wait for infrastructure readiness, submit
//! one deploy task per ready node, monitor the tasks to completion, and
//! roll the job back on any failure. Pools already created are never
//! auto-deleted; cleanup of those is an explicit operator action.

pub mod error;
pub mod orchestrator;
pub mod waiter;

pub use error::DeployError;
pub use orchestrator::{DeploymentParams, Orchestrator};
pub use waiter::{await_node_state, await_pool_state, WaitSettings};
