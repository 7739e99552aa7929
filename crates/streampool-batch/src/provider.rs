//! The batch-compute provider trait.
//!
//! Every operation is a thin pass-through to the managed service. The
//! core holds a `dyn BatchProvider` and never caches authoritative state
//! across calls — each decision re-reads current inventory.

use async_trait::async_trait;

use crate::error::ProviderResult;
use crate::types::{ComputeNode, Job, Pool, PoolSpec, RemoteLogin, Task, TaskSpec};

/// Capability interface over the managed batch-compute service.
#[async_trait]
pub trait BatchProvider: Send + Sync {
    /// List all pools known to the provider.
    async fn list_pools(&self) -> ProviderResult<Vec<Pool>>;

    /// Fetch one pool's current state.
    async fn get_pool(&self, pool_id: &str) -> ProviderResult<Pool>;

    /// Create a pool. Fails with `ProviderError::PoolExists` when the id
    /// is already taken.
    async fn create_pool(&self, spec: PoolSpec) -> ProviderResult<Pool>;

    /// Start deleting a pool. The provider transitions the pool to
    /// `Deleting`; callers do not wait for the delete to finish.
    async fn delete_pool(&self, pool_id: &str) -> ProviderResult<()>;

    /// Resize a pool to a new dedicated node count.
    async fn resize_pool(&self, pool_id: &str, target_dedicated_nodes: u32) -> ProviderResult<()>;

    /// List the compute nodes currently in a pool.
    async fn list_nodes(&self, pool_id: &str) -> ProviderResult<Vec<ComputeNode>>;

    /// Refresh one node's current state.
    async fn get_node(&self, pool_id: &str, node_id: &str) -> ProviderResult<ComputeNode>;

    /// Remove a node from its pool. Known to be noisy: some providers
    /// report failure even when the removal succeeded.
    async fn remove_node(&self, pool_id: &str, node_id: &str) -> ProviderResult<()>;

    /// Fetch the remote-login endpoint for a provisioned node.
    async fn node_remote_login(&self, pool_id: &str, node_id: &str) -> ProviderResult<RemoteLogin>;

    /// Create a job bound to a pool. Fails with `ProviderError::JobExists`
    /// when the id is already taken.
    async fn create_job(&self, job_id: &str, pool_id: &str) -> ProviderResult<Job>;

    /// Delete a job and all of its tasks.
    async fn delete_job(&self, job_id: &str) -> ProviderResult<()>;

    /// Terminate a job, recording a human-readable reason.
    async fn terminate_job(&self, job_id: &str, reason: &str) -> ProviderResult<()>;

    /// Submit a batch of tasks to a job.
    async fn add_tasks(&self, job_id: &str, tasks: Vec<TaskSpec>) -> ProviderResult<()>;

    /// List the tasks of a job with their completion state.
    async fn list_tasks(&self, job_id: &str) -> ProviderResult<Vec<Task>>;
}
