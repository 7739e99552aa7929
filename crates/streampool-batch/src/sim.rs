//! In-memory batch provider.
//!
//! Backs tests and the daemon's standalone mode. By default pools become
//! `Steady` with `Idle` nodes as soon as they are created and submitted
//! tasks complete immediately, so lifecycle pipelines run without real
//! provisioning. `InMemoryBatch::manual()` disables both so tests can
//! drive state transitions explicitly.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BatchProvider;
use crate::types::*;

#[derive(Default)]
struct Inner {
    pools: BTreeMap<PoolId, Pool>,
    nodes: BTreeMap<PoolId, Vec<ComputeNode>>,
    jobs: BTreeMap<JobId, Job>,
    tasks: BTreeMap<JobId, Vec<Task>>,
    /// Monotonic counter for synthesized node IPs.
    next_ip: u32,
}

/// An in-memory `BatchProvider`.
#[derive(Clone)]
pub struct InMemoryBatch {
    inner: Arc<Mutex<Inner>>,
    auto_ready: bool,
    auto_complete: bool,
}

impl InMemoryBatch {
    /// Provider where created pools are immediately ready and tasks
    /// complete successfully on submission.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            auto_ready: true,
            auto_complete: true,
        }
    }

    /// Provider where nothing transitions on its own; tests drive pool,
    /// node and task state through the mutation helpers.
    pub fn manual() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            auto_ready: false,
            auto_complete: false,
        }
    }

    /// Insert a pool and its nodes directly, bypassing `create_pool`.
    pub async fn seed_pool(&self, pool: Pool, nodes: Vec<ComputeNode>) {
        let mut inner = self.inner.lock().await;
        inner.nodes.insert(pool.id.clone(), nodes);
        inner.pools.insert(pool.id.clone(), pool);
    }

    /// Force a pool's allocation state.
    pub async fn set_allocation_state(&self, pool_id: &str, state: AllocationState) {
        let mut inner = self.inner.lock().await;
        if let Some(pool) = inner.pools.get_mut(pool_id) {
            pool.allocation_state = state;
        }
    }

    /// Force a node's state.
    pub async fn set_node_state(&self, pool_id: &str, node_id: &str, state: NodeState) {
        let mut inner = self.inner.lock().await;
        if let Some(nodes) = inner.nodes.get_mut(pool_id)
            && let Some(node) = nodes.iter_mut().find(|n| n.id == node_id)
        {
            node.state = state;
        }
    }

    /// Mark every task in a job `Completed` with the given result.
    pub async fn complete_tasks(&self, job_id: &str, result: TaskResult) {
        let mut inner = self.inner.lock().await;
        if let Some(tasks) = inner.tasks.get_mut(job_id) {
            for task in tasks.iter_mut() {
                task.state = TaskState::Completed;
                task.execution = Some(TaskExecution {
                    result,
                    exit_code: Some(if result == TaskResult::Success { 0 } else { 1 }),
                    message: None,
                });
            }
        }
    }

    /// Whether a job currently exists (rollback assertions in tests).
    pub async fn job_exists(&self, job_id: &str) -> bool {
        self.inner.lock().await.jobs.contains_key(job_id)
    }

    /// Number of tasks currently held by a job.
    pub async fn task_count(&self, job_id: &str) -> usize {
        self.inner
            .lock()
            .await
            .tasks
            .get(job_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn synth_node(inner: &mut Inner, pool_id: &str, index: u32, state: NodeState) -> ComputeNode {
        inner.next_ip += 1;
        let ip = format!("10.0.{}.{}", inner.next_ip / 250, inner.next_ip % 250);
        ComputeNode {
            id: format!("{pool_id}-node-{index}"),
            pool_id: pool_id.to_string(),
            state,
            login: Some(RemoteLogin { ip, port: 3389 }),
        }
    }
}

impl Default for InMemoryBatch {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchProvider for InMemoryBatch {
    async fn list_pools(&self) -> ProviderResult<Vec<Pool>> {
        Ok(self.inner.lock().await.pools.values().cloned().collect())
    }

    async fn get_pool(&self, pool_id: &str) -> ProviderResult<Pool> {
        self.inner
            .lock()
            .await
            .pools
            .get(pool_id)
            .cloned()
            .ok_or_else(|| ProviderError::PoolNotFound(pool_id.to_string()))
    }

    async fn create_pool(&self, spec: PoolSpec) -> ProviderResult<Pool> {
        let mut inner = self.inner.lock().await;
        if inner.pools.contains_key(&spec.id) {
            return Err(ProviderError::PoolExists(spec.id));
        }

        let (allocation_state, node_state) = if self.auto_ready {
            (AllocationState::Steady, NodeState::Idle)
        } else {
            (AllocationState::Resizing, NodeState::Creating)
        };

        let nodes: Vec<ComputeNode> = (0..spec.target_dedicated_nodes)
            .map(|i| Self::synth_node(&mut inner, &spec.id, i, node_state))
            .collect();

        let pool = Pool {
            id: spec.id.clone(),
            role: spec.role,
            target_dedicated_nodes: spec.target_dedicated_nodes,
            allocation_state,
            vm_image: spec.vm_image,
            job_id: None,
        };

        debug!(pool_id = %pool.id, role = ?pool.role, "pool created");
        inner.nodes.insert(spec.id.clone(), nodes);
        inner.pools.insert(spec.id, pool.clone());
        Ok(pool)
    }

    async fn delete_pool(&self, pool_id: &str) -> ProviderResult<()> {
        let mut inner = self.inner.lock().await;
        match inner.pools.get_mut(pool_id) {
            Some(pool) => {
                // Deletes are asynchronous: the pool lingers in `Deleting`.
                pool.allocation_state = AllocationState::Deleting;
                Ok(())
            }
            None => Err(ProviderError::PoolNotFound(pool_id.to_string())),
        }
    }

    async fn resize_pool(&self, pool_id: &str, target_dedicated_nodes: u32) -> ProviderResult<()> {
        let mut inner = self.inner.lock().await;
        let current = inner
            .nodes
            .get(pool_id)
            .map(Vec::len)
            .unwrap_or(0) as u32;
        let pool = inner
            .pools
            .get_mut(pool_id)
            .ok_or_else(|| ProviderError::PoolNotFound(pool_id.to_string()))?;
        pool.target_dedicated_nodes = target_dedicated_nodes;
        pool.allocation_state = if self.auto_ready {
            AllocationState::Steady
        } else {
            AllocationState::Resizing
        };
        let node_state = if self.auto_ready {
            NodeState::Idle
        } else {
            NodeState::Creating
        };
        if target_dedicated_nodes > current {
            let extra: Vec<ComputeNode> = (current..target_dedicated_nodes)
                .map(|i| Self::synth_node(&mut inner, pool_id, i, node_state))
                .collect();
            inner.nodes.entry(pool_id.to_string()).or_default().extend(extra);
        } else if let Some(nodes) = inner.nodes.get_mut(pool_id) {
            nodes.truncate(target_dedicated_nodes as usize);
        }
        Ok(())
    }

    async fn list_nodes(&self, pool_id: &str) -> ProviderResult<Vec<ComputeNode>> {
        let inner = self.inner.lock().await;
        if !inner.pools.contains_key(pool_id) {
            return Err(ProviderError::PoolNotFound(pool_id.to_string()));
        }
        Ok(inner.nodes.get(pool_id).cloned().unwrap_or_default())
    }

    async fn get_node(&self, pool_id: &str, node_id: &str) -> ProviderResult<ComputeNode> {
        self.inner
            .lock()
            .await
            .nodes
            .get(pool_id)
            .and_then(|nodes| nodes.iter().find(|n| n.id == node_id))
            .cloned()
            .ok_or_else(|| ProviderError::NodeNotFound(node_id.to_string()))
    }

    async fn remove_node(&self, pool_id: &str, node_id: &str) -> ProviderResult<()> {
        let mut inner = self.inner.lock().await;
        let nodes = inner
            .nodes
            .get_mut(pool_id)
            .ok_or_else(|| ProviderError::PoolNotFound(pool_id.to_string()))?;
        let before = nodes.len();
        nodes.retain(|n| n.id != node_id);
        if nodes.len() == before {
            return Err(ProviderError::NodeNotFound(node_id.to_string()));
        }
        Ok(())
    }

    async fn node_remote_login(&self, pool_id: &str, node_id: &str) -> ProviderResult<RemoteLogin> {
        let node = self.get_node(pool_id, node_id).await?;
        node.login
            .ok_or_else(|| ProviderError::Rejected(format!("node {node_id} not provisioned yet")))
    }

    async fn create_job(&self, job_id: &str, pool_id: &str) -> ProviderResult<Job> {
        let mut inner = self.inner.lock().await;
        if inner.jobs.contains_key(job_id) {
            return Err(ProviderError::JobExists(job_id.to_string()));
        }
        let job = Job {
            id: job_id.to_string(),
            pool_id: pool_id.to_string(),
        };
        if let Some(pool) = inner.pools.get_mut(pool_id) {
            pool.job_id = Some(job_id.to_string());
        }
        inner.jobs.insert(job_id.to_string(), job.clone());
        inner.tasks.insert(job_id.to_string(), Vec::new());
        debug!(%job_id, %pool_id, "job created");
        Ok(job)
    }

    async fn delete_job(&self, job_id: &str) -> ProviderResult<()> {
        let mut inner = self.inner.lock().await;
        match inner.jobs.remove(job_id) {
            Some(job) => {
                inner.tasks.remove(job_id);
                if let Some(pool) = inner.pools.get_mut(&job.pool_id) {
                    pool.job_id = None;
                }
                Ok(())
            }
            None => Err(ProviderError::JobNotFound(job_id.to_string())),
        }
    }

    async fn terminate_job(&self, job_id: &str, reason: &str) -> ProviderResult<()> {
        let inner = self.inner.lock().await;
        if !inner.jobs.contains_key(job_id) {
            return Err(ProviderError::JobNotFound(job_id.to_string()));
        }
        debug!(%job_id, %reason, "job terminated");
        Ok(())
    }

    async fn add_tasks(&self, job_id: &str, tasks: Vec<TaskSpec>) -> ProviderResult<()> {
        let mut inner = self.inner.lock().await;
        if !inner.jobs.contains_key(job_id) {
            return Err(ProviderError::JobNotFound(job_id.to_string()));
        }
        let (state, execution) = if self.auto_complete {
            (
                TaskState::Completed,
                Some(TaskExecution {
                    result: TaskResult::Success,
                    exit_code: Some(0),
                    message: None,
                }),
            )
        } else {
            (TaskState::Active, None)
        };
        let entry = inner.tasks.entry(job_id.to_string()).or_default();
        for spec in tasks {
            entry.push(Task {
                id: spec.id,
                job_id: job_id.to_string(),
                command: spec.command,
                state,
                execution: execution.clone(),
            });
        }
        Ok(())
    }

    async fn list_tasks(&self, job_id: &str) -> ProviderResult<Vec<Task>> {
        let inner = self.inner.lock().await;
        inner
            .tasks
            .get(job_id)
            .cloned()
            .ok_or_else(|| ProviderError::JobNotFound(job_id.to_string()))
    }
}
