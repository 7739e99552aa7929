//! Lifecycle orchestrator for TURN-relay and rendering pools.
//!
//! `create_deployment` runs a strictly sequential pipeline:
//!
//! ```text
//! ValidateConfig -> CheckRenderingPoolAbsent -> CreateJob -> EnsureTurnPool
//!   -> AwaitTurnPoolSteady -> AwaitTopTurnNodeIdle -> CreateRenderingPool
//!   -> AwaitRenderingPoolSteady -> AwaitAllRenderingNodesIdle
//!   -> SubmitTasksPerReadyNode -> MonitorTasksUntilCompleteOrTimeout
//!   -> DeleteJob -> Done
//! ```
//!
//! Any stage failure after `CreateJob` deletes the job (best effort)
//! before the error is returned. Pools are never rolled back.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use streampool_batch::{
    BatchProvider, ComputeNode, NodeState, PoolSpec, ProviderError, RemoteLogin, TaskResult,
    TaskSpec, TaskState,
};
use streampool_state::{AssignmentStore, PoolAssignment};

use crate::error::{
    DeployError, MSG_DEDICATED_NODE_REQUIRED, MSG_MAX_USER_REQUIRED, MSG_SIGNALING_REQUIRED,
};
use crate::waiter::{await_node_state, await_pool_state, WaitSettings};

/// Job terminate reason when all tasks completed.
const MSG_ALL_TASKS_COMPLETED: &str = "All tasks reached state Completed";

/// Job terminate reason on monitor timeout.
const MSG_TASKS_TIMED_OUT: &str =
    "One or more tasks failed to reach the Completed state within the timeout period";

/// UDP port the TURN relay listens on.
const TURN_PORT: u16 = 3478;

/// Relay credentials baked into the deploy script invocation.
const TURN_USERNAME: &str = "username";
const TURN_PASSWORD: &str = "password";

/// Heartbeat interval (milliseconds) handed to each rendering server.
const HEARTBEAT_INTERVAL_MS: u32 = 5000;

/// Everything one deployment needs.
#[derive(Debug, Clone)]
pub struct DeploymentParams {
    pub turn_pool_id: String,
    pub rendering_pool_id: String,
    pub rendering_job_id: String,
    pub signaling_server: String,
    pub signaling_server_port: u16,
    pub vnet: Option<String>,
    pub dedicated_turn_nodes: u32,
    pub dedicated_rendering_nodes: u32,
    pub max_users_per_rendering_node: u32,
}

/// Sequences pool/job creation, readiness waiting, task submission and
/// rollback across the TURN-relay pool and the rendering pool.
pub struct Orchestrator {
    provider: Arc<dyn BatchProvider>,
    assignments: Option<AssignmentStore>,
    wait: WaitSettings,
    /// How long task monitoring waits for all tasks to complete.
    task_timeout: Duration,
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn BatchProvider>) -> Self {
        Self {
            provider,
            assignments: None,
            wait: WaitSettings::default(),
            task_timeout: Duration::from_secs(30 * 60),
        }
    }

    /// Record successful deployments in an assignment store.
    pub fn with_assignments(mut self, store: AssignmentStore) -> Self {
        self.assignments = Some(store);
        self
    }

    /// Override the readiness-wait settings (tests use millisecond polls).
    pub fn with_wait_settings(mut self, wait: WaitSettings) -> Self {
        self.wait = wait;
        self
    }

    /// Override the task-monitor timeout.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Run the full deployment pipeline.
    pub async fn create_deployment(&self, params: &DeploymentParams) -> Result<(), DeployError> {
        validate(params)?;

        // Fail fast before creating anything if the rendering pool id is taken.
        let pools = self.provider.list_pools().await?;
        if pools.iter().any(|p| p.id == params.rendering_pool_id) {
            return Err(DeployError::RenderingPoolExists);
        }

        match self
            .provider
            .create_job(&params.rendering_job_id, &params.rendering_pool_id)
            .await
        {
            Ok(_) => {}
            Err(ProviderError::JobExists(_)) => return Err(DeployError::JobExists),
            Err(e) => return Err(e.into()),
        }

        info!(
            rendering_pool = %params.rendering_pool_id,
            turn_pool = %params.turn_pool_id,
            job = %params.rendering_job_id,
            "deployment started"
        );

        // From here on every failure rolls the job back.
        let result = self.run_stages(params).await;

        if let Err(e) = self.provider.delete_job(&params.rendering_job_id).await {
            warn!(job = %params.rendering_job_id, error = %e, "job cleanup failed");
        }

        if result.is_ok() {
            info!(rendering_pool = %params.rendering_pool_id, "deployment complete");
        }
        result
    }

    async fn run_stages(&self, params: &DeploymentParams) -> Result<(), DeployError> {
        let turn_login = self.ensure_turn_relay(params).await?;
        let ready_nodes = self.ensure_rendering_pool(params).await?;

        let turn_endpoint = format!("turn:{}:{}", turn_login.ip, TURN_PORT);
        self.submit_tasks(params, &turn_endpoint, &ready_nodes)
            .await?;
        self.monitor_tasks(&params.rendering_job_id).await?;

        // Write-only operator record; never fatal.
        if let Some(store) = &self.assignments {
            let assignment = PoolAssignment::new(
                &params.rendering_pool_id,
                &turn_endpoint,
                &params.rendering_job_id,
                &params.signaling_server,
            );
            if let Err(e) = store.record(&assignment) {
                warn!(pool = %params.rendering_pool_id, error = %e, "failed to record assignment");
            }
        }

        Ok(())
    }

    /// Bring up the TURN pool if needed and return the top node's login.
    async fn ensure_turn_relay(
        &self,
        params: &DeploymentParams,
    ) -> Result<RemoteLogin, DeployError> {
        let pools = self.provider.list_pools().await?;
        if !pools.iter().any(|p| p.id == params.turn_pool_id) {
            let spec = PoolSpec::turn_relay(
                &params.turn_pool_id,
                params.dedicated_turn_nodes,
                params.vnet.clone(),
            );
            match self.provider.create_pool(spec).await {
                Ok(_) => {}
                // A concurrent creator won the race; treat as created.
                Err(ProviderError::PoolExists(id)) => {
                    info!(pool = %id, "TURN pool already existed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !await_pool_state(
            self.provider.as_ref(),
            &params.turn_pool_id,
            streampool_batch::AllocationState::Steady,
            &self.wait,
        )
        .await
        {
            return Err(DeployError::TurnPoolNotReady);
        }

        let turn_nodes = self.provider.list_nodes(&params.turn_pool_id).await?;
        let top = turn_nodes.first().ok_or(DeployError::TurnNodeInvalid)?;

        if !await_node_state(
            self.provider.as_ref(),
            &params.turn_pool_id,
            &top.id,
            NodeState::Idle,
            &self.wait,
        )
        .await
        {
            return Err(DeployError::TurnNodeInvalid);
        }

        match self
            .provider
            .node_remote_login(&params.turn_pool_id, &top.id)
            .await
        {
            Ok(login) => Ok(login),
            Err(e) => {
                warn!(pool = %params.turn_pool_id, node = %top.id, error = %e, "remote login retrieval failed");
                Err(DeployError::TurnNodeInvalid)
            }
        }
    }

    /// Create the rendering pool, wait for readiness, and return the nodes
    /// that actually reached `Idle`.
    async fn ensure_rendering_pool(
        &self,
        params: &DeploymentParams,
    ) -> Result<Vec<ComputeNode>, DeployError> {
        let spec = PoolSpec::rendering(
            &params.rendering_pool_id,
            params.dedicated_rendering_nodes,
            params.vnet.clone(),
        );
        match self.provider.create_pool(spec).await {
            Ok(_) => {}
            // Known gap: the id was checked as absent earlier, so hitting
            // PoolExists here means a concurrent request created it. We
            // accept the existing pool even though it may have been created
            // with a different configuration.
            Err(ProviderError::PoolExists(id)) => {
                warn!(pool = %id, "rendering pool already existed; reusing it");
            }
            Err(e) => return Err(e.into()),
        }

        if !await_pool_state(
            self.provider.as_ref(),
            &params.rendering_pool_id,
            streampool_batch::AllocationState::Steady,
            &self.wait,
        )
        .await
        {
            return Err(DeployError::RenderingPoolNotReady);
        }

        let nodes = self.provider.list_nodes(&params.rendering_pool_id).await?;
        let mut ready = Vec::with_capacity(nodes.len());

        for node in nodes {
            if await_node_state(
                self.provider.as_ref(),
                &params.rendering_pool_id,
                &node.id,
                NodeState::Idle,
                &self.wait,
            )
            .await
            {
                ready.push(node);
            } else {
                // The provider sometimes reports removal failure even when
                // it succeeded; either way the node is excluded from the
                // ready count.
                if let Err(e) = self
                    .provider
                    .remove_node(&params.rendering_pool_id, &node.id)
                    .await
                {
                    warn!(
                        pool = %params.rendering_pool_id,
                        node = %node.id,
                        error = %e,
                        "node removal reported failure"
                    );
                }
            }
        }

        info!(
            pool = %params.rendering_pool_id,
            ready = ready.len(),
            "rendering nodes ready"
        );
        Ok(ready)
    }

    /// Submit one deploy task per ready rendering node.
    async fn submit_tasks(
        &self,
        params: &DeploymentParams,
        turn_endpoint: &str,
        ready_nodes: &[ComputeNode],
    ) -> Result<(), DeployError> {
        let tasks: Vec<TaskSpec> = ready_nodes
            .iter()
            .map(|node| TaskSpec {
                id: format!("start-rendering-{}", node.id),
                command: deploy_command(params, turn_endpoint),
            })
            .collect();

        info!(
            job = %params.rendering_job_id,
            count = tasks.len(),
            "submitting rendering tasks"
        );
        self.provider
            .add_tasks(&params.rendering_job_id, tasks)
            .await?;
        Ok(())
    }

    /// Poll until every task in the job reaches `Completed` or the task
    /// timeout elapses. A task-level `Failure` result is logged but does
    /// not fail the deployment; only the timeout does.
    async fn monitor_tasks(&self, job_id: &str) -> Result<(), DeployError> {
        let deadline = Instant::now() + self.task_timeout;
        loop {
            let tasks = self.provider.list_tasks(job_id).await?;
            if tasks.iter().all(|t| t.state == TaskState::Completed) {
                self.provider
                    .terminate_job(job_id, MSG_ALL_TASKS_COMPLETED)
                    .await?;
                for task in &tasks {
                    if let Some(exec) = &task.execution
                        && exec.result == TaskResult::Failure
                    {
                        warn!(
                            %job_id,
                            task = %task.id,
                            exit_code = ?exec.exit_code,
                            "task completed with a failure result"
                        );
                    }
                }
                return Ok(());
            }

            if Instant::now() >= deadline {
                if let Err(e) = self.provider.terminate_job(job_id, MSG_TASKS_TIMED_OUT).await {
                    warn!(%job_id, error = %e, "failed to terminate timed-out job");
                }
                return Err(DeployError::TasksTimedOut);
            }
            tokio::time::sleep(self.wait.poll_interval).await;
        }
    }

    /// Delete a pool by id. The provider delete is asynchronous; this
    /// returns as soon as the delete is accepted.
    pub async fn delete_pool(&self, pool_id: &str) -> Result<(), DeployError> {
        let pools = self.provider.list_pools().await?;
        if !pools.iter().any(|p| p.id == pool_id) {
            return Err(DeployError::PoolIdNotFound);
        }
        self.provider.delete_pool(pool_id).await?;
        info!(%pool_id, "pool delete requested");
        Ok(())
    }

    /// Resize the TURN pool. Returns `false` without touching the provider
    /// when the pool is missing or already at the requested size.
    pub async fn resize_turn_pool(
        &self,
        pool_id: &str,
        dedicated_nodes: u32,
    ) -> Result<bool, DeployError> {
        let pool = match self.provider.get_pool(pool_id).await {
            Ok(pool) => pool,
            Err(ProviderError::PoolNotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if pool.target_dedicated_nodes == dedicated_nodes {
            return Ok(false);
        }
        self.provider.resize_pool(pool_id, dedicated_nodes).await?;
        Ok(true)
    }

    /// Terminate a job with a reason (used by the bus worker).
    pub async fn terminate_job(&self, job_id: &str, reason: &str) -> Result<(), DeployError> {
        self.provider.terminate_job(job_id, reason).await?;
        Ok(())
    }
}

/// Eager configuration validation; runs before any provider call.
fn validate(params: &DeploymentParams) -> Result<(), DeployError> {
    if params.signaling_server.is_empty() {
        return Err(DeployError::InvalidConfiguration(MSG_SIGNALING_REQUIRED));
    }
    if params.dedicated_rendering_nodes < 1 || params.dedicated_turn_nodes < 1 {
        return Err(DeployError::InvalidConfiguration(
            MSG_DEDICATED_NODE_REQUIRED,
        ));
    }
    if params.max_users_per_rendering_node < 1 {
        return Err(DeployError::InvalidConfiguration(MSG_MAX_USER_REQUIRED));
    }
    Ok(())
}

/// Deploy-script invocation run on each rendering node. Encodes the TURN
/// endpoint, credentials, signaling endpoint, heartbeat interval and
/// per-node capacity as script arguments; the script content itself is
/// owned by the VM image.
fn deploy_command(params: &DeploymentParams, turn_endpoint: &str) -> String {
    format!(
        "powershell -ExecutionPolicy Unrestricted -File server_deploy.ps1 {} {} {} {} {} {} {}",
        turn_endpoint,
        TURN_USERNAME,
        TURN_PASSWORD,
        params.signaling_server,
        params.signaling_server_port,
        HEARTBEAT_INTERVAL_MS,
        params.max_users_per_rendering_node,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use streampool_batch::{AllocationState, InMemoryBatch, Pool, PoolRole, VmImage};

    fn fast_wait() -> WaitSettings {
        WaitSettings {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(200),
        }
    }

    fn params() -> DeploymentParams {
        DeploymentParams {
            turn_pool_id: "turn-pool".to_string(),
            rendering_pool_id: "render-pool".to_string(),
            rendering_job_id: "render-job".to_string(),
            signaling_server: "wss://signal.example".to_string(),
            signaling_server_port: 443,
            vnet: None,
            dedicated_turn_nodes: 1,
            dedicated_rendering_nodes: 2,
            max_users_per_rendering_node: 4,
        }
    }

    fn orchestrator(batch: &InMemoryBatch) -> Orchestrator {
        Orchestrator::new(Arc::new(batch.clone()))
            .with_wait_settings(fast_wait())
            .with_task_timeout(Duration::from_millis(200))
    }

    fn rendering_pool(id: &str, nodes: u32) -> Pool {
        Pool {
            id: id.to_string(),
            role: PoolRole::Rendering,
            target_dedicated_nodes: nodes,
            allocation_state: AllocationState::Steady,
            vm_image: VmImage::rendering_default(),
            job_id: None,
        }
    }

    #[tokio::test]
    async fn full_pipeline_succeeds_and_cleans_up_job() {
        let batch = InMemoryBatch::new();
        let store = AssignmentStore::open_in_memory().unwrap();
        let orch = orchestrator(&batch).with_assignments(store.clone());

        orch.create_deployment(&params()).await.unwrap();

        // Both pools exist with the right roles.
        let pools = batch.list_pools().await.unwrap();
        assert_eq!(pools.len(), 2);
        let render = pools.iter().find(|p| p.id == "render-pool").unwrap();
        assert_eq!(render.role, PoolRole::Rendering);
        let turn = pools.iter().find(|p| p.id == "turn-pool").unwrap();
        assert_eq!(turn.role, PoolRole::TurnRelay);

        // Job torn down after completion; assignment recorded.
        assert!(!batch.job_exists("render-job").await);
        let assignment = store.get("render-pool").unwrap().unwrap();
        assert!(assignment.turn_endpoint.starts_with("turn:"));
        assert_eq!(assignment.job_id, "render-job");
    }

    #[tokio::test]
    async fn existing_rendering_pool_fails_fast_without_job() {
        let batch = InMemoryBatch::new();
        batch.seed_pool(rendering_pool("render-pool", 1), vec![]).await;
        let orch = orchestrator(&batch);

        let err = orch.create_deployment(&params()).await.unwrap_err();
        assert!(matches!(err, DeployError::RenderingPoolExists));
        // No job was ever created, so nothing to roll back.
        assert!(!batch.job_exists("render-job").await);
    }

    #[tokio::test]
    async fn existing_job_id_fails_fast() {
        let batch = InMemoryBatch::new();
        batch.seed_pool(rendering_pool("other-pool", 1), vec![]).await;
        batch.create_job("render-job", "other-pool").await.unwrap();
        let orch = orchestrator(&batch);

        let err = orch.create_deployment(&params()).await.unwrap_err();
        assert!(matches!(err, DeployError::JobExists));
    }

    #[tokio::test]
    async fn validation_rejects_missing_signaling() {
        let batch = InMemoryBatch::new();
        let orch = orchestrator(&batch);
        let mut p = params();
        p.signaling_server = String::new();

        let err = orch.create_deployment(&p).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::InvalidConfiguration(MSG_SIGNALING_REQUIRED)
        ));
    }

    #[tokio::test]
    async fn validation_rejects_zero_dedicated_nodes() {
        let batch = InMemoryBatch::new();
        let orch = orchestrator(&batch);
        let mut p = params();
        p.dedicated_rendering_nodes = 0;

        let err = orch.create_deployment(&p).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::InvalidConfiguration(MSG_DEDICATED_NODE_REQUIRED)
        ));
    }

    #[tokio::test]
    async fn validation_rejects_zero_max_users() {
        let batch = InMemoryBatch::new();
        let orch = orchestrator(&batch);
        let mut p = params();
        p.max_users_per_rendering_node = 0;

        let err = orch.create_deployment(&p).await.unwrap_err();
        assert!(matches!(
            err,
            DeployError::InvalidConfiguration(MSG_MAX_USER_REQUIRED)
        ));
    }

    #[tokio::test]
    async fn turn_pool_never_steady_rolls_back_job() {
        let batch = InMemoryBatch::manual();
        let orch = orchestrator(&batch);

        let err = orch.create_deployment(&params()).await.unwrap_err();
        assert!(matches!(err, DeployError::TurnPoolNotReady));
        // Rollback removed the job created at the start of the pipeline.
        assert!(!batch.job_exists("render-job").await);
    }

    /// Drive manually-simulated pools to ready as the pipeline creates
    /// them, leaving node `sabotage_index` in a terminal failure state.
    fn drive_infrastructure(
        batch: &InMemoryBatch,
        sabotage_index: Option<usize>,
    ) -> tokio::task::JoinHandle<()> {
        let batch = batch.clone();
        tokio::spawn(async move {
            for pool in ["turn-pool", "render-pool"] {
                loop {
                    if batch.get_pool(pool).await.is_ok() {
                        batch.set_allocation_state(pool, AllocationState::Steady).await;
                        for (i, node) in batch.list_nodes(pool).await.unwrap().iter().enumerate() {
                            let state = if pool == "render-pool" && Some(i) == sabotage_index {
                                NodeState::Unusable
                            } else {
                                NodeState::Idle
                            };
                            batch.set_node_state(pool, &node.id, state).await;
                        }
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        })
    }

    #[tokio::test]
    async fn failed_rendering_node_is_removed_and_excluded() {
        let batch = InMemoryBatch::manual();
        let orch = orchestrator(&batch);

        let driver = drive_infrastructure(&batch, Some(0));
        let completer = {
            let batch = batch.clone();
            tokio::spawn(async move {
                loop {
                    if batch.task_count("render-job").await > 0 {
                        batch
                            .complete_tasks("render-job", TaskResult::Success)
                            .await;
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        };

        orch.create_deployment(&params()).await.unwrap();
        driver.await.unwrap();
        completer.await.unwrap();

        // The unusable node was removed; only the survivor stayed.
        assert_eq!(batch.list_nodes("render-pool").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn task_timeout_terminates_job_and_fails() {
        // Manual mode: submitted tasks stay Active, so the monitor times out.
        let batch = InMemoryBatch::manual();
        let orch = orchestrator(&batch);

        let driver = drive_infrastructure(&batch, None);
        let err = orch.create_deployment(&params()).await.unwrap_err();
        driver.await.unwrap();
        assert!(matches!(err, DeployError::TasksTimedOut));
        assert!(!batch.job_exists("render-job").await);
    }

    #[tokio::test]
    async fn delete_pool_unknown_id() {
        let batch = InMemoryBatch::new();
        let orch = orchestrator(&batch);

        let err = orch.delete_pool("absent").await.unwrap_err();
        assert!(matches!(err, DeployError::PoolIdNotFound));
    }

    #[tokio::test]
    async fn delete_pool_requests_async_delete() {
        let batch = InMemoryBatch::new();
        batch.seed_pool(rendering_pool("render-1", 1), vec![]).await;
        let orch = orchestrator(&batch);

        orch.delete_pool("render-1").await.unwrap();
        let pool = batch.get_pool("render-1").await.unwrap();
        assert_eq!(pool.allocation_state, AllocationState::Deleting);
    }

    #[tokio::test]
    async fn resize_turn_pool_is_noop_at_target() {
        let batch = InMemoryBatch::new();
        batch
            .create_pool(PoolSpec::turn_relay("turn-1", 2, None))
            .await
            .unwrap();
        let orch = orchestrator(&batch);

        assert!(!orch.resize_turn_pool("turn-1", 2).await.unwrap());
        assert!(!orch.resize_turn_pool("missing", 2).await.unwrap());
        assert!(orch.resize_turn_pool("turn-1", 3).await.unwrap());
        assert_eq!(
            batch.get_pool("turn-1").await.unwrap().target_dedicated_nodes,
            3
        );
    }

    #[test]
    fn deploy_command_encodes_all_parameters() {
        let cmd = deploy_command(&params(), "turn:10.0.0.4:3478");
        assert!(cmd.contains("turn:10.0.0.4:3478"));
        assert!(cmd.contains("wss://signal.example"));
        assert!(cmd.contains("443"));
        assert!(cmd.contains("5000"));
        assert!(cmd.contains(" 4"));
    }
}
