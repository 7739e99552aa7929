//! Domain types for the batch-compute capability layer.
//!
//! These mirror what the provider reports about pools, nodes, jobs and
//! tasks. Pool allocation state and node state are owned by the provider;
//! the core only observes them via polling.

use serde::{Deserialize, Serialize};

/// Unique identifier for a pool.
pub type PoolId = String;

/// Unique identifier for a compute node within a pool.
pub type NodeId = String;

/// Unique identifier for a job.
pub type JobId = String;

/// Unique identifier for a task within a job.
pub type TaskId = String;

// ── Pools ──────────────────────────────────────────────────────────

/// The role a pool plays in a streaming deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolRole {
    /// Network-traversal relay nodes used by the signaling tier.
    TurnRelay,
    /// GPU rendering nodes that serve client sessions.
    Rendering,
}

/// Provider-reported lifecycle state of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationState {
    Steady,
    Resizing,
    Stopping,
    Deleting,
}

/// VM image and size descriptor. Opaque to the orchestration core —
/// it is handed to the provider verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmImage {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub vm_size: String,
}

impl VmImage {
    /// Small general-purpose Linux VM used for TURN relays.
    pub fn turn_relay_default() -> Self {
        Self {
            publisher: "Canonical".to_string(),
            offer: "UbuntuServer".to_string(),
            sku: "18.04-LTS".to_string(),
            vm_size: "STANDARD_A1".to_string(),
        }
    }

    /// GPU-backed Windows VM used for rendering nodes.
    pub fn rendering_default() -> Self {
        Self {
            publisher: "MicrosoftWindowsServer".to_string(),
            offer: "WindowsServer".to_string(),
            sku: "2016-Datacenter".to_string(),
            vm_size: "Standard_NV6".to_string(),
        }
    }
}

/// A named group of compute nodes provisioned for one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: PoolId,
    pub role: PoolRole,
    /// Target dedicated node count requested at creation or resize.
    pub target_dedicated_nodes: u32,
    pub allocation_state: AllocationState,
    pub vm_image: VmImage,
    /// The job bound to this pool, if one has been created.
    pub job_id: Option<JobId>,
}

/// Everything the provider needs to create a pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub id: PoolId,
    pub role: PoolRole,
    pub target_dedicated_nodes: u32,
    pub vm_image: VmImage,
    /// Bootstrap command run on each node as it joins the pool.
    pub start_command: String,
    /// Optional subnet the pool's nodes attach to.
    pub subnet_id: Option<String>,
}

impl PoolSpec {
    /// Spec for a TURN relay pool. The start command provisions the
    /// relay container; its content is owned by the deployment scripts.
    pub fn turn_relay(id: &str, target_dedicated_nodes: u32, subnet_id: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            role: PoolRole::TurnRelay,
            target_dedicated_nodes,
            vm_image: VmImage::turn_relay_default(),
            start_command: "bash -c \"docker run -d -p 3478:3478 -p 3478:3478/udp --restart=always turn-server\"".to_string(),
            subnet_id,
        }
    }

    /// Spec for a rendering pool.
    pub fn rendering(id: &str, target_dedicated_nodes: u32, subnet_id: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            role: PoolRole::Rendering,
            target_dedicated_nodes,
            vm_image: VmImage::rendering_default(),
            start_command: "cmd /c install_rendering_packages.cmd".to_string(),
            subnet_id,
        }
    }
}

// ── Nodes ──────────────────────────────────────────────────────────

/// Provider-reported lifecycle state of a single compute node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Creating,
    Starting,
    WaitingForStartTask,
    Rebooting,
    Running,
    Idle,
    Unknown,
    Unusable,
    Offline,
    StartTaskFailed,
    Preempted,
}

impl NodeState {
    /// States that will never progress to `Idle`. A waiter observing one
    /// of these aborts immediately instead of waiting out its timeout.
    pub fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            NodeState::Unknown
                | NodeState::Unusable
                | NodeState::Offline
                | NodeState::StartTaskFailed
                | NodeState::Preempted
        )
    }
}

/// Login endpoint for a provisioned node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLogin {
    pub ip: String,
    pub port: u16,
}

/// A compute node belonging to exactly one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeNode {
    pub id: NodeId,
    pub pool_id: PoolId,
    pub state: NodeState,
    /// Present once the node has been provisioned.
    pub login: Option<RemoteLogin>,
}

// ── Jobs and tasks ─────────────────────────────────────────────────

/// A job bound to one pool, holding zero or more tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub pool_id: PoolId,
}

/// Completion state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Active,
    Running,
    Completed,
}

/// Execution outcome of a completed task. A task can reach `Completed`
/// and still carry a `Failure` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskResult {
    Success,
    Failure,
}

/// Execution details reported by the provider after a task finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub result: TaskResult,
    pub exit_code: Option<i32>,
    pub message: Option<String>,
}

/// A task submitted to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    pub command: String,
    pub state: TaskState,
    pub execution: Option<TaskExecution>,
}

/// A task to be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub command: String,
}

// ── Load reports ───────────────────────────────────────────────────

/// One rendering server as reported by the signaling tier. Ephemeral —
/// supplied per autoscaling evaluation, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedServer {
    /// Slots currently in use on this server.
    pub slots: u32,
    /// The server's node IP as seen by the signaling tier.
    pub ip: String,
}
