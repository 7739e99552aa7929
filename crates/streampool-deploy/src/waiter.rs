//! Pool/node state waiter.
//!
//! Polls the provider on a fixed interval until a resource reaches the
//! desired state, a terminal-failure state (nodes only), or a timeout
//! elapses. Pure observation — the waiter never mutates anything.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use streampool_batch::{AllocationState, BatchProvider, NodeState};

/// Poll interval and overall timeout for a wait.
#[derive(Debug, Clone, Copy)]
pub struct WaitSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Wait until a pool reaches the desired allocation state.
///
/// Returns `false` on timeout or when the pool can no longer be read.
pub async fn await_pool_state(
    provider: &dyn BatchProvider,
    pool_id: &str,
    desired: AllocationState,
    settings: &WaitSettings,
) -> bool {
    let deadline = Instant::now() + settings.timeout;
    loop {
        match provider.get_pool(pool_id).await {
            Ok(pool) if pool.allocation_state == desired => {
                debug!(%pool_id, state = ?desired, "pool reached desired state");
                return true;
            }
            Ok(pool) => {
                debug!(%pool_id, state = ?pool.allocation_state, "pool not ready yet");
            }
            Err(e) => {
                warn!(%pool_id, error = %e, "pool refresh failed during wait");
                return false;
            }
        }

        if Instant::now() >= deadline {
            warn!(%pool_id, state = ?desired, "timed out waiting for pool state");
            return false;
        }
        tokio::time::sleep(settings.poll_interval).await;
    }
}

/// Wait until a node reaches the desired state.
///
/// Short-circuits with `false` as soon as the node enters a terminal
/// failure state; otherwise returns `false` on timeout or read failure.
pub async fn await_node_state(
    provider: &dyn BatchProvider,
    pool_id: &str,
    node_id: &str,
    desired: NodeState,
    settings: &WaitSettings,
) -> bool {
    let deadline = Instant::now() + settings.timeout;
    loop {
        match provider.get_node(pool_id, node_id).await {
            Ok(node) => {
                if node.state == desired {
                    debug!(%pool_id, %node_id, state = ?desired, "node reached desired state");
                    return true;
                }
                if node.state.is_terminal_failure() {
                    warn!(%pool_id, %node_id, state = ?node.state, "node entered terminal failure state");
                    return false;
                }
            }
            Err(e) => {
                warn!(%pool_id, %node_id, error = %e, "node refresh failed during wait");
                return false;
            }
        }

        if Instant::now() >= deadline {
            warn!(%pool_id, %node_id, state = ?desired, "timed out waiting for node state");
            return false;
        }
        tokio::time::sleep(settings.poll_interval).await;
    }
}
