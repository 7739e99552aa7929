//! Scaling decision engine.
//!
//! Stateless between calls: every evaluation re-lists the pool inventory
//! so a decision is never based on a stale snapshot.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use streampool_batch::{AllocationState, BatchProvider, ConnectedServer, NodeState, PoolRole};

use crate::capacity::max_rendering_capacity;
use crate::config::ScalingConfig;

/// Outcome of one scaling evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalingVerdict {
    /// Both thresholds are zero; autoscaling is off.
    NotEnabled,
    /// Create a new rendering pool.
    Upscale,
    /// Delete the named idle rendering pool (after the debounce delay).
    Downscale { pool_id: String },
    /// Load is within thresholds; no action.
    Hold,
}

/// Evaluates load reports against the live pool inventory.
pub struct DecisionEngine {
    provider: Arc<dyn BatchProvider>,
    config: ScalingConfig,
}

impl DecisionEngine {
    pub fn new(provider: Arc<dyn BatchProvider>, config: ScalingConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &ScalingConfig {
        &self.config
    }

    /// Evaluate one load report.
    ///
    /// `total_clients` is the session count reported by the signaling
    /// tier; `servers` lists the rendering servers it currently sees,
    /// keyed by node IP.
    pub async fn evaluate(
        &self,
        total_clients: u32,
        servers: &[ConnectedServer],
    ) -> anyhow::Result<ScalingVerdict> {
        if !self.config.enabled() {
            return Ok(ScalingVerdict::NotEnabled);
        }

        let capacity = max_rendering_capacity(
            self.provider.as_ref(),
            self.config.max_users_per_rendering_node,
        )
        .await?;
        if capacity < 1 {
            debug!(total_clients, "no rendering capacity; cold-start upscale");
            return Ok(ScalingVerdict::Upscale);
        }

        let usage_pct = f64::from(total_clients) / f64::from(capacity) * 100.0;
        debug!(total_clients, capacity, usage_pct, "evaluating load report");

        // Strict comparisons: usage exactly on a threshold holds steady.
        if usage_pct > f64::from(self.config.up_threshold) {
            return Ok(ScalingVerdict::Upscale);
        }
        if usage_pct < f64::from(self.config.down_threshold) {
            return self.downscale_candidate(servers).await;
        }
        Ok(ScalingVerdict::Hold)
    }

    /// Pick the pool to delete on low load, or hold if none qualifies.
    ///
    /// Candidates are steady rendering pools whose nodes are all idle.
    /// The floor check runs first; then the first candidate in listing
    /// order with no connected server on any of its node IPs wins.
    /// The connected-server scan is deliberately restricted to the
    /// candidate list: a pool that is resizing or has busy nodes is
    /// never deletable, so checking its IPs could only pick a pool we
    /// must not delete.
    async fn downscale_candidate(
        &self,
        servers: &[ConnectedServer],
    ) -> anyhow::Result<ScalingVerdict> {
        let pools = self.provider.list_pools().await?;
        let mut candidates: Vec<(String, Vec<String>)> = Vec::new();

        for pool in pools {
            if pool.role != PoolRole::Rendering || pool.allocation_state != AllocationState::Steady
            {
                continue;
            }
            let nodes = self.provider.list_nodes(&pool.id).await?;
            if !nodes.iter().all(|n| n.state == NodeState::Idle) {
                continue;
            }
            let ips = nodes
                .iter()
                .filter_map(|n| n.login.as_ref().map(|l| l.ip.clone()))
                .collect();
            candidates.push((pool.id, ips));
        }

        if candidates.len() <= self.config.minimum_rendering_pools {
            debug!(
                candidates = candidates.len(),
                floor = self.config.minimum_rendering_pools,
                "at the rendering pool floor; holding"
            );
            return Ok(ScalingVerdict::Hold);
        }

        let connected_ips: HashSet<&str> = servers.iter().map(|s| s.ip.as_str()).collect();
        for (pool_id, ips) in candidates {
            if ips.iter().all(|ip| !connected_ips.contains(ip.as_str())) {
                return Ok(ScalingVerdict::Downscale { pool_id });
            }
        }
        Ok(ScalingVerdict::Hold)
    }
}
