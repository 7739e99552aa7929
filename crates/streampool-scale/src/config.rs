//! Scaling configuration.

use std::time::Duration;

/// Per-process scaling parameters, fixed at startup.
#[derive(Debug, Clone)]
pub struct ScalingConfig {
    /// Usage percentage above which a new rendering pool is created.
    pub up_threshold: u32,
    /// Usage percentage below which an idle rendering pool may be deleted.
    pub down_threshold: u32,
    /// Pool count the downscaler must never go below.
    pub minimum_rendering_pools: usize,
    /// Session capacity of a single rendering node.
    pub max_users_per_rendering_node: u32,
    /// How long a downscale verdict must persist before a pool is deleted.
    /// Zero disables the downscale timer: verdicts are computed but no
    /// pool is ever deleted automatically.
    pub downscale_delay: Duration,
}

impl ScalingConfig {
    /// Autoscaling is enabled when at least one threshold is set.
    pub fn enabled(&self) -> bool {
        self.up_threshold > 0 || self.down_threshold > 0
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            up_threshold: 0,
            down_threshold: 0,
            minimum_rendering_pools: 1,
            max_users_per_rendering_node: 1,
            downscale_delay: Duration::from_secs(15 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_requires_a_nonzero_threshold() {
        let mut config = ScalingConfig::default();
        assert!(!config.enabled());

        config.up_threshold = 80;
        assert!(config.enabled());

        config.up_threshold = 0;
        config.down_threshold = 20;
        assert!(config.enabled());
    }
}
