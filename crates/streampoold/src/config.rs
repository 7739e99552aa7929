//! Daemon configuration.
//!
//! Loaded from an optional TOML file, then overridden field by field from
//! environment variables carrying the same key names. Key names are
//! PascalCase for compatibility with existing deployment environments.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use streampool_deploy::DeploymentParams;
use streampool_scale::ScalingConfig;

pub const DEFAULT_TURN_POOL_ID: &str = "DefaultTurnPool";
pub const DEFAULT_RENDERING_POOL_ID: &str = "DefaultRenderingPool";
pub const DEFAULT_RENDERING_JOB_ID: &str = "DefaultRenderingJob";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Batch account settings, forwarded to the provider transport.
    /// Standalone mode runs against the in-memory provider and only logs
    /// these.
    #[serde(rename = "BatchAccountName")]
    pub batch_account_name: String,
    #[serde(rename = "BatchAccountKey")]
    pub batch_account_key: String,
    #[serde(rename = "BatchAccountUrl")]
    pub batch_account_url: String,

    #[serde(rename = "DedicatedTurnNodes")]
    pub dedicated_turn_nodes: u32,
    #[serde(rename = "DedicatedRenderingNodes")]
    pub dedicated_rendering_nodes: u32,
    #[serde(rename = "MaxUsersPerRenderingNode")]
    pub max_users_per_rendering_node: u32,

    #[serde(rename = "AutomaticScalingUpThreshold")]
    pub automatic_scaling_up_threshold: u32,
    #[serde(rename = "AutomaticScalingDownThreshold")]
    pub automatic_scaling_down_threshold: u32,
    #[serde(rename = "MinimumRenderingPools")]
    pub minimum_rendering_pools: usize,
    #[serde(rename = "AutomaticDownscaleTimeoutMinutes")]
    pub automatic_downscale_timeout_minutes: u64,

    #[serde(rename = "SignalingServerUrl")]
    pub signaling_server_url: String,
    #[serde(rename = "SignalingServerPort")]
    pub signaling_server_port: u16,
    #[serde(rename = "Vnet")]
    pub vnet: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            batch_account_name: String::new(),
            batch_account_key: String::new(),
            batch_account_url: String::new(),
            dedicated_turn_nodes: 1,
            dedicated_rendering_nodes: 1,
            max_users_per_rendering_node: 4,
            automatic_scaling_up_threshold: 0,
            automatic_scaling_down_threshold: 0,
            minimum_rendering_pools: 1,
            automatic_downscale_timeout_minutes: 15,
            signaling_server_url: String::new(),
            signaling_server_port: 443,
            vnet: None,
        }
    }
}

impl DaemonConfig {
    /// Load from a TOML file (if given), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                toml::from_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment variables use the same names as the TOML keys and win
    /// over the file. Unparseable numeric values are ignored.
    pub fn apply_env_overrides(&mut self) {
        fn string(key: &str, slot: &mut String) {
            if let Ok(value) = std::env::var(key) {
                *slot = value;
            }
        }
        fn parsed<T: std::str::FromStr>(key: &str, slot: &mut T) {
            if let Ok(value) = std::env::var(key)
                && let Ok(value) = value.parse()
            {
                *slot = value;
            }
        }

        string("BatchAccountName", &mut self.batch_account_name);
        string("BatchAccountKey", &mut self.batch_account_key);
        string("BatchAccountUrl", &mut self.batch_account_url);
        parsed("DedicatedTurnNodes", &mut self.dedicated_turn_nodes);
        parsed(
            "DedicatedRenderingNodes",
            &mut self.dedicated_rendering_nodes,
        );
        parsed(
            "MaxUsersPerRenderingNode",
            &mut self.max_users_per_rendering_node,
        );
        parsed(
            "AutomaticScalingUpThreshold",
            &mut self.automatic_scaling_up_threshold,
        );
        parsed(
            "AutomaticScalingDownThreshold",
            &mut self.automatic_scaling_down_threshold,
        );
        parsed("MinimumRenderingPools", &mut self.minimum_rendering_pools);
        parsed(
            "AutomaticDownscaleTimeoutMinutes",
            &mut self.automatic_downscale_timeout_minutes,
        );
        string("SignalingServerUrl", &mut self.signaling_server_url);
        parsed("SignalingServerPort", &mut self.signaling_server_port);
        if let Ok(value) = std::env::var("Vnet") {
            self.vnet = if value.is_empty() { None } else { Some(value) };
        }
    }

    pub fn scaling(&self) -> ScalingConfig {
        ScalingConfig {
            up_threshold: self.automatic_scaling_up_threshold,
            down_threshold: self.automatic_scaling_down_threshold,
            minimum_rendering_pools: self.minimum_rendering_pools,
            max_users_per_rendering_node: self.max_users_per_rendering_node,
            downscale_delay: Duration::from_secs(self.automatic_downscale_timeout_minutes * 60),
        }
    }

    pub fn deployment_defaults(&self) -> DeploymentParams {
        DeploymentParams {
            turn_pool_id: DEFAULT_TURN_POOL_ID.to_string(),
            rendering_pool_id: DEFAULT_RENDERING_POOL_ID.to_string(),
            rendering_job_id: DEFAULT_RENDERING_JOB_ID.to_string(),
            signaling_server: self.signaling_server_url.clone(),
            signaling_server_port: self.signaling_server_port,
            vnet: self.vnet.clone(),
            dedicated_turn_nodes: self.dedicated_turn_nodes,
            dedicated_rendering_nodes: self.dedicated_rendering_nodes,
            max_users_per_rendering_node: self.max_users_per_rendering_node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pascal_case_toml_keys() {
        let config: DaemonConfig = toml::from_str(
            r#"
            SignalingServerUrl = "wss://signal.example"
            SignalingServerPort = 8443
            DedicatedRenderingNodes = 3
            AutomaticScalingUpThreshold = 80
            AutomaticScalingDownThreshold = 20
            MinimumRenderingPools = 2
            AutomaticDownscaleTimeoutMinutes = 5
            Vnet = "subnet-1"
            "#,
        )
        .unwrap();

        assert_eq!(config.signaling_server_url, "wss://signal.example");
        assert_eq!(config.signaling_server_port, 8443);
        assert_eq!(config.dedicated_rendering_nodes, 3);
        assert_eq!(config.vnet.as_deref(), Some("subnet-1"));

        let scaling = config.scaling();
        assert!(scaling.enabled());
        assert_eq!(scaling.minimum_rendering_pools, 2);
        assert_eq!(scaling.downscale_delay, Duration::from_secs(300));
    }

    #[test]
    fn defaults_disable_autoscaling() {
        let config = DaemonConfig::default();
        assert!(!config.scaling().enabled());

        let params = config.deployment_defaults();
        assert_eq!(params.turn_pool_id, DEFAULT_TURN_POOL_ID);
        assert_eq!(params.rendering_pool_id, DEFAULT_RENDERING_POOL_ID);
        assert_eq!(params.dedicated_turn_nodes, 1);
    }
}
