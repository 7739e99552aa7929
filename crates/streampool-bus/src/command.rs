//! Wire format for bus commands.

use serde::Deserialize;

/// A deployment command published to the bus, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum BusCommand {
    /// Deploy a rendering pool. Ids default to the worker's configured
    /// template when omitted.
    #[serde(rename_all = "camelCase")]
    Create {
        #[serde(default)]
        rendering_pool_id: Option<String>,
        #[serde(default)]
        rendering_job_id: Option<String>,
    },

    /// Delete a pool by id.
    #[serde(rename_all = "camelCase")]
    Delete { pool_id: String },

    /// Terminate a job by id.
    #[serde(rename_all = "camelCase")]
    Terminate {
        job_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
}
