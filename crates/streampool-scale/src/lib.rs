//! streampool-scale — load-driven rendering pool scaling.
//!
//! Each load report from the signaling tier drives one evaluation against
//! the live pool inventory, yielding a scaling verdict. Upscale verdicts
//! create a new rendering pool immediately; downscale verdicts arm a
//! debounce timer so a transient dip never deletes a pool.
//!
//! # Decision Algorithm
//!
//! ```text
//! if up_threshold == 0 and down_threshold == 0:
//!     NotEnabled
//!
//! capacity = sum(nodes of live rendering pools) * max_users_per_node
//! if capacity < 1:
//!     Upscale            // cold start
//!
//! usage_pct = total_clients / capacity * 100
//! if usage_pct > up_threshold:
//!     Upscale
//! if usage_pct < down_threshold:
//!     candidates = steady rendering pools with every node idle
//!     if len(candidates) > minimum_rendering_pools:
//!         first candidate with no connected server on any of its
//!         node IPs -> Downscale { pool_id }
//! otherwise:
//!     Hold
//! ```
//!
//! Threshold comparisons are strict, so a usage exactly on a threshold
//! holds steady.

pub mod autoscaler;
pub mod capacity;
pub mod config;
pub mod debounce;
pub mod engine;

pub use autoscaler::{Autoscaler, DownscaleCallback, UpscaleCallback};
pub use capacity::max_rendering_capacity;
pub use config::ScalingConfig;
pub use debounce::DownscaleTimer;
pub use engine::{DecisionEngine, ScalingVerdict};
