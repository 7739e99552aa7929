//! streampool-api — REST API for streampool.
//!
//! Axum route handlers over the deployment orchestrator and autoscaler.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/api/create` | Deploy a rendering pool (and TURN pool if absent) |
//! | POST | `/api/deletePool` | Delete a pool by id |
//! | POST | `/api/orchestrator` | Submit a signaling load report |

pub mod handlers;
pub mod messages;

use std::sync::Arc;

use axum::Router;
use axum::routing::post;

use streampool_batch::BatchProvider;
use streampool_deploy::{DeploymentParams, Orchestrator};
use streampool_scale::{Autoscaler, DecisionEngine, ScalingConfig};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub autoscaler: Arc<Autoscaler>,
    /// Deployment defaults from configuration; request bodies override
    /// them field by field.
    pub defaults: DeploymentParams,
}

impl ApiState {
    /// Wire the orchestrator and autoscaler together: an upscale deploys
    /// a fresh pool using the configured defaults under the generated
    /// pool id, a downscale deletes the selected pool.
    pub fn assemble(
        provider: Arc<dyn BatchProvider>,
        orchestrator: Arc<Orchestrator>,
        scaling: ScalingConfig,
        defaults: DeploymentParams,
    ) -> Self {
        let deploy = Arc::clone(&orchestrator);
        let template = defaults.clone();
        let upscale: streampool_scale::UpscaleCallback = Arc::new(move |pool_id: String| {
            let deploy = Arc::clone(&deploy);
            let mut params = template.clone();
            Box::pin(async move {
                params.rendering_pool_id = pool_id.clone();
                params.rendering_job_id = pool_id;
                deploy.create_deployment(&params).await?;
                Ok(())
            })
        });

        let delete = Arc::clone(&orchestrator);
        let downscale: streampool_scale::DownscaleCallback = Arc::new(move |pool_id: String| {
            let delete = Arc::clone(&delete);
            Box::pin(async move {
                delete.delete_pool(&pool_id).await?;
                Ok(())
            })
        });

        let autoscaler = Autoscaler::new(
            DecisionEngine::new(provider, scaling),
            upscale,
            downscale,
        );
        Self {
            orchestrator,
            autoscaler: Arc::new(autoscaler),
            defaults,
        }
    }
}

/// Build the API router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/create", post(handlers::create))
        .route("/api/deletePool", post(handlers::delete_pool))
        .route("/api/orchestrator", post(handlers::orchestrator))
        .with_state(state)
}
