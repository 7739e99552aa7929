//! REST API handlers.
//!
//! Field-level request validation happens here; deployment semantics
//! (configuration checks, pool existence) live in the orchestrator, and
//! its error display strings pass through as the response messages.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::info;

use streampool_batch::ConnectedServer;
use streampool_deploy::{DeployError, DeploymentParams};
use streampool_scale::ScalingVerdict;

use crate::{ApiState, messages};

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

fn deploy_error_status(e: &DeployError) -> StatusCode {
    if e.is_infrastructure() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_REQUEST
    }
}

// ── Create ─────────────────────────────────────────────────────

/// Create request body. Every field is optional; configuration defaults
/// fill the gaps.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateRequest {
    pub signaling_server: Option<String>,
    pub signaling_server_port: Option<u16>,
    pub vnet: Option<String>,
    pub turn_pool_id: Option<String>,
    pub rendering_pool_id: Option<String>,
    pub rendering_job_id: Option<String>,
    pub dedicated_turn_nodes: Option<u32>,
    pub dedicated_rendering_nodes: Option<u32>,
    pub max_users_per_rendering_node: Option<u32>,
}

impl CreateRequest {
    fn merge_into(self, defaults: &DeploymentParams) -> DeploymentParams {
        let mut params = defaults.clone();
        if let Some(v) = self.signaling_server {
            params.signaling_server = v;
        }
        if let Some(v) = self.signaling_server_port {
            params.signaling_server_port = v;
        }
        if self.vnet.is_some() {
            params.vnet = self.vnet;
        }
        if let Some(v) = self.turn_pool_id {
            params.turn_pool_id = v;
        }
        if let Some(v) = self.rendering_pool_id {
            params.rendering_pool_id = v;
        }
        if let Some(v) = self.rendering_job_id {
            params.rendering_job_id = v;
        }
        if let Some(v) = self.dedicated_turn_nodes {
            params.dedicated_turn_nodes = v;
        }
        if let Some(v) = self.dedicated_rendering_nodes {
            params.dedicated_rendering_nodes = v;
        }
        if let Some(v) = self.max_users_per_rendering_node {
            params.max_users_per_rendering_node = v;
        }
        params
    }
}

/// POST /api/create
///
/// Runs the full deployment pipeline before responding; an empty body
/// deploys with the configured defaults.
pub async fn create(
    State(state): State<ApiState>,
    body: Option<Json<CreateRequest>>,
) -> impl IntoResponse {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let params = request.merge_into(&state.defaults);

    info!(
        rendering_pool = %params.rendering_pool_id,
        turn_pool = %params.turn_pool_id,
        "create requested"
    );
    match state.orchestrator.create_deployment(&params).await {
        Ok(()) => ApiResponse::ok(serde_json::json!({
            "renderingPoolId": params.rendering_pool_id,
            "turnPoolId": params.turn_pool_id,
        }))
        .into_response(),
        Err(e) => error_response(&e.to_string(), deploy_error_status(&e)).into_response(),
    }
}

// ── Delete pool ────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePoolRequest {
    #[serde(default)]
    pub pool_id: Option<String>,
}

/// POST /api/deletePool
pub async fn delete_pool(
    State(state): State<ApiState>,
    body: Option<Json<DeletePoolRequest>>,
) -> impl IntoResponse {
    let Some(Json(request)) = body else {
        return error_response(messages::BODY_REQUIRED, StatusCode::BAD_REQUEST).into_response();
    };
    let pool_id = match request.pool_id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => {
            return error_response(messages::POOL_ID_REQUIRED, StatusCode::BAD_REQUEST)
                .into_response();
        }
    };

    match state.orchestrator.delete_pool(pool_id).await {
        Ok(()) => ApiResponse::ok(serde_json::json!({ "poolId": pool_id })).into_response(),
        Err(e) => error_response(&e.to_string(), deploy_error_status(&e)).into_response(),
    }
}

// ── Load reports ───────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    #[serde(default)]
    pub total_sessions: Option<u32>,
    #[serde(default)]
    pub total_slots: Option<u32>,
    #[serde(default)]
    pub servers: Vec<ConnectedServer>,
}

/// POST /api/orchestrator
///
/// Always `200 OK` when the report is accepted: scaling actions run in
/// the background and their outcome is not part of this response.
pub async fn orchestrator(
    State(state): State<ApiState>,
    body: Option<Json<LoadReport>>,
) -> impl IntoResponse {
    let Some(Json(report)) = body else {
        return error_response(messages::BODY_REQUIRED, StatusCode::BAD_REQUEST).into_response();
    };
    let (Some(total_sessions), Some(_total_slots)) = (report.total_sessions, report.total_slots)
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match state
        .autoscaler
        .handle_report(total_sessions, &report.servers)
        .await
    {
        Ok(ScalingVerdict::NotEnabled) => {
            error_response(messages::NO_AUTOSCALING, StatusCode::BAD_REQUEST).into_response()
        }
        Ok(_) => ApiResponse::ok(()).into_response(),
        Err(e) => {
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response()
        }
    }
}
