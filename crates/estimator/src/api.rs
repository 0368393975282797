//! HTTP API for estimations, health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use estimator_lib::{
    EstimationError, EstimationTarget, ResourceEstimator, ResourceList, ResourceRequirements,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub estimator: Arc<dyn ResourceEstimator>,
    ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(estimator: Arc<dyn ResourceEstimator>) -> Self {
        Self {
            estimator,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimationRequest {
    pub target: EstimationTarget,
    #[serde(default)]
    pub overrides: HashMap<String, String>,
    pub container_name: String,
    #[serde(default)]
    pub current_resources: Option<ResourceRequirements>,
}

#[derive(Debug, Serialize)]
pub struct EstimationResponse {
    pub resources: ResourceList,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub target: EstimationTarget,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_key: Option<String>,
}

/// Estimation failure rendered as an HTTP response
pub struct ApiError(EstimationError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EstimationError::NoData { .. } => StatusCode::NOT_FOUND,
            EstimationError::Configuration { .. } | EstimationError::InvalidSample { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            EstimationError::Query { .. } => StatusCode::BAD_GATEWAY,
        };
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
            query_key: self.0.query_key().map(str::to_string),
        };
        (status, Json(body)).into_response()
    }
}

async fn estimate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<EstimationRequest>,
) -> Result<Json<EstimationResponse>, ApiError> {
    let resources = state
        .estimator
        .get_resource_estimation(
            &request.target,
            &request.overrides,
            &request.container_name,
            request.current_resources.as_ref(),
        )
        .await
        .map_err(ApiError)?;

    Ok(Json(EstimationResponse { resources }))
}

async fn delete_estimation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeleteRequest>,
) -> StatusCode {
    state.estimator.delete_estimation(&request.target).await;
    StatusCode::NO_CONTENT
}

/// Liveness: the process is serving requests
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "healthy" })))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.is_ready();
    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(serde_json::json!({ "ready": ready })))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/estimations", post(estimate))
        .route("/v1/estimations/delete", post(delete_estimation))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
