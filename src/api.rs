//! REST API server for the relocation simulator
//!
//! Thin adapter over the orchestrator: request parsing, the response
//! envelope and error-to-status mapping. No simulation logic lives here.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::Orchestrator;
use crate::error::OrchestrationError;
use crate::models::{RelocationRequest, UserProfile};

/// =============================
/// Request Models
/// =============================

/// Body of `POST /simulate`; accepts one `target_city`, a list, or both
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SimulateRequest {
    #[serde(default, alias = "current_city", alias = "current_location")]
    pub origin: String,
    #[serde(default)]
    pub target_city: Option<String>,
    #[serde(default, alias = "target_locations", alias = "targets")]
    pub target_cities: Vec<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, alias = "user_profile")]
    pub profile: UserProfile,
}

impl SimulateRequest {
    pub fn into_request(self) -> RelocationRequest {
        let targets = self
            .target_city
            .into_iter()
            .chain(self.target_cities)
            .collect();

        RelocationRequest {
            origin: self.origin,
            targets,
            currency: self.currency,
            profile: self.profile,
        }
    }
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_data<T: Serialize>(mut self, data: T) -> Self {
        self.data = serde_json::to_value(data).ok();
        self
    }
}

/// HTTP status for each error kind
pub fn status_for(error: &OrchestrationError) -> StatusCode {
    match error {
        OrchestrationError::Validation(_) => StatusCode::BAD_REQUEST,
        OrchestrationError::RunFailed(_) => StatusCode::BAD_GATEWAY,
        OrchestrationError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
        OrchestrationError::Configuration(_)
        | OrchestrationError::AggregationInternal(_)
        | OrchestrationError::SerializationError(_)
        | OrchestrationError::HttpError(_)
        | OrchestrationError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// Info Endpoints
/// =============================

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "relocation-agent-orchestrator",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/health", "/stages", "/simulate", "/runs"]
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn list_stages(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.orchestrator.registry().describe()))
}

/// =============================
/// Simulation Endpoint
/// =============================

async fn simulate(
    State(state): State<ApiState>,
    payload: std::result::Result<Json<SimulateRequest>, JsonRejection>,
) -> (StatusCode, Json<ApiResponse>) {
    let request = match payload {
        Ok(Json(req)) => req.into_request(),
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "API: unreadable simulation request");
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    ApiResponse::error(format!("invalid request body: {}", rejection.body_text()))
                        .with_data(serde_json::json!({ "kind": "validation_error" })),
                ),
            );
        }
    };

    info!(
        origin = %request.origin,
        targets = ?request.targets,
        "API: simulation requested"
    );

    let outcome = state
        .orchestrator
        .execute(&request, CancellationToken::new())
        .await;

    match outcome.result {
        Ok(report) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "run_id": outcome.run_id,
                "report": report,
            }))),
        ),
        Err(e) => {
            let failed_stages = match &e {
                OrchestrationError::RunFailed(err) => err.failed_stages.clone(),
                _ => Vec::new(),
            };

            (
                status_for(&e),
                Json(ApiResponse::error(e.to_string()).with_data(serde_json::json!({
                    "run_id": outcome.run_id,
                    "kind": e.kind(),
                    "failed_stages": failed_stages,
                }))),
            )
        }
    }
}

/// =============================
/// Audit Endpoints
/// =============================

async fn list_runs(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.audit_log().list().await {
        Ok(ids) => (StatusCode::OK, Json(ApiResponse::success(ids))),
        Err(e) => (status_for(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

async fn get_run(
    State(state): State<ApiState>,
    Path(run_id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.audit_log().get(run_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(ApiResponse::success(record))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("run {} not found", run_id))),
        ),
        Err(e) => (status_for(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/stages", get(list_stages))
        .route("/simulate", post(simulate))
        .route("/runs", get(list_runs))
        .route("/runs/:run_id", get(get_run))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
