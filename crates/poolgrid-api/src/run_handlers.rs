//! REST API handlers for reconciliation runs.
//!
//! Starting a run returns immediately with the run id; the run itself
//! proceeds in the background and is observed through `GET /runs/{id}`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use poolgrid_reconcile::ReconcileError;
use tracing::info;

use crate::ApiState;
use crate::handlers::{ApiResponse, error_response};

/// Body returned when a run is accepted.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct RunAccepted {
    pub run_id: String,
    pub status_url: String,
}

impl RunAccepted {
    fn new(run_id: String) -> Self {
        let status_url = format!("/api/v1/runs/{run_id}");
        Self { run_id, status_url }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub struct RunListQuery {
    pub pool: Option<String>,
}

fn reconcile_error(e: &ReconcileError) -> axum::response::Response {
    let status = match e {
        ReconcileError::RunNotFound(_) => StatusCode::NOT_FOUND,
        ReconcileError::RunAlreadyActive(_) => StatusCode::CONFLICT,
        ReconcileError::Configuration(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status).into_response()
}

/// POST /api/v1/pools/{id}/runs
///
/// An unknown pool is not rejected here: the run fails with
/// `PoolNotFound` and reports it through its status.
pub async fn start_run(
    State(state): State<ApiState>,
    Path(pool_id): Path<String>,
) -> impl IntoResponse {
    match state.reconciler.start(&pool_id).await {
        Ok(run_id) => {
            info!(run = %run_id, pool = %pool_id, "run accepted");
            (StatusCode::ACCEPTED, ApiResponse::ok(RunAccepted::new(run_id))).into_response()
        }
        Err(e) => reconcile_error(&e),
    }
}

/// GET /api/v1/runs
pub async fn list_runs(
    State(state): State<ApiState>,
    Query(query): Query<RunListQuery>,
) -> impl IntoResponse {
    let registry = state.reconciler.registry();
    let runs = match &query.pool {
        Some(pool_id) => registry.list_for_pool(pool_id),
        None => registry.list(),
    };
    match runs {
        Ok(runs) => ApiResponse::ok(runs).into_response(),
        Err(e) => reconcile_error(&e),
    }
}

/// GET /api/v1/runs/{id}
pub async fn get_run(
    State(state): State<ApiState>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    match state.reconciler.registry().status(&run_id) {
        Ok(Some(record)) => ApiResponse::ok(record).into_response(),
        Ok(None) => error_response("run not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => reconcile_error(&e),
    }
}

/// GET /api/v1/runs/{id}/steps
pub async fn list_run_steps(
    State(state): State<ApiState>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    let registry = state.reconciler.registry();
    match registry.status(&run_id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response("run not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => return reconcile_error(&e),
    }
    match registry.steps(&run_id) {
        Ok(steps) => ApiResponse::ok(steps).into_response(),
        Err(e) => reconcile_error(&e),
    }
}

/// POST /api/v1/runs/{id}/replay
pub async fn replay_run(
    State(state): State<ApiState>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    match state.reconciler.replay(&run_id).await {
        Ok(()) => {
            info!(run = %run_id, "run replay accepted");
            (StatusCode::ACCEPTED, ApiResponse::ok(RunAccepted::new(run_id))).into_response()
        }
        Err(e) => reconcile_error(&e),
    }
}

/// POST /api/v1/runs/{id}/cancel
pub async fn cancel_run(
    State(state): State<ApiState>,
    Path(run_id): Path<String>,
) -> impl IntoResponse {
    if state.reconciler.cancel(&run_id).await {
        ApiResponse::ok(serde_json::json!({ "run_id": run_id, "status": "cancelling" }))
            .into_response()
    } else {
        error_response("run not in flight", StatusCode::NOT_FOUND).into_response()
    }
}
