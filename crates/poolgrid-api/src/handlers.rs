//! Pool handlers and the shared response envelope.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use poolgrid_core::Pool;
use tracing::info;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    ApiResponse::ok("ok")
}

// ── Pools ──────────────────────────────────────────────────────

/// GET /api/v1/pools
pub async fn list_pools(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_pools() {
        Ok(pools) => ApiResponse::ok(pools).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/pools/{id}
pub async fn get_pool(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_pool(&id) {
        Ok(Some(pool)) => ApiResponse::ok(pool).into_response(),
        Ok(None) => error_response("pool not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// PUT /api/v1/pools/{id}
pub async fn put_pool(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(pool): Json<Pool>,
) -> impl IntoResponse {
    if pool.id != id {
        return error_response(
            &format!("pool id '{}' does not match path '{id}'", pool.id),
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }
    if let Err(e) = pool.validate() {
        return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }

    let existed = match state.store.get_pool(&id) {
        Ok(existing) => existing.is_some(),
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };
    match state.store.put_pool(&pool) {
        Ok(()) => {
            info!(pool = %id, desired = pool.desired_vm_count, "pool stored");
            let status = if existed {
                StatusCode::OK
            } else {
                StatusCode::CREATED
            };
            (status, ApiResponse::ok(pool)).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/v1/pools/{id}
///
/// Removes the declaration only; provider resources are left in place.
pub async fn delete_pool(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.delete_pool(&id) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("pool not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use poolgrid_provider::SimulatedProvider;
    use poolgrid_reconcile::{ReconcileSettings, Reconciler};
    use poolgrid_state::StateStore;

    pub(crate) fn test_state() -> ApiState {
        let store = StateStore::open_in_memory().unwrap();
        let reconciler = Reconciler::with_store(
            Arc::new(SimulatedProvider::new()),
            store.clone(),
            ReconcileSettings::default(),
        );
        ApiState {
            store,
            reconciler: Arc::new(reconciler),
        }
    }

    pub(crate) fn test_pool(id: &str, count: u32) -> Pool {
        Pool {
            id: id.to_string(),
            resource_group_name: "rg-games".to_string(),
            location: "westeurope".to_string(),
            desired_vm_count: count,
            vnet_name: None,
            dual_homed: true,
            vm_size: "Standard_D3_v2".to_string(),
            admin_username: "poolgrid".to_string(),
            admin_credentials_ref: "vault://pools/admin".to_string(),
            tags: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn list_pools_empty() {
        let resp = list_pools(State(test_state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn put_then_get_pool() {
        let state = test_state();
        let resp = put_pool(
            State(state.clone()),
            Path("p1".to_string()),
            Json(test_pool("p1", 2)),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = put_pool(
            State(state.clone()),
            Path("p1".to_string()),
            Json(test_pool("p1", 3)),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = get_pool(State(state.clone()), Path("p1".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(state.store.get_pool("p1").unwrap().unwrap().desired_vm_count, 3);
    }

    #[tokio::test]
    async fn put_pool_rejects_mismatched_id() {
        let resp = put_pool(
            State(test_state()),
            Path("p2".to_string()),
            Json(test_pool("p1", 2)),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn put_pool_rejects_invalid_pool() {
        let mut pool = test_pool("p1", 2);
        pool.admin_credentials_ref = String::new();
        let resp = put_pool(State(test_state()), Path("p1".to_string()), Json(pool))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn put_pool_rejects_unbounded_count_and_blank_vm_size() {
        let state = test_state();
        let resp = put_pool(
            State(state.clone()),
            Path("p1".to_string()),
            Json(test_pool("p1", u32::MAX)),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let mut pool = test_pool("p1", 2);
        pool.vm_size = String::new();
        let resp = put_pool(State(state.clone()), Path("p1".to_string()), Json(pool))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.store.get_pool("p1").unwrap().is_none());
    }

    #[tokio::test]
    async fn get_nonexistent_pool() {
        let resp = get_pool(State(test_state()), Path("nope".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_pool_exists_then_not() {
        let state = test_state();
        state.store.put_pool(&test_pool("p1", 1)).unwrap();

        let resp = delete_pool(State(state.clone()), Path("p1".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = delete_pool(State(state), Path("p1".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
