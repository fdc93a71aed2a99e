//! poolgrid-api: REST API for poolgrid.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/pools` | List pools |
//! | GET | `/api/v1/pools/{id}` | Get a pool |
//! | PUT | `/api/v1/pools/{id}` | Create or replace a pool |
//! | DELETE | `/api/v1/pools/{id}` | Delete a pool |
//! | POST | `/api/v1/pools/{id}/runs` | Start a reconciliation run |
//! | GET | `/api/v1/runs` | List runs, optionally `?pool=` |
//! | GET | `/api/v1/runs/{id}` | Run phase and, once terminal, its report |
//! | GET | `/api/v1/runs/{id}/steps` | Recorded steps of a run |
//! | POST | `/api/v1/runs/{id}/replay` | Re-drive a run from its step log |
//! | POST | `/api/v1/runs/{id}/cancel` | Cancel an in-flight run |
//! | GET | `/healthz` | Liveness |

pub mod handlers;
pub mod run_handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use poolgrid_reconcile::Reconciler;
use poolgrid_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub reconciler: Arc<Reconciler>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/pools", get(handlers::list_pools))
        .route(
            "/pools/{id}",
            get(handlers::get_pool)
                .put(handlers::put_pool)
                .delete(handlers::delete_pool),
        )
        .route("/pools/{id}/runs", post(run_handlers::start_run))
        .route("/runs", get(run_handlers::list_runs))
        .route("/runs/{id}", get(run_handlers::get_run))
        .route("/runs/{id}/steps", get(run_handlers::list_run_steps))
        .route("/runs/{id}/replay", post(run_handlers::replay_run))
        .route("/runs/{id}/cancel", post(run_handlers::cancel_run))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz))
}
