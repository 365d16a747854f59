//! Request handlers and the shared application state.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use engine::store::{StoreError, WorkflowStore};
use engine::{ApprovalEngine, EngineError};

pub mod approvals;
pub mod instances;
pub mod templates;

/// Shared state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ApprovalEngine>,
    /// Template CRUD goes straight to the store; templates carry no
    /// engine behaviour.
    pub store: Arc<dyn WorkflowStore>,
}

/// Build the full API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/templates",
            post(templates::create).get(templates::list),
        )
        .route(
            "/api/v1/templates/:id",
            get(templates::get).delete(templates::remove),
        )
        .route("/api/v1/workflows", post(instances::start))
        .route("/api/v1/instances/:id/approve", post(instances::approve))
        .route("/api/v1/instances/:id/reject", post(instances::reject))
        .route("/api/v1/instances/:id/history", get(instances::history))
        .route("/api/v1/approvals/pending", get(approvals::pending))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Map engine errors onto HTTP status codes.
pub(crate) fn engine_error_status(err: &EngineError) -> StatusCode {
    match err {
        EngineError::TemplateNotFound(_) | EngineError::InstanceNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        EngineError::TemplateInactive(_)
        | EngineError::MalformedTemplate { .. }
        | EngineError::DuplicateNodeId(_)
        | EngineError::UnknownEdgeTarget { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::InstanceNotPending { .. } | EngineError::NoCurrentNode(_) => {
            StatusCode::CONFLICT
        }
        EngineError::Store(store_err) => store_error_status(store_err),
    }
}

pub(crate) fn store_error_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound => StatusCode::NOT_FOUND,
        StoreError::TemplateInUse | StoreError::VersionConflict => StatusCode::CONFLICT,
        StoreError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
