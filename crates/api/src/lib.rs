//! `api` crate — HTTP REST layer over the approval engine.
//!
//! Exposes:
//!   POST   /api/v1/templates
//!   GET    /api/v1/templates
//!   GET    /api/v1/templates/{id}
//!   DELETE /api/v1/templates/{id}
//!   POST   /api/v1/workflows                  (start a workflow instance)
//!   POST   /api/v1/instances/{id}/approve
//!   POST   /api/v1/instances/{id}/reject
//!   GET    /api/v1/instances/{id}/history
//!   GET    /api/v1/approvals/pending

pub mod handlers;

pub use handlers::{router, AppState};

/// Bind and serve the API until the process is stopped.
pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("API listening on {bind}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
