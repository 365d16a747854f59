use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use engine::models::{Actor, DocumentRef, WorkflowInstance};
use engine::InstanceHistory;

use super::{engine_error_status, AppState};

#[derive(serde::Deserialize)]
pub struct StartWorkflowDto {
    pub template_id: Uuid,
    pub document_type: String,
    pub document_id: String,
    pub document_number: Option<String>,
    /// Caller identity; authentication is the gateway's concern.
    pub initiator: String,
    pub remark: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct ActionDto {
    pub actor: Actor,
    pub comment: Option<String>,
}

pub async fn start(
    State(state): State<AppState>,
    Json(payload): Json<StartWorkflowDto>,
) -> Result<(StatusCode, Json<WorkflowInstance>), StatusCode> {
    let document = DocumentRef {
        doc_type: payload.document_type,
        doc_id: payload.document_id,
        doc_number: payload.document_number,
    };

    match state
        .engine
        .start_workflow(payload.template_id, document, &payload.initiator, payload.remark)
        .await
    {
        Ok(instance) => Ok((StatusCode::CREATED, Json(instance))),
        Err(e) => Err(engine_error_status(&e)),
    }
}

pub async fn approve(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ActionDto>,
) -> Result<Json<WorkflowInstance>, StatusCode> {
    match state.engine.approve(id, &payload.actor, payload.comment).await {
        Ok(instance) => Ok(Json(instance)),
        Err(e) => Err(engine_error_status(&e)),
    }
}

pub async fn reject(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ActionDto>,
) -> Result<Json<WorkflowInstance>, StatusCode> {
    match state.engine.reject(id, &payload.actor, payload.comment).await {
        Ok(instance) => Ok(Json(instance)),
        Err(e) => Err(engine_error_status(&e)),
    }
}

pub async fn history(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<InstanceHistory>, StatusCode> {
    match state.engine.get_history(id).await {
        Ok(history) => Ok(Json(history)),
        Err(e) => Err(engine_error_status(&e)),
    }
}
