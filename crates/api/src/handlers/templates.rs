use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use engine::models::{WorkflowNode, WorkflowTemplate};
use engine::store::StoreError;
use engine::validate_template;

use super::{engine_error_status, store_error_status, AppState};

#[derive(serde::Deserialize)]
pub struct CreateTemplateDto {
    pub name: String,
    pub code: String,
    pub document_type: String,
    pub nodes: Vec<WorkflowNode>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<CreateTemplateDto>,
) -> Result<(StatusCode, Json<WorkflowTemplate>), StatusCode> {
    let template = WorkflowTemplate::new(
        payload.name,
        payload.code,
        payload.document_type,
        payload.nodes,
    );

    // Malformed definitions never reach the store.
    validate_template(&template).map_err(|e| engine_error_status(&e))?;

    match state.store.insert_template(&template).await {
        Ok(()) => Ok((StatusCode::CREATED, Json(template))),
        Err(e) => Err(store_error_status(&e)),
    }
}

pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkflowTemplate>>, StatusCode> {
    match state.store.list_templates().await {
        Ok(templates) => Ok(Json(templates)),
        Err(e) => Err(store_error_status(&e)),
    }
}

pub async fn get(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<WorkflowTemplate>, StatusCode> {
    match state.store.fetch_template(id).await {
        Ok(Some(template)) => Ok(Json(template)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => Err(store_error_status(&e)),
    }
}

pub async fn remove(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, StatusCode> {
    match state.store.delete_template(id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(StoreError::NotFound) => Err(StatusCode::NOT_FOUND),
        Err(StoreError::TemplateInUse) => Err(StatusCode::CONFLICT),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
