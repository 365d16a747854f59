use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use engine::models::{Actor, WorkflowInstance};

use super::{engine_error_status, AppState};

#[derive(serde::Deserialize)]
pub struct PendingQuery {
    pub user_id: String,
    /// Comma-separated role ids.
    pub roles: Option<String>,
    /// Comma-separated department ids.
    pub departments: Option<String>,
}

fn split_csv(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

pub async fn pending(
    Query(query): Query<PendingQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkflowInstance>>, StatusCode> {
    let actor = Actor {
        user_id: query.user_id,
        roles: split_csv(query.roles),
        departments: split_csv(query.departments),
    };

    match state.engine.list_pending_approvals(&actor).await {
        Ok(instances) => Ok(Json(instances)),
        Err(e) => Err(engine_error_status(&e)),
    }
}
