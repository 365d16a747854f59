//! Template CRUD operations.

use sqlx::PgPool;
use uuid::Uuid;

use engine::models::WorkflowTemplate;

use crate::{models::TemplateRow, DbError};

const TEMPLATE_COLUMNS: &str = "id, name, code, document_type, active, nodes, created_at";

/// Insert a new template (nodes serialised into the JSONB column).
pub async fn create_template(pool: &PgPool, template: &WorkflowTemplate) -> Result<(), DbError> {
    let nodes =
        serde_json::to_value(&template.nodes).map_err(|e| DbError::Decode(e.to_string()))?;

    sqlx::query(
        r#"
        INSERT INTO workflow_templates (id, name, code, document_type, active, nodes, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(template.id)
    .bind(&template.name)
    .bind(&template.code)
    .bind(&template.document_type)
    .bind(template.active)
    .bind(nodes)
    .bind(template.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single template by its primary key.
pub async fn get_template(pool: &PgPool, id: Uuid) -> Result<WorkflowTemplate, DbError> {
    let row: TemplateRow = sqlx::query_as(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM workflow_templates WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    row.try_into()
}

/// Return all templates ordered by creation time (newest first).
pub async fn list_templates(pool: &PgPool) -> Result<Vec<WorkflowTemplate>, DbError> {
    let rows: Vec<TemplateRow> = sqlx::query_as(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM workflow_templates ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

/// Delete a template by its primary key.
///
/// Fails with `DbError::TemplateInUse` when any instance references the
/// template, and `DbError::NotFound` when no row was deleted. The check
/// and the delete run in one transaction.
pub async fn delete_template(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let in_use: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM workflow_instances WHERE template_id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
    if in_use {
        return Err(DbError::TemplateInUse);
    }

    let result = sqlx::query("DELETE FROM workflow_templates WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    tx.commit().await?;
    Ok(())
}
