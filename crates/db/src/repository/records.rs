//! Approval-record repository functions.
//!
//! Records are append-only: there is no update or delete here by design.

use sqlx::PgExecutor;
use uuid::Uuid;

use engine::models::ApprovalRecord;

use crate::{models::RecordRow, DbError};

/// Append one approval record.
///
/// Takes any executor so it can run inside the transition transaction
/// in `instances::commit_transition`.
pub async fn insert_record<'e, E>(executor: E, record: &ApprovalRecord) -> Result<(), DbError>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO approval_records
            (id, instance_id, node_id, actor, action, status, comment, transfer_to, acted_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(record.id)
    .bind(record.instance_id)
    .bind(&record.node_id)
    .bind(&record.actor)
    .bind(record.action.to_string())
    .bind(record.status.to_string())
    .bind(&record.comment)
    .bind(&record.transfer_to)
    .bind(record.acted_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Audit records for one instance, oldest first.
pub async fn records_for_instance(
    pool: &sqlx::PgPool,
    instance_id: Uuid,
) -> Result<Vec<ApprovalRecord>, DbError> {
    let rows: Vec<RecordRow> = sqlx::query_as(
        r#"
        SELECT id, instance_id, node_id, actor, action, status, comment, transfer_to, acted_at
        FROM approval_records
        WHERE instance_id = $1
        ORDER BY acted_at ASC
        "#,
    )
    .bind(instance_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}
