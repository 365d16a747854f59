//! Instance repository functions, including the atomic transition commit.

use sqlx::PgPool;
use uuid::Uuid;

use engine::models::{ApprovalRecord, InstanceStatus, WorkflowInstance};

use crate::repository::records;
use crate::{models::InstanceRow, DbError};

const INSTANCE_COLUMNS: &str = "id, template_id, instance_no, document_type, document_id, \
     document_number, status, current_node_id, initiator, started_at, finished_at, remark, version";

/// Persist a freshly started instance.
pub async fn create_instance(pool: &PgPool, instance: &WorkflowInstance) -> Result<(), DbError> {
    sqlx::query(
        r#"
        INSERT INTO workflow_instances
            (id, template_id, instance_no, document_type, document_id, document_number,
             status, current_node_id, initiator, started_at, finished_at, remark, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(instance.id)
    .bind(instance.template_id)
    .bind(&instance.instance_no)
    .bind(&instance.document.doc_type)
    .bind(&instance.document.doc_id)
    .bind(&instance.document.doc_number)
    .bind(instance.status.to_string())
    .bind(&instance.current_node_id)
    .bind(&instance.initiator)
    .bind(instance.started_at)
    .bind(instance.finished_at)
    .bind(&instance.remark)
    .bind(instance.version)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single instance by its primary key.
pub async fn get_instance(pool: &PgPool, id: Uuid) -> Result<WorkflowInstance, DbError> {
    let row: InstanceRow = sqlx::query_as(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM workflow_instances WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    row.try_into()
}

/// Atomically persist a transitioned instance and append its audit
/// record (if any) in one transaction.
///
/// The UPDATE is guarded by `version = instance.version - 1`; zero rows
/// affected means another transition won the race and the call fails
/// with `DbError::VersionConflict` without writing anything.
pub async fn commit_transition(
    pool: &PgPool,
    instance: &WorkflowInstance,
    record: Option<&ApprovalRecord>,
) -> Result<(), DbError> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE workflow_instances
        SET status = $1, current_node_id = $2, finished_at = $3, remark = $4, version = $5
        WHERE id = $6 AND version = $7
        "#,
    )
    .bind(instance.status.to_string())
    .bind(&instance.current_node_id)
    .bind(instance.finished_at)
    .bind(&instance.remark)
    .bind(instance.version)
    .bind(instance.id)
    .bind(instance.version - 1)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::VersionConflict);
    }

    if let Some(record) = record {
        records::insert_record(&mut *tx, record).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// All instances currently in `pending` status, oldest first.
pub async fn list_pending_instances(pool: &PgPool) -> Result<Vec<WorkflowInstance>, DbError> {
    let rows: Vec<InstanceRow> = sqlx::query_as(&format!(
        "SELECT {INSTANCE_COLUMNS} FROM workflow_instances WHERE status = $1 ORDER BY started_at ASC"
    ))
    .bind(InstanceStatus::Pending.to_string())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

/// True when the user initiated at least one instance of the template.
pub async fn has_instance_initiated_by(
    pool: &PgPool,
    template_id: Uuid,
    user_id: &str,
) -> Result<bool, DbError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM workflow_instances WHERE template_id = $1 AND initiator = $2)",
    )
    .bind(template_id)
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

/// Next value of the instance-number sequence.
pub async fn next_instance_seq(pool: &PgPool) -> Result<u64, DbError> {
    let seq: i64 = sqlx::query_scalar("SELECT nextval('instance_seq')")
        .fetch_one(pool)
        .await?;
    Ok(seq as u64)
}
