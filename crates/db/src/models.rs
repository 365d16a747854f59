//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types live in the `engine` crate; the `TryFrom` impls below
//! translate between the two.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use engine::models::{
    ApprovalRecord, DocumentRef, WorkflowInstance, WorkflowNode, WorkflowTemplate,
};

use crate::DbError;

// ---------------------------------------------------------------------------
// workflow_templates
// ---------------------------------------------------------------------------

/// A persisted workflow template row. Nodes are embedded as one JSONB
/// document, so a template always round-trips as a unit.
#[derive(Debug, Clone, FromRow)]
pub struct TemplateRow {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub document_type: String,
    pub active: bool,
    pub nodes: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for WorkflowTemplate {
    type Error = DbError;

    fn try_from(row: TemplateRow) -> Result<Self, Self::Error> {
        let nodes: Vec<WorkflowNode> =
            serde_json::from_value(row.nodes).map_err(|e| DbError::Decode(e.to_string()))?;
        Ok(WorkflowTemplate {
            id: row.id,
            name: row.name,
            code: row.code,
            document_type: row.document_type,
            active: row.active,
            nodes,
            created_at: row.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// workflow_instances
// ---------------------------------------------------------------------------

/// A persisted workflow instance row.
#[derive(Debug, Clone, FromRow)]
pub struct InstanceRow {
    pub id: Uuid,
    pub template_id: Uuid,
    pub instance_no: String,
    pub document_type: String,
    pub document_id: String,
    pub document_number: Option<String>,
    pub status: String,
    pub current_node_id: Option<String>,
    pub initiator: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub remark: Option<String>,
    pub version: i64,
}

impl TryFrom<InstanceRow> for WorkflowInstance {
    type Error = DbError;

    fn try_from(row: InstanceRow) -> Result<Self, Self::Error> {
        Ok(WorkflowInstance {
            id: row.id,
            template_id: row.template_id,
            instance_no: row.instance_no,
            document: DocumentRef {
                doc_type: row.document_type,
                doc_id: row.document_id,
                doc_number: row.document_number,
            },
            status: row.status.parse().map_err(DbError::Decode)?,
            current_node_id: row.current_node_id,
            initiator: row.initiator,
            started_at: row.started_at,
            finished_at: row.finished_at,
            remark: row.remark,
            version: row.version,
        })
    }
}

// ---------------------------------------------------------------------------
// approval_records
// ---------------------------------------------------------------------------

/// A persisted approval record row.
#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub node_id: String,
    pub actor: String,
    pub action: String,
    pub status: String,
    pub comment: Option<String>,
    pub transfer_to: Option<String>,
    pub acted_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for ApprovalRecord {
    type Error = DbError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        Ok(ApprovalRecord {
            id: row.id,
            instance_id: row.instance_id,
            node_id: row.node_id,
            actor: row.actor,
            action: row.action.parse().map_err(DbError::Decode)?,
            status: row.status.parse().map_err(DbError::Decode)?,
            comment: row.comment,
            transfer_to: row.transfer_to,
            acted_at: row.acted_at,
        })
    }
}
