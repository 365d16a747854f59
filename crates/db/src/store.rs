//! `PgStore` — the Postgres implementation of the engine's
//! `WorkflowStore` trait. Thin delegation onto the repository
//! functions; the atomicity guarantees live in the SQL.

use async_trait::async_trait;
use uuid::Uuid;

use engine::models::{ApprovalRecord, WorkflowInstance, WorkflowTemplate};
use engine::store::{StoreError, WorkflowStore};

use crate::repository::{instances, records, templates};
use crate::{DbError, DbPool};

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => StoreError::NotFound,
            DbError::TemplateInUse => StoreError::TemplateInUse,
            DbError::VersionConflict => StoreError::VersionConflict,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Postgres-backed workflow store.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl WorkflowStore for PgStore {
    async fn insert_template(&self, template: &WorkflowTemplate) -> Result<(), StoreError> {
        templates::create_template(&self.pool, template)
            .await
            .map_err(Into::into)
    }

    async fn fetch_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>, StoreError> {
        match templates::get_template(&self.pool, id).await {
            Ok(template) => Ok(Some(template)),
            Err(DbError::NotFound) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>, StoreError> {
        templates::list_templates(&self.pool).await.map_err(Into::into)
    }

    async fn delete_template(&self, id: Uuid) -> Result<(), StoreError> {
        templates::delete_template(&self.pool, id)
            .await
            .map_err(Into::into)
    }

    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        instances::create_instance(&self.pool, instance)
            .await
            .map_err(Into::into)
    }

    async fn fetch_instance(&self, id: Uuid) -> Result<Option<WorkflowInstance>, StoreError> {
        match instances::get_instance(&self.pool, id).await {
            Ok(instance) => Ok(Some(instance)),
            Err(DbError::NotFound) => Ok(None),
            Err(other) => Err(other.into()),
        }
    }

    async fn commit_transition(
        &self,
        instance: &WorkflowInstance,
        record: Option<&ApprovalRecord>,
    ) -> Result<(), StoreError> {
        instances::commit_transition(&self.pool, instance, record)
            .await
            .map_err(Into::into)
    }

    async fn list_pending_instances(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        instances::list_pending_instances(&self.pool)
            .await
            .map_err(Into::into)
    }

    async fn has_instance_initiated_by(
        &self,
        template_id: Uuid,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        instances::has_instance_initiated_by(&self.pool, template_id, user_id)
            .await
            .map_err(Into::into)
    }

    async fn records_for_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<ApprovalRecord>, StoreError> {
        records::records_for_instance(&self.pool, instance_id)
            .await
            .map_err(Into::into)
    }

    async fn next_instance_seq(&self) -> Result<u64, StoreError> {
        instances::next_instance_seq(&self.pool)
            .await
            .map_err(Into::into)
    }
}
