//! `MemoryStore` — an in-process `WorkflowStore` backend.
//!
//! Used by the engine's own tests and by tooling that validates
//! templates without a database. The whole state sits behind one mutex,
//! which also gives every call the atomicity `commit_transition`
//! requires.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{ApprovalRecord, InstanceStatus, WorkflowInstance, WorkflowTemplate};
use crate::store::{StoreError, WorkflowStore};

#[derive(Default)]
struct Inner {
    templates: HashMap<Uuid, WorkflowTemplate>,
    instances: HashMap<Uuid, WorkflowInstance>,
    records: HashMap<Uuid, Vec<ApprovalRecord>>,
    seq: u64,
}

/// In-memory store backend.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex means a panic mid-mutation in another test
        // thread; the state is unusable either way.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn insert_template(&self, template: &WorkflowTemplate) -> Result<(), StoreError> {
        self.lock().templates.insert(template.id, template.clone());
        Ok(())
    }

    async fn fetch_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>, StoreError> {
        Ok(self.lock().templates.get(&id).cloned())
    }

    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>, StoreError> {
        let mut templates: Vec<_> = self.lock().templates.values().cloned().collect();
        templates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(templates)
    }

    async fn delete_template(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.instances.values().any(|i| i.template_id == id) {
            return Err(StoreError::TemplateInUse);
        }
        inner
            .templates
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        self.lock().instances.insert(instance.id, instance.clone());
        Ok(())
    }

    async fn fetch_instance(&self, id: Uuid) -> Result<Option<WorkflowInstance>, StoreError> {
        Ok(self.lock().instances.get(&id).cloned())
    }

    async fn commit_transition(
        &self,
        instance: &WorkflowInstance,
        record: Option<&ApprovalRecord>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();

        let stored = inner
            .instances
            .get(&instance.id)
            .ok_or(StoreError::NotFound)?;
        if stored.version != instance.version - 1 {
            return Err(StoreError::VersionConflict);
        }

        inner.instances.insert(instance.id, instance.clone());
        if let Some(record) = record {
            inner
                .records
                .entry(record.instance_id)
                .or_default()
                .push(record.clone());
        }
        Ok(())
    }

    async fn list_pending_instances(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        let mut pending: Vec<_> = self
            .lock()
            .instances
            .values()
            .filter(|i| i.status == InstanceStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(pending)
    }

    async fn has_instance_initiated_by(
        &self,
        template_id: Uuid,
        user_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .instances
            .values()
            .any(|i| i.template_id == template_id && i.initiator == user_id))
    }

    async fn records_for_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<ApprovalRecord>, StoreError> {
        Ok(self
            .lock()
            .records
            .get(&instance_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn next_instance_seq(&self) -> Result<u64, StoreError> {
        let mut inner = self.lock();
        inner.seq += 1;
        Ok(inner.seq)
    }
}
