//! The `WorkflowStore` trait — the persistence contract of the engine.
//!
//! Defined here (in the engine crate) so both the engine and concrete
//! backends can import it without a circular dependency: the `db` crate
//! implements it over Postgres, [`memory::MemoryStore`] implements it
//! in-process for tests and tooling.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ApprovalRecord, WorkflowInstance, WorkflowTemplate};

pub mod memory;

pub use memory::MemoryStore;

/// Typed error surface of every store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested row does not exist.
    #[error("row not found")]
    NotFound,

    /// A template with live instances cannot be deleted.
    #[error("template has existing instances")]
    TemplateInUse,

    /// The compare-and-swap in `commit_transition` lost to a concurrent
    /// transition on the same instance.
    #[error("instance was modified concurrently")]
    VersionConflict,

    /// Anything backend-specific (connection loss, serialization, …).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Atomic persistence boundary for templates, instances, and records.
///
/// Every engine operation maps onto exactly one mutating call, so a
/// backend that makes each call atomic makes the whole operation atomic.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // ------ templates ------

    async fn insert_template(&self, template: &WorkflowTemplate) -> Result<(), StoreError>;

    async fn fetch_template(&self, id: Uuid) -> Result<Option<WorkflowTemplate>, StoreError>;

    async fn list_templates(&self) -> Result<Vec<WorkflowTemplate>, StoreError>;

    /// Delete a template. Fails with [`StoreError::TemplateInUse`] when
    /// any instance (live or finished) references it, and
    /// [`StoreError::NotFound`] when it does not exist.
    async fn delete_template(&self, id: Uuid) -> Result<(), StoreError>;

    // ------ instances ------

    /// Persist a freshly started instance (status may already be terminal
    /// if the template auto-completed during start).
    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

    async fn fetch_instance(&self, id: Uuid) -> Result<Option<WorkflowInstance>, StoreError>;

    /// Atomically persist a mutated instance and append the audit record
    /// (if any) in one unit.
    ///
    /// Guarded by a version compare-and-swap: the write only applies when
    /// the stored row still carries `instance.version - 1`; otherwise the
    /// call fails with [`StoreError::VersionConflict`] and nothing is
    /// written. This is what closes the concurrent double-approve race.
    async fn commit_transition(
        &self,
        instance: &WorkflowInstance,
        record: Option<&ApprovalRecord>,
    ) -> Result<(), StoreError>;

    /// All instances currently in `Pending` status.
    async fn list_pending_instances(&self) -> Result<Vec<WorkflowInstance>, StoreError>;

    /// True when `user_id` initiated at least one instance (of any status)
    /// of the given template. Backs the legacy initiator-visibility rule.
    async fn has_instance_initiated_by(
        &self,
        template_id: Uuid,
        user_id: &str,
    ) -> Result<bool, StoreError>;

    // ------ records ------

    /// Audit records for one instance, oldest first.
    async fn records_for_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<Vec<ApprovalRecord>, StoreError>;

    // ------ instance numbering ------

    /// Next value of the monotonic counter behind instance numbers.
    async fn next_instance_seq(&self) -> Result<u64, StoreError>;
}
