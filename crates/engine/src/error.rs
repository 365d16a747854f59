//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::models::InstanceStatus;
use crate::store::StoreError;

/// Errors produced by the approval engine (template validation + transitions).
///
/// All variants are permanent business outcomes — retrying without an
/// external state change cannot succeed, so callers translate these into
/// user-facing messages and stop.
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Template errors ------

    /// No template exists with the given id.
    #[error("template '{0}' not found")]
    TemplateNotFound(Uuid),

    /// The template's active flag is false; no new instances may start.
    #[error("template '{0}' is inactive")]
    TemplateInactive(Uuid),

    /// The template cannot drive a workflow (no start node, or its
    /// non-approval subgraph loops).
    #[error("template '{template_id}' is malformed: {reason}")]
    MalformedTemplate {
        template_id: Uuid,
        reason: String,
    },

    /// Two or more nodes share the same ID.
    #[error("duplicate node id '{0}' in template")]
    DuplicateNodeId(String),

    /// A node's edge references a node id that doesn't exist in the template.
    #[error("node '{node_id}' has an edge to unknown node '{target}'")]
    UnknownEdgeTarget {
        node_id: String,
        target: String,
    },

    // ------ Instance errors ------

    /// No instance exists with the given id.
    #[error("instance '{0}' not found")]
    InstanceNotFound(Uuid),

    /// An approve/reject was attempted on a terminal instance.
    #[error("instance '{instance_id}' is not pending (status: {status})")]
    InstanceNotPending {
        instance_id: Uuid,
        status: InstanceStatus,
    },

    /// The instance has no current node to act on.
    #[error("instance '{0}' has no current node")]
    NoCurrentNode(Uuid),

    /// Persistence error from the backing store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
