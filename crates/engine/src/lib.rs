//! `engine` crate — core domain models, template validation, and the
//! approval-workflow engine.

pub mod engine;
pub mod error;
pub mod models;
pub mod store;
pub mod template;

pub use engine::{ApprovalEngine, CompletionListener, EngineConfig, InstanceHistory};
pub use error::EngineError;
pub use models::{
    Actor, ApprovalAction, ApprovalRecord, ApprovalStrategy, ApproverRule, ConditionExpr,
    DocumentRef, InstanceStatus, NodeKind, WorkflowInstance, WorkflowNode, WorkflowTemplate,
};
pub use store::{MemoryStore, StoreError, WorkflowStore};
pub use template::validate_template;

#[cfg(test)]
mod engine_tests;
