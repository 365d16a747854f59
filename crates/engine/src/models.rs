//! Core domain models for the approval engine.
//!
//! These types are the source of truth for what a workflow looks like
//! in memory.  Templates (with their embedded nodes) serialise to/from
//! the JSONB `nodes` column of the `workflow_templates` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// WorkflowTemplate
// ---------------------------------------------------------------------------

/// A reusable definition of an approval process.
///
/// Templates are created once by an administrator and treated as
/// immutable afterwards; instances hold only the template id and
/// re-fetch the definition on every transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: Uuid,
    pub name: String,
    /// Unique, human-assigned template code (e.g. `"po-approval"`).
    pub code: String,
    /// Which kind of business document this template applies to.
    pub document_type: String,
    /// Inactive templates cannot start new instances.
    pub active: bool,
    /// Nodes owned by this template. Order in the vector is not
    /// significant; display order comes from `sequence`.
    pub nodes: Vec<WorkflowNode>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowTemplate {
    /// Convenience constructor for new, active templates.
    pub fn new(
        name: impl Into<String>,
        code: impl Into<String>,
        document_type: impl Into<String>,
        nodes: Vec<WorkflowNode>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            code: code.into(),
            document_type: document_type.into(),
            active: true,
            nodes,
            created_at: Utc::now(),
        }
    }

    /// Look up a node by its template-scoped id.
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// The first `Start` node, if the template has one.
    pub fn start_node(&self) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.kind == NodeKind::Start)
    }

    /// Nodes ordered by their display sequence.
    pub fn nodes_by_sequence(&self) -> Vec<&WorkflowNode> {
        let mut out: Vec<&WorkflowNode> = self.nodes.iter().collect();
        out.sort_by_key(|n| n.sequence);
        out
    }
}

// ---------------------------------------------------------------------------
// WorkflowNode
// ---------------------------------------------------------------------------

/// What a node does when an instance reaches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Entry point; never an approval gate.
    Start,
    /// The instance parks here until an approver acts.
    Approval,
    /// Carries a condition expression. The expression is stored but not
    /// evaluated; traversal always follows the first outgoing edge.
    Condition,
    /// Reaching this node completes the instance as approved.
    End,
}

/// How many approvers must act before an `Approval` node advances.
///
/// Stored for every node but not executed: a single approve call always
/// advances the node regardless of strategy (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStrategy {
    #[default]
    Single,
    All,
    Any,
}

/// Who may approve at a node. Any one membership qualifies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApproverRule {
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub departments: Vec<String>,
}

impl ApproverRule {
    /// True when the actor is named directly or belongs to any listed
    /// role or department.
    pub fn matches(&self, actor: &Actor) -> bool {
        self.users.iter().any(|u| u == &actor.user_id)
            || self.roles.iter().any(|r| actor.roles.contains(r))
            || self
                .departments
                .iter()
                .any(|d| actor.departments.contains(d))
    }
}

/// A field/operator/value triple attached to `Condition` nodes.
///
/// Declared in the schema, never evaluated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionExpr {
    pub field: String,
    pub op: String,
    pub value: serde_json::Value,
}

/// A single step in an approval template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique identifier within this template (referenced by edges).
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    /// Display/ordering hint only; traversal follows `edges`.
    pub sequence: u32,
    #[serde(default)]
    pub strategy: ApprovalStrategy,
    #[serde(default)]
    pub approvers: ApproverRule,
    #[serde(default)]
    pub condition: Option<ConditionExpr>,
    /// Ordered outgoing edges. An empty list means the workflow
    /// terminates here (implicit completion).
    #[serde(default)]
    pub edges: Vec<String>,
    /// Stored for escalation tooling; no scheduler enforces it.
    #[serde(default)]
    pub timeout_hours: Option<u32>,
    #[serde(default)]
    pub required: bool,
}

// ---------------------------------------------------------------------------
// DocumentRef
// ---------------------------------------------------------------------------

/// Opaque reference to the external business document an instance is
/// attached to. The engine never inspects or mutates the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Type discriminator (e.g. `"purchase_order"`).
    pub doc_type: String,
    /// Opaque id in the owning module's keyspace.
    pub doc_id: String,
    /// Optional human-readable number for display.
    pub doc_number: Option<String>,
}

// ---------------------------------------------------------------------------
// WorkflowInstance
// ---------------------------------------------------------------------------

/// Lifecycle states of a workflow instance.
///
/// `Cancelled` is declared for completeness but no engine operation
/// transitions into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl InstanceStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for InstanceStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending"   => Ok(Self::Pending),
            "approved"  => Ok(Self::Approved),
            "rejected"  => Ok(Self::Rejected),
            "cancelled" => Ok(Self::Cancelled),
            other       => Err(format!("unknown instance status: {other}")),
        }
    }
}

/// One live execution of a template against one external document.
///
/// Mutated only by the engine. `version` increases by one on every
/// committed transition and backs the compare-and-swap in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub template_id: Uuid,
    /// Generated, unique, human-readable number (e.g. `AF-20260823-000042`).
    pub instance_no: String,
    pub document: DocumentRef,
    pub status: InstanceStatus,
    /// Set for the whole `Pending` lifetime; retains the last visited
    /// node after completion. `None` only if the instance never started.
    pub current_node_id: Option<String>,
    pub initiator: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub remark: Option<String>,
    /// Optimistic-concurrency counter; see `WorkflowStore::commit_transition`.
    pub version: i64,
}

// ---------------------------------------------------------------------------
// ApprovalRecord
// ---------------------------------------------------------------------------

/// The action an approver took. Only `Approve` and `Reject` are produced
/// by the engine; `Transfer` and `Withdraw` are reserved in the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    Approve,
    Reject,
    Transfer,
    Withdraw,
}

impl std::fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve  => write!(f, "approve"),
            Self::Reject   => write!(f, "reject"),
            Self::Transfer => write!(f, "transfer"),
            Self::Withdraw => write!(f, "withdraw"),
        }
    }
}

impl std::str::FromStr for ApprovalAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve"  => Ok(Self::Approve),
            "reject"   => Ok(Self::Reject),
            "transfer" => Ok(Self::Transfer),
            "withdraw" => Ok(Self::Withdraw),
            other      => Err(format!("unknown approval action: {other}")),
        }
    }
}

/// Append-only audit entry for one approve/reject call.
///
/// Auto-advance through non-approval nodes produces no record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: Uuid,
    pub instance_id: Uuid,
    /// Node the instance was parked at when the action was taken.
    pub node_id: String,
    pub actor: String,
    pub action: ApprovalAction,
    /// Per-action resulting status (`Approved` for approve, `Rejected`
    /// for reject).
    pub status: InstanceStatus,
    pub comment: Option<String>,
    pub transfer_to: Option<String>,
    pub acted_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Caller identity as resolved by the (external) auth layer.
///
/// The engine never resolves role or department memberships itself; the
/// caller supplies them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub departments: Vec<String>,
}

impl Actor {
    /// An actor known only by user id (no role/department memberships).
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            user_id: id.into(),
            roles: Vec::new(),
            departments: Vec::new(),
        }
    }
}
