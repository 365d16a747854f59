//! Integration tests for the approval engine.
//!
//! These run against `MemoryStore`, so no real Postgres connection is
//! required; the Postgres backend implements the same `WorkflowStore`
//! contract and is exercised by the `db` crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::engine::{ApprovalEngine, CompletionListener, EngineConfig};
use crate::models::{
    Actor, ApprovalAction, ApproverRule, DocumentRef, InstanceStatus, NodeKind, WorkflowInstance,
    WorkflowNode, WorkflowTemplate,
};
use crate::store::{MemoryStore, StoreError, WorkflowStore};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn node(id: &str, kind: NodeKind, sequence: u32, edges: &[&str]) -> WorkflowNode {
    WorkflowNode {
        id: id.to_string(),
        name: id.to_string(),
        kind,
        sequence,
        strategy: Default::default(),
        approvers: Default::default(),
        condition: None,
        edges: edges.iter().map(|e| e.to_string()).collect(),
        timeout_hours: None,
        required: false,
    }
}

fn approval_node(id: &str, sequence: u32, edges: &[&str], users: &[&str]) -> WorkflowNode {
    let mut n = node(id, NodeKind::Approval, sequence, edges);
    n.approvers = ApproverRule {
        users: users.iter().map(|u| u.to_string()).collect(),
        roles: Vec::new(),
        departments: Vec::new(),
    };
    n
}

fn doc(id: &str) -> DocumentRef {
    DocumentRef {
        doc_type: "purchase_order".into(),
        doc_id: id.into(),
        doc_number: Some(format!("PO-{id}")),
    }
}

/// Build an engine over a fresh MemoryStore with one template installed.
async fn setup(nodes: Vec<WorkflowNode>) -> (ApprovalEngine, Arc<MemoryStore>, uuid::Uuid) {
    let store = Arc::new(MemoryStore::new());
    let template = WorkflowTemplate::new("po approval", "po-approval", "purchase_order", nodes);
    let template_id = template.id;
    store.insert_template(&template).await.unwrap();
    let engine = ApprovalEngine::new(store.clone());
    (engine, store, template_id)
}

/// start -> approval -> end, gated on the given users.
fn gated_nodes(users: &[&str]) -> Vec<WorkflowNode> {
    vec![
        node("start", NodeKind::Start, 1, &["gate"]),
        approval_node("gate", 2, &["end"], users),
        node("end", NodeKind::End, 3, &[]),
    ]
}

// ---------------------------------------------------------------------------
// start_workflow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_to_end_template_completes_immediately() {
    let (engine, store, template_id) = setup(vec![
        node("start", NodeKind::Start, 1, &["end"]),
        node("end", NodeKind::End, 2, &[]),
    ])
    .await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();

    assert_eq!(instance.status, InstanceStatus::Approved);
    assert!(instance.finished_at.is_some());

    // No approver acted, so the audit trail is empty.
    let records = store.records_for_instance(instance.id).await.unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn start_parks_at_first_approval_node() {
    let (engine, _store, template_id) = setup(gated_nodes(&["bob"])).await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();

    assert_eq!(instance.status, InstanceStatus::Pending);
    assert_eq!(instance.current_node_id.as_deref(), Some("gate"));
    assert!(instance.finished_at.is_none());
}

#[tokio::test]
async fn start_auto_advances_past_condition_nodes() {
    let (engine, _store, template_id) = setup(vec![
        node("start", NodeKind::Start, 1, &["cond"]),
        node("cond", NodeKind::Condition, 2, &["gate"]),
        approval_node("gate", 3, &["end"], &["bob"]),
        node("end", NodeKind::End, 4, &[]),
    ])
    .await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();

    assert_eq!(instance.status, InstanceStatus::Pending);
    assert_eq!(instance.current_node_id.as_deref(), Some("gate"));
}

#[tokio::test]
async fn inactive_template_cannot_start() {
    let store = Arc::new(MemoryStore::new());
    let mut template = WorkflowTemplate::new("t", "t", "purchase_order", gated_nodes(&["bob"]));
    template.active = false;
    let template_id = template.id;
    store.insert_template(&template).await.unwrap();

    let engine = ApprovalEngine::new(store);
    let err = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TemplateInactive(id) if id == template_id));
}

#[tokio::test]
async fn template_without_start_node_is_rejected_at_start() {
    // Insert directly through the store: validation at creation time is
    // the API layer's job, the engine must still fail safely.
    let (engine, _store, template_id) =
        setup(vec![approval_node("gate", 1, &[], &["bob"])]).await;

    let err = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedTemplate { .. }));
}

#[tokio::test]
async fn unknown_template_fails_with_not_found() {
    let engine = ApprovalEngine::new(Arc::new(MemoryStore::new()));
    let missing = uuid::Uuid::new_v4();
    let err = engine
        .start_workflow(missing, doc("d1"), "alice", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TemplateNotFound(id) if id == missing));
}

#[tokio::test]
async fn two_starts_for_same_document_are_independent() {
    let (engine, _store, template_id) = setup(gated_nodes(&["bob"])).await;

    let first = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();
    let second = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_ne!(first.instance_no, second.instance_no);
    assert_eq!(first.document, second.document);
}

// ---------------------------------------------------------------------------
// approve
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_approve_completes_gated_workflow() {
    let (engine, store, template_id) = setup(gated_nodes(&["bob"])).await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();

    let approved = engine
        .approve(instance.id, &Actor::user("bob"), Some("looks good".into()))
        .await
        .unwrap();

    assert_eq!(approved.status, InstanceStatus::Approved);
    assert!(approved.finished_at.is_some());

    let records = store.records_for_instance(instance.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, ApprovalAction::Approve);
    assert_eq!(records[0].status, InstanceStatus::Approved);
    assert_eq!(records[0].node_id, "gate");
    assert_eq!(records[0].actor, "bob");
    assert_eq!(records[0].comment.as_deref(), Some("looks good"));
}

#[tokio::test]
async fn approve_moves_to_next_approval_gate() {
    let (engine, _store, template_id) = setup(vec![
        node("start", NodeKind::Start, 1, &["first"]),
        approval_node("first", 2, &["second"], &["bob"]),
        approval_node("second", 3, &["end"], &["carol"]),
        node("end", NodeKind::End, 4, &[]),
    ])
    .await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();
    assert_eq!(instance.current_node_id.as_deref(), Some("first"));

    let after = engine
        .approve(instance.id, &Actor::user("bob"), None)
        .await
        .unwrap();
    assert_eq!(after.status, InstanceStatus::Pending);
    assert_eq!(after.current_node_id.as_deref(), Some("second"));
}

#[tokio::test]
async fn approve_does_not_check_the_approver_rule() {
    // Reference behaviour: any authenticated caller may approve, the
    // rule only drives the pending-approvals listing.
    let (engine, _store, template_id) = setup(gated_nodes(&["bob"])).await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();

    let approved = engine
        .approve(instance.id, &Actor::user("mallory"), None)
        .await
        .unwrap();
    assert_eq!(approved.status, InstanceStatus::Approved);
}

#[tokio::test]
async fn empty_edge_list_terminates_as_approved() {
    let (engine, _store, template_id) = setup(vec![
        node("start", NodeKind::Start, 1, &["gate"]),
        approval_node("gate", 2, &[], &["bob"]),
    ])
    .await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();
    let approved = engine
        .approve(instance.id, &Actor::user("bob"), None)
        .await
        .unwrap();

    assert_eq!(approved.status, InstanceStatus::Approved);
    assert!(approved.finished_at.is_some());
}

#[tokio::test]
async fn dangling_edge_terminates_as_approved() {
    let (engine, _store, template_id) = setup(vec![
        node("start", NodeKind::Start, 1, &["gate"]),
        approval_node("gate", 2, &["ghost"], &["bob"]),
    ])
    .await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();
    let approved = engine
        .approve(instance.id, &Actor::user("bob"), None)
        .await
        .unwrap();

    assert_eq!(approved.status, InstanceStatus::Approved);
}

#[tokio::test]
async fn only_the_first_edge_is_ever_taken() {
    // 'gate' lists two successors; the second (another approval node)
    // must never be reached regardless of what a condition would say.
    let (engine, _store, template_id) = setup(vec![
        node("start", NodeKind::Start, 1, &["gate"]),
        approval_node("gate", 2, &["end", "second"], &["bob"]),
        approval_node("second", 3, &["end"], &["carol"]),
        node("end", NodeKind::End, 4, &[]),
    ])
    .await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();
    let approved = engine
        .approve(instance.id, &Actor::user("bob"), None)
        .await
        .unwrap();

    assert_eq!(approved.status, InstanceStatus::Approved);
    assert_eq!(approved.current_node_id.as_deref(), Some("end"));
}

#[tokio::test]
async fn non_approval_cycle_is_reported_as_malformed() {
    let (engine, _store, template_id) = setup(vec![
        node("start", NodeKind::Start, 1, &["c1"]),
        node("c1", NodeKind::Condition, 2, &["c2"]),
        node("c2", NodeKind::Condition, 3, &["c1"]),
    ])
    .await;

    let err = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MalformedTemplate { .. }));
}

// ---------------------------------------------------------------------------
// reject
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reject_terminates_without_advancing() {
    let (engine, store, template_id) = setup(gated_nodes(&["bob"])).await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();

    let rejected = engine
        .reject(instance.id, &Actor::user("bob"), Some("price too high".into()))
        .await
        .unwrap();

    assert_eq!(rejected.status, InstanceStatus::Rejected);
    assert!(rejected.finished_at.is_some());
    // Rejection never advances: the instance stays parked where it was.
    assert_eq!(rejected.current_node_id.as_deref(), Some("gate"));

    let records = store.records_for_instance(instance.id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, ApprovalAction::Reject);
    assert_eq!(records[0].status, InstanceStatus::Rejected);
}

#[tokio::test]
async fn actions_on_terminal_instances_fail_without_new_records() {
    let (engine, store, template_id) = setup(gated_nodes(&["bob"])).await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();
    engine
        .reject(instance.id, &Actor::user("bob"), None)
        .await
        .unwrap();

    let approve_err = engine
        .approve(instance.id, &Actor::user("bob"), None)
        .await
        .unwrap_err();
    assert!(matches!(
        approve_err,
        EngineError::InstanceNotPending { status: InstanceStatus::Rejected, .. }
    ));

    let reject_err = engine
        .reject(instance.id, &Actor::user("bob"), None)
        .await
        .unwrap_err();
    assert!(matches!(reject_err, EngineError::InstanceNotPending { .. }));

    // Still exactly one record from the original rejection.
    let records = store.records_for_instance(instance.id).await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn unknown_instance_fails_with_not_found() {
    let engine = ApprovalEngine::new(Arc::new(MemoryStore::new()));
    let missing = uuid::Uuid::new_v4();
    let err = engine
        .approve(missing, &Actor::user("bob"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InstanceNotFound(id) if id == missing));
}

// ---------------------------------------------------------------------------
// concurrency: version compare-and-swap
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_transition_fails_with_version_conflict() {
    let (engine, store, template_id) = setup(gated_nodes(&["bob"])).await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();

    // Snapshot before the first approve — this is the "second concurrent
    // caller" that passed the pending check on the same version.
    let mut stale = store.fetch_instance(instance.id).await.unwrap().unwrap();

    engine
        .approve(instance.id, &Actor::user("bob"), None)
        .await
        .unwrap();

    stale.version += 1;
    let err = store.commit_transition(&stale, None).await.unwrap_err();
    assert!(matches!(err, StoreError::VersionConflict));
}

// ---------------------------------------------------------------------------
// pending approvals
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_approvals_match_on_user_role_and_department() {
    let store = Arc::new(MemoryStore::new());
    let mut gate = approval_node("gate", 2, &["end"], &["bob"]);
    gate.approvers.roles = vec!["buyer".into()];
    gate.approvers.departments = vec!["procurement".into()];

    let template = WorkflowTemplate::new(
        "t",
        "t",
        "purchase_order",
        vec![
            node("start", NodeKind::Start, 1, &["gate"]),
            gate,
            node("end", NodeKind::End, 3, &[]),
        ],
    );
    let template_id = template.id;
    store.insert_template(&template).await.unwrap();
    let engine = ApprovalEngine::new(store);

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();

    // Direct user membership.
    let by_user = engine
        .list_pending_approvals(&Actor::user("bob"))
        .await
        .unwrap();
    assert_eq!(by_user.len(), 1);
    assert_eq!(by_user[0].id, instance.id);

    // Role membership.
    let buyer = Actor {
        user_id: "dave".into(),
        roles: vec!["buyer".into()],
        departments: Vec::new(),
    };
    assert_eq!(engine.list_pending_approvals(&buyer).await.unwrap().len(), 1);

    // Department membership.
    let clerk = Actor {
        user_id: "erin".into(),
        roles: Vec::new(),
        departments: vec!["procurement".into()],
    };
    assert_eq!(engine.list_pending_approvals(&clerk).await.unwrap().len(), 1);

    // No membership at all.
    assert!(engine
        .list_pending_approvals(&Actor::user("mallory"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn terminal_instances_never_show_as_pending() {
    let (engine, _store, template_id) = setup(gated_nodes(&["bob"])).await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();
    engine
        .approve(instance.id, &Actor::user("bob"), None)
        .await
        .unwrap();

    assert!(engine
        .list_pending_approvals(&Actor::user("bob"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn legacy_initiator_visibility_is_off_by_default() {
    let (engine, _store, template_id) = setup(gated_nodes(&["bob"])).await;

    // alice initiated her own instance earlier...
    engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();
    // ...and someone else's instance of the same template is pending.
    engine
        .start_workflow(template_id, doc("d2"), "frank", None)
        .await
        .unwrap();

    // alice is no approver, so she sees nothing.
    assert!(engine
        .list_pending_approvals(&Actor::user("alice"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn legacy_initiator_visibility_surfaces_template_wide_instances() {
    let store = Arc::new(MemoryStore::new());
    let template =
        WorkflowTemplate::new("t", "t", "purchase_order", gated_nodes(&["bob"]));
    let template_id = template.id;
    store.insert_template(&template).await.unwrap();

    let engine = ApprovalEngine::with_config(
        store,
        EngineConfig {
            legacy_initiator_visibility: true,
        },
    );

    engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();
    engine
        .start_workflow(template_id, doc("d2"), "frank", None)
        .await
        .unwrap();

    // With the legacy rule on, alice sees every pending instance of the
    // template — including frank's.
    let visible = engine
        .list_pending_approvals(&Actor::user("alice"))
        .await
        .unwrap();
    assert_eq!(visible.len(), 2);
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_returns_instance_and_records_in_order() {
    let (engine, _store, template_id) = setup(vec![
        node("start", NodeKind::Start, 1, &["first"]),
        approval_node("first", 2, &["second"], &["bob"]),
        approval_node("second", 3, &["end"], &["carol"]),
        node("end", NodeKind::End, 4, &[]),
    ])
    .await;

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();
    engine
        .approve(instance.id, &Actor::user("bob"), None)
        .await
        .unwrap();
    engine
        .approve(instance.id, &Actor::user("carol"), None)
        .await
        .unwrap();

    let history = engine.get_history(instance.id).await.unwrap();
    assert_eq!(history.instance.status, InstanceStatus::Approved);
    assert_eq!(history.records.len(), 2);
    assert_eq!(history.records[0].actor, "bob");
    assert_eq!(history.records[0].node_id, "first");
    assert_eq!(history.records[1].actor, "carol");
    assert_eq!(history.records[1].node_id, "second");
}

// ---------------------------------------------------------------------------
// completion listeners
// ---------------------------------------------------------------------------

struct CountingListener {
    completions: AtomicUsize,
    last_status: Mutex<Option<InstanceStatus>>,
}

impl CountingListener {
    fn new() -> Self {
        Self {
            completions: AtomicUsize::new(0),
            last_status: Mutex::new(None),
        }
    }
}

#[async_trait]
impl CompletionListener for CountingListener {
    async fn on_completed(&self, instance: &WorkflowInstance) -> anyhow::Result<()> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        *self.last_status.lock().unwrap() = Some(instance.status);
        Ok(())
    }
}

#[tokio::test]
async fn listener_fires_once_per_terminal_transition() {
    let store = Arc::new(MemoryStore::new());
    let template =
        WorkflowTemplate::new("t", "t", "purchase_order", gated_nodes(&["bob"]));
    let template_id = template.id;
    store.insert_template(&template).await.unwrap();

    let listener = Arc::new(CountingListener::new());
    let mut engine = ApprovalEngine::new(store);
    engine.subscribe(listener.clone());

    let instance = engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();
    // Still pending: nothing fired.
    assert_eq!(listener.completions.load(Ordering::SeqCst), 0);

    engine
        .approve(instance.id, &Actor::user("bob"), None)
        .await
        .unwrap();
    assert_eq!(listener.completions.load(Ordering::SeqCst), 1);
    assert_eq!(
        *listener.last_status.lock().unwrap(),
        Some(InstanceStatus::Approved)
    );
}

#[tokio::test]
async fn listener_fires_for_immediate_completion_and_rejection() {
    let store = Arc::new(MemoryStore::new());
    let auto = WorkflowTemplate::new(
        "auto",
        "auto",
        "purchase_order",
        vec![
            node("start", NodeKind::Start, 1, &["end"]),
            node("end", NodeKind::End, 2, &[]),
        ],
    );
    let gated = WorkflowTemplate::new("gated", "gated", "purchase_order", gated_nodes(&["bob"]));
    store.insert_template(&auto).await.unwrap();
    store.insert_template(&gated).await.unwrap();

    let listener = Arc::new(CountingListener::new());
    let mut engine = ApprovalEngine::new(store);
    engine.subscribe(listener.clone());

    // start -> end completes during start_workflow itself.
    engine
        .start_workflow(auto.id, doc("d1"), "alice", None)
        .await
        .unwrap();
    assert_eq!(listener.completions.load(Ordering::SeqCst), 1);

    let instance = engine
        .start_workflow(gated.id, doc("d2"), "alice", None)
        .await
        .unwrap();
    engine
        .reject(instance.id, &Actor::user("bob"), None)
        .await
        .unwrap();
    assert_eq!(listener.completions.load(Ordering::SeqCst), 2);
    assert_eq!(
        *listener.last_status.lock().unwrap(),
        Some(InstanceStatus::Rejected)
    );
}

// ---------------------------------------------------------------------------
// template deletion guard (store-level)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn template_with_instances_cannot_be_deleted() {
    let (engine, store, template_id) = setup(gated_nodes(&["bob"])).await;

    engine
        .start_workflow(template_id, doc("d1"), "alice", None)
        .await
        .unwrap();

    let err = store.delete_template(template_id).await.unwrap_err();
    assert!(matches!(err, StoreError::TemplateInUse));
}

#[tokio::test]
async fn unused_template_can_be_deleted() {
    let (_engine, store, template_id) = setup(gated_nodes(&["bob"])).await;
    store.delete_template(template_id).await.unwrap();
    assert!(store.fetch_template(template_id).await.unwrap().is_none());
}
