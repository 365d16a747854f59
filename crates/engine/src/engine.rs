//! The approval engine.
//!
//! `ApprovalEngine` is the central orchestrator:
//! 1. Starts an instance for an external document and auto-advances it
//!    past non-approval nodes to the first approval gate.
//! 2. Records approve/reject actions as append-only `ApprovalRecord`s.
//! 3. On approve, advances the instance; on reject, terminates it.
//! 4. Commits each transition atomically through `WorkflowStore`,
//!    guarded by a per-instance version compare-and-swap.
//! 5. Notifies registered `CompletionListener`s once an instance
//!    reaches a terminal status.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Actor, ApprovalAction, ApprovalRecord, DocumentRef, InstanceStatus, NodeKind,
    WorkflowInstance, WorkflowTemplate,
};
use crate::store::WorkflowStore;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Behaviour toggles for the engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// The reference system's pending-approval query also surfaced every
    /// pending instance of any template the user had *ever* initiated an
    /// instance of — a template-wide clause that shows approvers
    /// unrelated work. Kept available behind this flag for
    /// compatibility; off by default.
    pub legacy_initiator_visibility: bool,
}

// ---------------------------------------------------------------------------
// Completion notification
// ---------------------------------------------------------------------------

/// Integration contract for document modules.
///
/// The engine never mutates the document an instance was started for.
/// A document module that must react to the outcome (e.g. flip an order
/// to `approved`) registers a listener; `on_completed` fires after the
/// terminal transition has been committed. Listener errors are logged
/// and never roll the transition back.
#[async_trait]
pub trait CompletionListener: Send + Sync {
    async fn on_completed(&self, instance: &WorkflowInstance) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// An instance together with its full audit trail.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InstanceHistory {
    pub instance: WorkflowInstance,
    pub records: Vec<ApprovalRecord>,
}

// ---------------------------------------------------------------------------
// ApprovalEngine
// ---------------------------------------------------------------------------

/// Stateless orchestrator over a shared store.
///
/// Construct one per process and share it behind an `Arc`; distinct
/// instances are fully independent and may be processed concurrently.
pub struct ApprovalEngine {
    store: Arc<dyn WorkflowStore>,
    listeners: Vec<Arc<dyn CompletionListener>>,
    config: EngineConfig,
}

impl ApprovalEngine {
    /// Create a new engine with default configuration.
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<dyn WorkflowStore>, config: EngineConfig) -> Self {
        Self {
            store,
            listeners: Vec::new(),
            config,
        }
    }

    /// Register a completion listener. Must be called before the engine
    /// is shared.
    pub fn subscribe(&mut self, listener: Arc<dyn CompletionListener>) {
        self.listeners.push(listener);
    }

    /// Read access to the underlying store (template CRUD goes through
    /// it directly; templates carry no engine behaviour).
    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // start_workflow
    // -----------------------------------------------------------------------

    /// Start a workflow instance for an external document.
    ///
    /// The instance is created at the template's `start` node and
    /// immediately advanced, because a start node is never an approval
    /// gate. The returned instance may therefore already be terminal
    /// (e.g. for a `start -> end` template).
    ///
    /// # Errors
    /// - [`EngineError::TemplateNotFound`] / [`EngineError::TemplateInactive`]
    /// - [`EngineError::MalformedTemplate`] if the template has no start node.
    #[instrument(skip(self, document), fields(template_id = %template_id, initiator = %initiator))]
    pub async fn start_workflow(
        &self,
        template_id: Uuid,
        document: DocumentRef,
        initiator: &str,
        remark: Option<String>,
    ) -> Result<WorkflowInstance, EngineError> {
        let template = self
            .store
            .fetch_template(template_id)
            .await?
            .ok_or(EngineError::TemplateNotFound(template_id))?;

        if !template.active {
            return Err(EngineError::TemplateInactive(template_id));
        }

        let start = template
            .start_node()
            .ok_or_else(|| EngineError::MalformedTemplate {
                template_id,
                reason: "no start node".into(),
            })?;

        let seq = self.store.next_instance_seq().await?;
        let mut instance = WorkflowInstance {
            id: Uuid::new_v4(),
            template_id,
            instance_no: Self::make_instance_no(seq),
            document,
            status: InstanceStatus::Pending,
            current_node_id: Some(start.id.clone()),
            initiator: initiator.to_owned(),
            started_at: Utc::now(),
            finished_at: None,
            remark,
            version: 1,
        };

        Self::advance(&template, &mut instance)?;

        self.store.insert_instance(&instance).await?;
        info!(
            instance_no = %instance.instance_no,
            status = %instance.status,
            "workflow instance started"
        );

        self.notify_if_completed(&instance).await;
        Ok(instance)
    }

    // -----------------------------------------------------------------------
    // approve / reject
    // -----------------------------------------------------------------------

    /// Record an approval at the instance's current node and advance it.
    ///
    /// The engine does not verify the actor against the node's approver
    /// rule — any authenticated caller may approve. Faithful to the
    /// reference behaviour; see DESIGN.md.
    #[instrument(skip(self, comment), fields(instance_id = %instance_id, actor = %actor.user_id))]
    pub async fn approve(
        &self,
        instance_id: Uuid,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<WorkflowInstance, EngineError> {
        let (mut instance, node_id) = self.load_pending(instance_id).await?;

        let template = self
            .store
            .fetch_template(instance.template_id)
            .await?
            .ok_or(EngineError::TemplateNotFound(instance.template_id))?;

        let record = ApprovalRecord {
            id: Uuid::new_v4(),
            instance_id,
            node_id,
            actor: actor.user_id.clone(),
            action: ApprovalAction::Approve,
            status: InstanceStatus::Approved,
            comment,
            transfer_to: None,
            acted_at: Utc::now(),
        };

        Self::advance(&template, &mut instance)?;
        instance.version += 1;

        self.store.commit_transition(&instance, Some(&record)).await?;
        info!(status = %instance.status, "approval recorded");

        self.notify_if_completed(&instance).await;
        Ok(instance)
    }

    /// Record a rejection and terminate the instance.
    ///
    /// Rejection is always terminal: the current node is left unchanged
    /// and no branch is evaluated.
    #[instrument(skip(self, comment), fields(instance_id = %instance_id, actor = %actor.user_id))]
    pub async fn reject(
        &self,
        instance_id: Uuid,
        actor: &Actor,
        comment: Option<String>,
    ) -> Result<WorkflowInstance, EngineError> {
        let (mut instance, node_id) = self.load_pending(instance_id).await?;

        let record = ApprovalRecord {
            id: Uuid::new_v4(),
            instance_id,
            node_id,
            actor: actor.user_id.clone(),
            action: ApprovalAction::Reject,
            status: InstanceStatus::Rejected,
            comment,
            transfer_to: None,
            acted_at: Utc::now(),
        };

        instance.status = InstanceStatus::Rejected;
        instance.finished_at = Some(Utc::now());
        instance.version += 1;

        self.store.commit_transition(&instance, Some(&record)).await?;
        info!("rejection recorded, instance terminated");

        self.notify_if_completed(&instance).await;
        Ok(instance)
    }

    /// Fetch an instance and check the approve/reject preconditions.
    async fn load_pending(
        &self,
        instance_id: Uuid,
    ) -> Result<(WorkflowInstance, String), EngineError> {
        let instance = self
            .store
            .fetch_instance(instance_id)
            .await?
            .ok_or(EngineError::InstanceNotFound(instance_id))?;

        if instance.status != InstanceStatus::Pending {
            return Err(EngineError::InstanceNotPending {
                instance_id,
                status: instance.status,
            });
        }

        let node_id = instance
            .current_node_id
            .clone()
            .ok_or(EngineError::NoCurrentNode(instance_id))?;

        Ok((instance, node_id))
    }

    // -----------------------------------------------------------------------
    // queries
    // -----------------------------------------------------------------------

    /// Every pending instance whose current node's approver rule matches
    /// the actor.
    ///
    /// With `legacy_initiator_visibility` enabled, additionally every
    /// pending instance of a template the actor has initiated *any*
    /// instance of (the reference system's broad OR-clause).
    pub async fn list_pending_approvals(
        &self,
        actor: &Actor,
    ) -> Result<Vec<WorkflowInstance>, EngineError> {
        let pending = self.store.list_pending_instances().await?;

        let mut templates: HashMap<Uuid, Option<WorkflowTemplate>> = HashMap::new();
        let mut out = Vec::new();

        for instance in pending {
            // Templates repeat across instances; fetch each once.
            if !templates.contains_key(&instance.template_id) {
                let template = self.store.fetch_template(instance.template_id).await?;
                templates.insert(instance.template_id, template);
            }

            let template = templates
                .get(&instance.template_id)
                .and_then(|t| t.as_ref());

            let Some(template) = template else {
                warn!(
                    instance_id = %instance.id,
                    template_id = %instance.template_id,
                    "pending instance references a missing template, skipping"
                );
                continue;
            };

            let rule_match = instance
                .current_node_id
                .as_deref()
                .and_then(|id| template.node(id))
                .map(|node| node.approvers.matches(actor))
                .unwrap_or(false);

            if rule_match || self.legacy_initiator_match(&instance, actor).await? {
                out.push(instance);
            }
        }

        Ok(out)
    }

    /// The isolated legacy rule: visible because the actor once initiated
    /// an instance of the same template (not necessarily this one).
    async fn legacy_initiator_match(
        &self,
        instance: &WorkflowInstance,
        actor: &Actor,
    ) -> Result<bool, EngineError> {
        if !self.config.legacy_initiator_visibility {
            return Ok(false);
        }
        Ok(self
            .store
            .has_instance_initiated_by(instance.template_id, &actor.user_id)
            .await?)
    }

    /// An instance together with its audit trail, oldest record first.
    pub async fn get_history(&self, instance_id: Uuid) -> Result<InstanceHistory, EngineError> {
        let instance = self
            .store
            .fetch_instance(instance_id)
            .await?
            .ok_or(EngineError::InstanceNotFound(instance_id))?;
        let records = self.store.records_for_instance(instance_id).await?;
        Ok(InstanceHistory { instance, records })
    }

    // -----------------------------------------------------------------------
    // Internal: the advance algorithm
    // -----------------------------------------------------------------------

    /// Move the instance forward from its current node until it parks at
    /// an approval gate or terminates.
    ///
    /// Traversal rules:
    /// - An `end` node, an empty edge list, or a dangling first edge all
    ///   complete the instance as `approved`.
    /// - Otherwise only `edges[0]` is followed — condition expressions
    ///   are never evaluated and later edges are never taken.
    /// - `start` and `condition` nodes are crossed without stopping;
    ///   only an `approval` node parks the instance.
    fn advance(
        template: &WorkflowTemplate,
        instance: &mut WorkflowInstance,
    ) -> Result<(), EngineError> {
        let mut hops = 0usize;

        loop {
            // A non-approval cycle would spin forever; more hops than the
            // template has nodes proves one exists.
            hops += 1;
            if hops > template.nodes.len() + 1 {
                return Err(EngineError::MalformedTemplate {
                    template_id: template.id,
                    reason: "auto-advance loop: non-approval nodes form a cycle".into(),
                });
            }

            let node_id = instance
                .current_node_id
                .clone()
                .ok_or(EngineError::NoCurrentNode(instance.id))?;

            // A current node that no longer resolves terminates the
            // instance instead of failing it.
            let Some(node) = template.node(&node_id) else {
                Self::complete(instance);
                return Ok(());
            };

            if node.kind == NodeKind::End {
                Self::complete(instance);
                return Ok(());
            }

            let Some(next_id) = node.edges.first() else {
                // Implicit completion: no explicit end node required.
                Self::complete(instance);
                return Ok(());
            };

            let Some(next) = template.node(next_id) else {
                Self::complete(instance);
                return Ok(());
            };

            instance.current_node_id = Some(next.id.clone());

            if next.kind == NodeKind::Approval {
                // Parked: wait for an approver.
                return Ok(());
            }
        }
    }

    fn complete(instance: &mut WorkflowInstance) {
        instance.status = InstanceStatus::Approved;
        instance.finished_at = Some(Utc::now());
    }

    // -----------------------------------------------------------------------
    // Internal: helpers
    // -----------------------------------------------------------------------

    /// Human-readable instance number: `AF-<date>-<seq>`.
    fn make_instance_no(seq: u64) -> String {
        format!("AF-{}-{:06}", Utc::now().format("%Y%m%d"), seq)
    }

    /// Fire completion listeners after a committed terminal transition.
    async fn notify_if_completed(&self, instance: &WorkflowInstance) {
        if !instance.status.is_terminal() {
            return;
        }
        for listener in &self.listeners {
            if let Err(err) = listener.on_completed(instance).await {
                // The transition is already committed; a failing listener
                // must not undo it.
                warn!(
                    instance_id = %instance.id,
                    error = %err,
                    "completion listener failed"
                );
            }
        }
    }
}
