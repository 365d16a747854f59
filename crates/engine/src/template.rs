//! Template validation — run this before persisting a new template.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the template.
//! 2. The template must contain at least one `start` node.
//! 3. Every outgoing edge must reference an existing node id.
//!
//! The runtime traversal is more forgiving than this (a dangling edge on
//! a live instance terminates the workflow instead of failing), but a
//! freshly authored template with a dangling edge is a mistake worth
//! rejecting up front.

use std::collections::HashSet;

use crate::{models::WorkflowTemplate, EngineError};

/// Validate a template definition.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an id.
/// - [`EngineError::MalformedTemplate`] if there is no `start` node.
/// - [`EngineError::UnknownEdgeTarget`] if an edge points at a missing node.
pub fn validate_template(template: &WorkflowTemplate) -> Result<(), EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &template.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. There must be a start node to create instances from
    // -----------------------------------------------------------------------
    if template.start_node().is_none() {
        return Err(EngineError::MalformedTemplate {
            template_id: template.id,
            reason: "no start node".into(),
        });
    }

    // -----------------------------------------------------------------------
    // 3. Validate edge targets
    // -----------------------------------------------------------------------
    let node_set: HashSet<&str> = template.nodes.iter().map(|n| n.id.as_str()).collect();
    for node in &template.nodes {
        for target in &node.edges {
            if !node_set.contains(target.as_str()) {
                return Err(EngineError::UnknownEdgeTarget {
                    node_id: node.id.clone(),
                    target: target.clone(),
                });
            }
        }
    }

    Ok(())
}
