use crate::{Edge, Node, NodeData, NodeKind, Workflow};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Structural problems that make a graph unrunnable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Workflow must have exactly one start node (found {count})")]
    MissingStartNode { count: usize },

    #[error("Edge {edge_id} references missing node {node_id}")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Duplicate edge id: {0}")]
    DuplicateEdgeId(String),
}

/// Authoring-in-progress issues. Reported to the editor, never block a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LintWarning {
    #[error("Node '{0}' is not reachable from the start node")]
    Unreachable(String),

    #[error("Node '{0}' has no outgoing edge; the run stops there")]
    DeadEnd(String),

    #[error("End node '{0}' has outgoing edges that are never followed")]
    EdgeFromEnd(String),

    #[error("Start node '{0}' has incoming edges")]
    EdgeIntoStart(String),

    #[error("Node '{node}' has no edge for branch '{label}'")]
    MissingBranch { node: String, label: String },

    #[error("Node '{node}' has more than one edge labeled {label:?}; only the first is taken")]
    RedundantBranch { node: String, label: Option<String> },
}

/// Validate a node/edge set, returning the first problem found.
pub fn validate_graph(nodes: &[Node], edges: &[Edge]) -> Result<(), ValidationError> {
    match validate_all(nodes, edges).into_iter().next() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

pub fn validate_workflow(workflow: &Workflow) -> Result<(), ValidationError> {
    validate_graph(&workflow.nodes, &workflow.edges)
}

/// Collect every validation error, in a stable order: start node, duplicate
/// ids, then dangling edges.
///
/// Unreachable nodes are not errors.
pub fn validate_all(nodes: &[Node], edges: &[Edge]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let start_count = nodes.iter().filter(|n| n.kind() == NodeKind::Start).count();
    if start_count != 1 {
        errors.push(ValidationError::MissingStartNode { count: start_count });
    }

    let mut node_ids = HashSet::new();
    for node in nodes {
        if !node_ids.insert(node.id.as_str()) {
            errors.push(ValidationError::DuplicateNodeId(node.id.clone()));
        }
    }

    let mut edge_ids = HashSet::new();
    for edge in edges {
        if !edge_ids.insert(edge.id.as_str()) {
            errors.push(ValidationError::DuplicateEdgeId(edge.id.clone()));
        }
    }

    for edge in edges {
        for endpoint in [&edge.source, &edge.target] {
            if !node_ids.contains(endpoint.as_str()) {
                errors.push(ValidationError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
    }

    errors
}

/// Non-fatal graph checks for the editor's problems panel.
pub fn lint_workflow(workflow: &Workflow) -> Vec<LintWarning> {
    let mut warnings = Vec::new();

    let reachable = reachable_from_start(workflow);
    for node in &workflow.nodes {
        let outgoing = workflow.outgoing_edges(&node.id);
        let name = node.label().to_string();

        if reachable
            .as_ref()
            .is_some_and(|seen| !seen.contains(node.id.as_str()))
        {
            warnings.push(LintWarning::Unreachable(name.clone()));
        }

        match &node.data {
            NodeData::End => {
                if !outgoing.is_empty() {
                    warnings.push(LintWarning::EdgeFromEnd(name.clone()));
                }
                continue;
            }
            NodeData::Start => {
                if !workflow.incoming_edges(&node.id).is_empty() {
                    warnings.push(LintWarning::EdgeIntoStart(name.clone()));
                }
            }
            NodeData::Condition(_) => {
                for label in [crate::TRUE_LABEL, crate::FALSE_LABEL] {
                    if !outgoing.iter().any(|e| e.label.as_deref() == Some(label)) {
                        warnings.push(LintWarning::MissingBranch {
                            node: name.clone(),
                            label: label.to_string(),
                        });
                    }
                }
            }
            NodeData::Classifier(params) => {
                for intent in &params.intents {
                    if !outgoing
                        .iter()
                        .any(|e| e.label.as_deref() == Some(intent.as_str()))
                    {
                        warnings.push(LintWarning::MissingBranch {
                            node: name.clone(),
                            label: intent.clone(),
                        });
                    }
                }
            }
            NodeData::Llm(_) | NodeData::Agent(_) => {}
        }

        if outgoing.is_empty() {
            warnings.push(LintWarning::DeadEnd(name.clone()));
        }

        let mut per_label: HashMap<Option<&str>, usize> = HashMap::new();
        for edge in &outgoing {
            *per_label.entry(edge.label.as_deref()).or_default() += 1;
        }
        let mut redundant: Vec<Option<&str>> = per_label
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(label, _)| label)
            .collect();
        redundant.sort();
        for label in redundant {
            warnings.push(LintWarning::RedundantBranch {
                node: name.clone(),
                label: label.map(String::from),
            });
        }
    }

    warnings
}

/// Breadth-first walk from the unique start node. `None` when there is no
/// unique start to walk from.
fn reachable_from_start(workflow: &Workflow) -> Option<HashSet<&str>> {
    let start = workflow.start_node()?;
    let mut seen = HashSet::from([start.id.as_str()]);
    let mut queue = VecDeque::from([start.id.as_str()]);
    while let Some(current) = queue.pop_front() {
        for edge in workflow.edges.iter().filter(|e| e.source == current) {
            if seen.insert(edge.target.as_str()) {
                queue.push_back(edge.target.as_str());
            }
        }
    }
    Some(seen)
}
