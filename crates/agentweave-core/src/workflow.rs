use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::{ValidationError, validate_graph};

/// Edge label taken by a condition node whose test passed.
pub const TRUE_LABEL: &str = "True";
/// Edge label taken by a condition node whose test failed.
pub const FALSE_LABEL: &str = "False";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Default for Workflow {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            name: "New Workflow".to_string(),
            nodes: vec![],
            edges: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: Position,
    pub data: NodeData,
}

impl Node {
    pub fn new(data: NodeData, position: Position, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            position,
            data,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    /// Display label: the node's name, or the kind's name when unnamed.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            self.kind().display_name()
        } else {
            &self.name
        }
    }
}

/// Editor coordinates. Ignored by the interpreter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        label: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            target: target.into(),
            label,
        }
    }

    /// True if this edge is exactly `(source, target, label)`.
    pub fn connects(&self, source: &str, target: &str, label: Option<&str>) -> bool {
        self.source == source && self.target == target && self.label.as_deref() == label
    }
}

/// All edges leaving `node_id`, in insertion order.
pub fn outgoing_edges<'a>(edges: &'a [Edge], node_id: &str) -> Vec<&'a Edge> {
    edges.iter().filter(|e| e.source == node_id).collect()
}

/// Empty or whitespace-only labels are stored as "no label".
fn normalize_label(label: Option<String>) -> Option<String> {
    label
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// A fresh workflow with a `start` node wired straight to an `end` node.
    pub fn starter(name: impl Into<String>) -> Self {
        let mut workflow = Self::new(name);
        let start = workflow.add_node(NodeKind::Start, Position { x: 100.0, y: 200.0 });
        let end = workflow.add_node(NodeKind::End, Position { x: 500.0, y: 200.0 });
        workflow.add_edge(&start.id, &end.id, None);
        workflow
    }

    /// Create a node of `kind` seeded with that kind's default data.
    pub fn add_node(&mut self, kind: NodeKind, position: Position) -> Node {
        let node = Node::new(kind.default_data(), position, kind.display_name());
        self.nodes.push(node.clone());
        node
    }

    /// Insert a fully-formed node. Returns `false` if the id is taken.
    pub fn insert_node(&mut self, node: Node) -> bool {
        if self.find_node(&node.id).is_some() {
            return false;
        }
        self.nodes.push(node);
        true
    }

    /// Connect `source` to `target`.
    ///
    /// Returns `None` without touching the graph for a self-loop, an unknown
    /// endpoint, an exact duplicate `(source, target, label)`, an edge into a
    /// `start` node, or an edge out of an `end` node.
    pub fn add_edge(&mut self, source: &str, target: &str, label: Option<String>) -> Option<Edge> {
        if source == target {
            return None;
        }
        let source_kind = self.find_node(source)?.kind();
        let target_kind = self.find_node(target)?.kind();
        if source_kind == NodeKind::End || target_kind == NodeKind::Start {
            return None;
        }

        let label = normalize_label(label);
        if self
            .edges
            .iter()
            .any(|e| e.connects(source, target, label.as_deref()))
        {
            return None;
        }

        let edge = Edge::new(source, target, label);
        self.edges.push(edge.clone());
        Some(edge)
    }

    /// Remove a node and every edge touching it.
    ///
    /// Does not protect the `start` node; the editor is expected to.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let before = self.nodes.len();
        self.nodes.retain(|n| n.id != id);
        if self.nodes.len() == before {
            return false;
        }
        self.edges.retain(|e| e.source != id && e.target != id);
        true
    }

    pub fn remove_edge(&mut self, id: &str) -> bool {
        let before = self.edges.len();
        self.edges.retain(|e| e.id != id);
        self.edges.len() != before
    }

    /// Change an edge's label. Refuses a relabel that would duplicate an
    /// existing `(source, target, label)` triple.
    pub fn relabel_edge(&mut self, id: &str, label: Option<String>) -> bool {
        let label = normalize_label(label);
        let Some(edge) = self.find_edge(id) else {
            return false;
        };
        let (source, target) = (edge.source.clone(), edge.target.clone());
        if self
            .edges
            .iter()
            .any(|e| e.id != id && e.connects(&source, &target, label.as_deref()))
        {
            return false;
        }
        match self.edges.iter_mut().find(|e| e.id == id) {
            Some(edge) => {
                edge.label = label;
                true
            }
            None => false,
        }
    }

    pub fn rename_node(&mut self, id: &str, name: impl Into<String>) -> bool {
        match self.find_node_mut(id) {
            Some(node) => {
                node.name = name.into();
                true
            }
            None => false,
        }
    }

    pub fn move_node(&mut self, id: &str, position: Position) -> bool {
        match self.find_node_mut(id) {
            Some(node) => {
                node.position = position;
                true
            }
            None => false,
        }
    }

    /// Replace a node's payload. The kind is fixed at creation, so data of a
    /// different kind is rejected.
    pub fn update_node_data(&mut self, id: &str, data: NodeData) -> bool {
        match self.find_node_mut(id) {
            Some(node) if node.kind() == data.kind() => {
                node.data = data;
                true
            }
            _ => false,
        }
    }

    /// Install a new node/edge set (e.g. from graph synthesis).
    ///
    /// The candidate is validated first; on failure the current graph is
    /// left exactly as it was.
    pub fn replace_graph(
        &mut self,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Result<(), ValidationError> {
        validate_graph(&nodes, &edges)?;
        self.nodes = nodes;
        self.edges = edges;
        Ok(())
    }

    pub fn find_node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn find_edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        outgoing_edges(&self.edges, node_id)
    }

    pub fn incoming_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.target == node_id).collect()
    }

    /// The entry point, if exactly one `start` node exists.
    pub fn start_node(&self) -> Option<&Node> {
        let mut starts = self.nodes.iter().filter(|n| n.kind() == NodeKind::Start);
        match (starts.next(), starts.next()) {
            (Some(start), None) => Some(start),
            _ => None,
        }
    }
}

// =============================================================================
// Node kinds
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Start,
    Llm,
    Agent,
    Condition,
    Classifier,
    End,
}

impl NodeKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            NodeKind::Start => "Start",
            NodeKind::Llm => "LLM",
            NodeKind::Agent => "Agent",
            NodeKind::Condition => "Condition",
            NodeKind::Classifier => "Classifier",
            NodeKind::End => "End",
        }
    }

    pub fn default_data(&self) -> NodeData {
        match self {
            NodeKind::Start => NodeData::Start,
            NodeKind::Llm => NodeData::Llm(LlmParams::default()),
            NodeKind::Agent => NodeData::Agent(AgentParams::default()),
            NodeKind::Condition => NodeData::Condition(ConditionParams::default()),
            NodeKind::Classifier => NodeData::Classifier(ClassifierParams::default()),
            NodeKind::End => NodeData::End,
        }
    }
}

/// Kind-specific payload. The variant is the node's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NodeData {
    Start,
    Llm(LlmParams),
    Agent(AgentParams),
    Condition(ConditionParams),
    Classifier(ClassifierParams),
    End,
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Start => NodeKind::Start,
            NodeData::Llm(_) => NodeKind::Llm,
            NodeData::Agent(_) => NodeKind::Agent,
            NodeData::Condition(_) => NodeKind::Condition,
            NodeData::Classifier(_) => NodeKind::Classifier,
            NodeData::End => NodeKind::End,
        }
    }
}

// =============================================================================
// Parameter structs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmParams {
    /// May contain `{{input}}`, `{{context}}` and `{{user_profile}}`.
    pub system_instruction: String,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

impl Default for LlmParams {
    fn default() -> Self {
        Self {
            system_instruction: "You are a helpful assistant.\n\nPrevious step output: {{context}}"
                .to_string(),
            model: None,
            temperature: Some(0.7),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentParams {
    /// Registry key of the persona to run as.
    pub agent_id: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionParams {
    /// `input`, `last_output`, `user_profile.<key>` or a named variable.
    pub variable: String,
    pub operator: ConditionOperator,
    pub value: String,
}

impl Default for ConditionParams {
    fn default() -> Self {
        Self {
            variable: "input".to_string(),
            operator: ConditionOperator::Contains,
            value: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Contains,
    Equals,
    NotEmpty,
    Empty,
    Greater,
    Less,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierParams {
    /// Declared intents, in priority order. The first is the fallback.
    pub intents: Vec<String>,
    pub instruction: String,
    pub model: Option<String>,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            intents: vec![
                "Sales".to_string(),
                "Support".to_string(),
                "General".to_string(),
            ],
            instruction: "Classify the user's message by intent.".to_string(),
            model: None,
        }
    }
}
