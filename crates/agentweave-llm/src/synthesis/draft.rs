use std::collections::HashSet;
use std::fmt;

use agentweave_core::{Edge, Node, Position, validate_all};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Words kept from the description when naming the workflow.
const NAME_WORDS: usize = 6;

/// A synthesizer reply that cannot be installed, with every reason found.
///
/// `skipped` lists entries dropped while reading; they are reported back so
/// a retry can restore them instead of silently losing them again.
#[derive(Debug, Default)]
pub(crate) struct Rejection {
    pub problems: Vec<String>,
    pub skipped: Vec<String>,
}

impl Rejection {
    fn new(problem: impl Into<String>) -> Self {
        Self {
            problems: vec![problem.into()],
            skipped: Vec::new(),
        }
    }

    /// Follow-up message naming each offending node or edge.
    pub fn feedback(&self) -> String {
        let mut msg = String::from("The graph you proposed was rejected:\n");
        for problem in &self.problems {
            msg.push_str(&format!("- {}\n", problem));
        }
        if !self.skipped.is_empty() {
            msg.push_str("\nThese entries were unreadable and got dropped:\n");
            for entry in &self.skipped {
                msg.push_str(&format!("- {}\n", entry));
            }
        }
        msg.push_str(
            "\nReturn the complete corrected graph as ONE JSON object. \
             Keep the ids of nodes that were fine.",
        );
        msg
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.problems.join("; "))?;
        if !self.skipped.is_empty() {
            write!(f, " ({} entries skipped)", self.skipped.len())?;
        }
        Ok(())
    }
}

impl std::error::Error for Rejection {}

/// An accepted proposal, before it is named.
#[derive(Debug)]
pub(crate) struct Draft {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawGraph {
    #[serde(default)]
    nodes: Vec<Value>,
    #[serde(default)]
    edges: Vec<Value>,
}

/// Edges as the model writes them: the id is optional.
#[derive(Debug, Deserialize)]
struct RawEdge {
    #[serde(default)]
    id: Option<String>,
    source: String,
    target: String,
    #[serde(default)]
    label: Option<String>,
}

/// Read one reply into a structurally valid node/edge set.
///
/// Unreadable entries are dropped and remembered; they only sink the reply
/// if what is left fails validation.
pub(crate) fn read_draft(reply: &str) -> Result<Draft, Rejection> {
    let Some(object) = outer_object(reply) else {
        return Err(Rejection::new("no JSON object found in the reply"));
    };
    let raw: RawGraph = serde_json::from_str(object)
        .map_err(|e| Rejection::new(format!("the reply is not a valid graph object: {}", e)))?;

    let mut skipped = Vec::new();
    let mut nodes: Vec<Node> = Vec::new();
    for (i, entry) in raw.nodes.iter().enumerate() {
        match serde_json::from_value::<Node>(canonical_node(entry)) {
            Ok(node) => nodes.push(node),
            Err(e) => skipped.push(format!("{}: {}", entry_name("node", i, entry), e)),
        }
    }
    if nodes.is_empty() {
        return Err(Rejection {
            problems: vec!["the graph has no usable nodes".to_string()],
            skipped,
        });
    }

    for node in &mut nodes {
        if node.id.trim().is_empty() {
            node.id = Uuid::new_v4().to_string();
        }
    }
    if nodes.iter().all(|n| n.position == Position::default()) {
        let positions = layout_nodes(nodes.len());
        for (node, position) in nodes.iter_mut().zip(positions) {
            node.position = position;
        }
    }

    let mut warnings = Vec::new();
    let mut edges: Vec<Edge> = Vec::new();
    let mut edge_ids = HashSet::new();
    for (i, entry) in raw.edges.iter().enumerate() {
        let proposed = match serde_json::from_value::<RawEdge>(entry.clone()) {
            Ok(edge) => edge,
            Err(e) => {
                skipped.push(format!("{}: {}", entry_name("edge", i, entry), e));
                continue;
            }
        };
        let label = proposed
            .label
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        if proposed.source == proposed.target {
            warnings.push(format!("Self-loop on '{}' removed", proposed.source));
            continue;
        }
        if edges.iter().any(|e| {
            e.connects(&proposed.source, &proposed.target, label.as_deref())
        }) {
            warnings.push(format!(
                "Duplicate edge {} -> {} removed",
                proposed.source, proposed.target
            ));
            continue;
        }
        let id = proposed
            .id
            .filter(|id| !id.trim().is_empty() && !edge_ids.contains(id))
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        edge_ids.insert(id.clone());
        edges.push(Edge {
            id,
            source: proposed.source,
            target: proposed.target,
            label,
        });
    }

    let errors = validate_all(&nodes, &edges);
    if !errors.is_empty() {
        return Err(Rejection {
            problems: errors.iter().map(ToString::to_string).collect(),
            skipped,
        });
    }

    warnings.extend(skipped.into_iter().map(|s| format!("Skipped {}", s)));
    Ok(Draft {
        nodes,
        edges,
        warnings,
    })
}

/// The span from the first `{` to the last `}`, which covers code fences
/// and chatter around the object.
pub(crate) fn outer_object(reply: &str) -> Option<&str> {
    let open = reply.find('{')?;
    let close = reply.rfind('}')?;
    (open < close).then(|| &reply[open..=close])
}

/// "node 'triage'" or "edge #3 (a -> b)", for feedback and warnings.
fn entry_name(kind: &str, index: usize, entry: &Value) -> String {
    let field = |key: &str| entry.get(key).and_then(Value::as_str);
    match (field("id"), field("source"), field("target")) {
        (Some(id), _, _) if !id.is_empty() => format!("{} '{}'", kind, id),
        (_, Some(source), Some(target)) => {
            format!("{} #{} ({} -> {})", kind, index, source, target)
        }
        _ => format!("{} #{}", kind, index),
    }
}

/// Accept the flat form models often produce (`{"id", "type", ...params}`)
/// and case-insensitive type tags, rewriting both into the persisted shape.
fn canonical_node(raw: &Value) -> Value {
    let Some(obj) = raw.as_object() else {
        return raw.clone();
    };

    let mut data = match obj.get("data") {
        Some(Value::Object(data)) => data.clone(),
        _ => obj
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "id" | "name" | "position"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    };
    if let Some(tag) = data.get("type").and_then(Value::as_str).and_then(type_tag) {
        data.insert("type".to_string(), Value::String(tag.to_string()));
    }

    let mut node: Map<String, Value> = ["id", "name", "position"]
        .into_iter()
        .filter_map(|key| obj.get(key).map(|v| (key.to_string(), v.clone())))
        .collect();
    node.insert("data".to_string(), Value::Object(data));
    Value::Object(node)
}

fn type_tag(tag: &str) -> Option<&'static str> {
    match tag.trim().to_lowercase().as_str() {
        "start" => Some("Start"),
        "llm" => Some("Llm"),
        "agent" => Some("Agent"),
        "condition" => Some("Condition"),
        "classifier" => Some("Classifier"),
        "end" => Some("End"),
        _ => None,
    }
}

/// Lay out nodes left to right in rows of four.
pub(crate) fn layout_nodes(count: usize) -> Vec<Position> {
    (0..count)
        .map(|i| Position {
            x: 100.0 + ((i % 4) as f32) * 260.0,
            y: 100.0 + ((i / 4) as f32) * 180.0,
        })
        .collect()
}

/// First non-blank line of the description, cut to a few words.
pub(crate) fn workflow_name(description: &str) -> String {
    let line = description
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("Synthesized workflow");
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() <= NAME_WORDS {
        return words.join(" ");
    }
    format!("{}...", words[..NAME_WORDS].join(" "))
}
