use super::draft::{Draft, layout_nodes, outer_object, read_draft, workflow_name};
use super::prompt::synthesis_system_prompt;
use super::*;
use crate::{ChatBackend, ChatResponse, Choice, Message, ModelOverrides};
use agentweave_core::{NodeData, NodeKind};
use std::sync::Mutex;

// ── Test helpers ────────────────────────────────────────────────

/// Mock backend that returns a sequence of responses (for testing repair pass).
struct MockBackend {
    responses: Mutex<Vec<String>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockBackend {
    fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn single(response: &str) -> Self {
        Self::new(vec![response])
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ChatBackend for MockBackend {
    fn model_name(&self) -> &str {
        "mock"
    }

    async fn chat(
        &self,
        messages: Vec<Message>,
        _overrides: Option<ModelOverrides>,
    ) -> anyhow::Result<ChatResponse> {
        self.calls.lock().unwrap().push(messages);
        let mut responses = self.responses.lock().unwrap();
        let text = if responses.is_empty() {
            r#"{"nodes": []}"#.to_string()
        } else {
            responses.remove(0)
        };
        Ok(ChatResponse {
            id: "mock".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(&text),
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        })
    }
}

const TRIAGE_GRAPH: &str = r#"{
  "nodes": [
    {"id": "start", "name": "Start", "data": {"type": "Start"}},
    {"id": "route", "name": "Route", "data": {"type": "Classifier", "intents": ["Sales", "Support"], "instruction": "Route the ticket."}},
    {"id": "sales", "name": "Sales", "data": {"type": "Agent", "agent_id": "sales"}},
    {"id": "support", "name": "Support", "data": {"type": "Llm", "system_instruction": "Help with: {{input}}"}},
    {"id": "end", "name": "End", "data": {"type": "End"}}
  ],
  "edges": [
    {"source": "start", "target": "route"},
    {"source": "route", "target": "sales", "label": "Sales"},
    {"source": "route", "target": "support", "label": "Support"},
    {"source": "sales", "target": "end"},
    {"source": "support", "target": "end"}
  ]
}"#;

// ── Unit tests ──────────────────────────────────────────────────

#[test]
fn test_outer_object_plain() {
    let input = r#"{"nodes": []}"#;
    assert_eq!(outer_object(input), Some(input));
}

#[test]
fn test_outer_object_inside_fence_and_chatter() {
    let input = "Here you go:\n```json\n{\"nodes\": [{}]}\n```\nEnjoy!";
    assert_eq!(outer_object(input), Some(r#"{"nodes": [{}]}"#));
    assert_eq!(outer_object("no braces here"), None);
    assert_eq!(outer_object("} backwards {"), None);
}

#[test]
fn test_system_prompt_mentions_language_and_placeholders() {
    let prompt = synthesis_system_prompt("German");
    assert!(prompt.contains("in German"));
    assert!(prompt.contains("{{input}}"));
    assert!(prompt.contains(r#"{"type": "Classifier""#));
}

#[test]
fn test_layout_nodes_wraps_rows() {
    let positions = layout_nodes(5);
    assert_eq!(positions[0].y, positions[3].y);
    assert!(positions[4].y > positions[0].y);
}

#[test]
fn test_workflow_name_keeps_first_words_of_first_line() {
    assert_eq!(workflow_name("Triage support tickets"), "Triage support tickets");
    assert_eq!(
        workflow_name("\n  Route incoming mail to the right team quickly please\nmore"),
        "Route incoming mail to the right..."
    );
    assert_eq!(workflow_name("   "), "Synthesized workflow");
}

fn read(content: &str) -> Draft {
    read_draft(content).unwrap()
}

#[test]
fn test_read_full_graph() {
    let draft = read(TRIAGE_GRAPH);
    assert_eq!(draft.nodes.len(), 5);
    assert_eq!(draft.edges.len(), 5);
    assert!(draft.warnings.is_empty());

    let labels: Vec<Option<&str>> = draft.edges.iter().map(|e| e.label.as_deref()).collect();
    assert_eq!(labels[1], Some("Sales"));
    // Ids were minted for edges that had none.
    assert!(draft.edges.iter().all(|e| !e.id.is_empty()));
    // All-default positions get laid out.
    assert!(draft.nodes.iter().any(|n| n.position.x > 100.0));
}

#[test]
fn test_read_flat_nodes_and_lowercase_types() {
    let content = r#"{
      "nodes": [
        {"id": "s", "type": "start"},
        {"id": "c", "type": "condition", "variable": "input", "operator": "contains", "value": "refund"},
        {"id": "e", "type": "END"}
      ],
      "edges": [
        {"source": "s", "target": "c"},
        {"source": "c", "target": "e", "label": "True"},
        {"source": "c", "target": "e", "label": "False"}
      ]
    }"#;
    let draft = read(content);
    assert_eq!(draft.nodes[1].kind(), NodeKind::Condition);
    match &draft.nodes[1].data {
        NodeData::Condition(params) => assert_eq!(params.value, "refund"),
        other => panic!("unexpected data: {:?}", other),
    }
    assert_eq!(draft.nodes[2].kind(), NodeKind::End);
}

#[test]
fn test_read_skips_malformed_entries_with_warning() {
    let content = r#"{
      "nodes": [
        {"id": "s", "data": {"type": "Start"}},
        {"id": "bad", "data": {"type": "Teleport"}},
        {"id": "e", "data": {"type": "End"}}
      ],
      "edges": [
        {"source": "s", "target": "e"},
        {"source": "s"}
      ]
    }"#;
    let draft = read(content);
    assert_eq!(draft.nodes.len(), 2);
    assert_eq!(draft.edges.len(), 1);
    assert_eq!(draft.warnings.len(), 2);
    assert!(draft.warnings[0].starts_with("Skipped node 'bad'"));
    assert!(draft.warnings[1].starts_with("Skipped edge #1"));
}

#[test]
fn test_read_drops_self_loops_and_duplicates() {
    let content = r#"{
      "nodes": [
        {"id": "s", "data": {"type": "Start"}},
        {"id": "l", "data": {"type": "Llm"}},
        {"id": "e", "data": {"type": "End"}}
      ],
      "edges": [
        {"source": "s", "target": "l"},
        {"source": "l", "target": "l"},
        {"source": "l", "target": "e"},
        {"source": "l", "target": "e"}
      ]
    }"#;
    let draft = read(content);
    assert_eq!(draft.edges.len(), 2);
    assert_eq!(draft.warnings.len(), 2);
}

#[test]
fn test_read_rejects_missing_start() {
    let content = r#"{"nodes": [{"id": "e", "data": {"type": "End"}}], "edges": []}"#;
    let rejection = read_draft(content).unwrap_err();
    assert_eq!(rejection.problems.len(), 1);
    assert!(rejection.problems[0].contains("exactly one start node"));
}

#[test]
fn test_rejection_lists_every_validation_error() {
    let content = r#"{
      "nodes": [
        {"id": "s", "data": {"type": "Start"}},
        {"id": "s", "data": {"type": "End"}},
        {"id": "ghost", "data": {"type": "Wormhole"}}
      ],
      "edges": [
        {"id": "toNowhere", "source": "s", "target": "nowhere"},
        {"id": "fromGhost", "source": "ghost", "target": "s"}
      ]
    }"#;
    let rejection = read_draft(content).unwrap_err();
    assert_eq!(
        rejection.problems,
        vec![
            "Duplicate node id: s".to_string(),
            "Edge toNowhere references missing node nowhere".to_string(),
            "Edge fromGhost references missing node ghost".to_string(),
        ]
    );
    assert_eq!(rejection.skipped.len(), 1);

    let feedback = rejection.feedback();
    assert!(feedback.contains("- Edge toNowhere references missing node nowhere\n"));
    assert!(feedback.contains("- node 'ghost': "));
}

#[test]
fn test_read_rejects_unparseable_and_empty_replies() {
    let rejection = read_draft("I'd rather not.").unwrap_err();
    assert!(rejection.problems[0].contains("no JSON object"));
    let rejection = read_draft(r#"{"nodes": []}"#).unwrap_err();
    assert!(rejection.problems[0].contains("no usable nodes"));
}

#[tokio::test]
async fn test_synthesize_single_attempt() {
    let backend = MockBackend::single(TRIAGE_GRAPH);
    let result = synthesize_graph_with_backend(&backend, "Triage tickets", "English")
        .await
        .unwrap();
    assert_eq!(result.nodes.len(), 5);
    assert_eq!(result.name, "Triage tickets");
    assert_eq!(backend.call_count(), 1);
}

#[tokio::test]
async fn test_synthesize_repairs_after_invalid_output() {
    let backend = MockBackend::new(vec!["not json at all", TRIAGE_GRAPH]);
    let result = synthesize_graph_with_backend(&backend, "Triage tickets", "English")
        .await
        .unwrap();
    assert_eq!(result.edges.len(), 5);
    assert_eq!(backend.call_count(), 2);

    // The correction request carries the problem back to the model.
    let calls = backend.calls.lock().unwrap();
    let last = calls[1].last().unwrap();
    assert_eq!(last.role, "user");
    assert!(last.content.as_deref().unwrap().contains("no JSON object"));
}

#[tokio::test]
async fn test_correction_names_the_dangling_edge() {
    let dangling = r#"{
      "nodes": [
        {"id": "start", "data": {"type": "Start"}},
        {"id": "end", "data": {"type": "End"}}
      ],
      "edges": [
        {"id": "toEnd", "source": "start", "target": "end"},
        {"id": "toReview", "source": "start", "target": "review"}
      ]
    }"#;
    let backend = MockBackend::new(vec![dangling, TRIAGE_GRAPH]);
    synthesize_graph_with_backend(&backend, "Triage tickets", "English")
        .await
        .unwrap();

    let calls = backend.calls.lock().unwrap();
    let second = &calls[1];
    assert_eq!(second.len(), 4);
    assert_eq!(second[2].role, "assistant");
    let feedback = second[3].content.as_deref().unwrap();
    assert!(feedback.contains("- Edge toReview references missing node review"));
    assert!(!feedback.contains("toEnd"));
}

#[tokio::test]
async fn test_synthesize_gives_up_after_one_repair() {
    let backend = MockBackend::new(vec!["nope", "still nope"]);
    let err = synthesize_graph_with_backend(&backend, "x", "English")
        .await
        .unwrap_err();
    assert_eq!(backend.call_count(), 2);
    let message = format!("{:#}", err);
    assert!(message.contains("rejected after 2 attempts"));
    assert!(message.contains("no JSON object"));
}

#[tokio::test]
async fn test_failed_synthesis_leaves_workflow_untouched() {
    let mut workflow = Workflow::starter("existing");
    let before = workflow.nodes.len();

    let backend = MockBackend::new(vec!["{}", "{}"]);
    let result = synthesize_graph_with_backend(&backend, "x", "English").await;
    assert!(result.is_err());
    assert_eq!(workflow.nodes.len(), before);

    let backend = MockBackend::single(TRIAGE_GRAPH);
    let proposal = synthesize_graph_with_backend(&backend, "x", "English")
        .await
        .unwrap();
    let warnings = proposal.install(&mut workflow).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(workflow.nodes.len(), 5);
}
