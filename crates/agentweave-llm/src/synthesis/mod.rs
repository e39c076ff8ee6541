mod draft;
mod prompt;

#[cfg(test)]
mod tests;

use crate::{ChatBackend, LlmClient, LlmConfig, Message};
use agentweave_core::{Edge, Node, ValidationError, Workflow};
use anyhow::{Context, Result, anyhow};
use draft::{Rejection, read_draft, workflow_name};
use prompt::synthesis_system_prompt;
use tracing::{debug, info, warn};

/// Replies requested per synthesis: the first proposal plus one correction.
const MAX_ATTEMPTS: usize = 2;

/// A validated node/edge proposal.
#[derive(Debug)]
pub struct SynthesisResult {
    /// Suggested workflow name, derived from the description.
    pub name: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub warnings: Vec<String>,
}

impl SynthesisResult {
    /// Make this proposal the workflow's active graph. Re-validates; on
    /// failure the workflow is untouched.
    pub fn install(self, workflow: &mut Workflow) -> Result<Vec<String>, ValidationError> {
        workflow.replace_graph(self.nodes, self.edges)?;
        Ok(self.warnings)
    }
}

/// Propose a workflow graph for a natural-language description.
pub async fn synthesize_graph(
    description: &str,
    target_language: &str,
    config: LlmConfig,
) -> Result<SynthesisResult> {
    let backend = LlmClient::new(config);
    synthesize_graph_with_backend(&backend, description, target_language).await
}

/// Synthesize using a given ChatBackend (for testability).
///
/// A rejected reply is answered once with the list of problems found, so
/// the model can fix the exact nodes and edges at fault.
pub async fn synthesize_graph_with_backend(
    backend: &impl ChatBackend,
    description: &str,
    target_language: &str,
) -> Result<SynthesisResult> {
    let system = synthesis_system_prompt(target_language);
    info!("Synthesizing workflow for: {}", description);
    debug!("Synthesizer system prompt length: {} chars", system.len());

    let mut messages = vec![
        Message::system(&system),
        Message::user(format!("Design a workflow for: {}", description)),
    ];

    let mut attempt = 1;
    loop {
        let response = backend
            .chat(messages.clone(), None)
            .await
            .context("Synthesizer LLM call failed")?;
        let reply = response
            .first_text()
            .ok_or_else(|| anyhow!("Synthesizer returned no text content"))?
            .to_string();
        debug!("Synthesizer reply (attempt {}): {}", attempt, reply);

        let rejection = match read_draft(&reply) {
            Ok(draft) => {
                info!(
                    "Synthesized graph: {} nodes, {} edges, {} warnings",
                    draft.nodes.len(),
                    draft.edges.len(),
                    draft.warnings.len()
                );
                return Ok(SynthesisResult {
                    name: workflow_name(description),
                    nodes: draft.nodes,
                    edges: draft.edges,
                    warnings: draft.warnings,
                });
            }
            Err(rejection) => rejection,
        };

        if attempt >= MAX_ATTEMPTS {
            return Err(give_up(rejection, attempt));
        }
        warn!("Synthesized graph rejected, asking for a correction: {}", rejection);
        messages.push(Message::assistant(reply));
        messages.push(Message::user(rejection.feedback()));
        attempt += 1;
    }
}

fn give_up(rejection: Rejection, attempts: usize) -> anyhow::Error {
    anyhow::Error::new(rejection).context(format!(
        "Synthesized graph rejected after {} attempts",
        attempts
    ))
}
