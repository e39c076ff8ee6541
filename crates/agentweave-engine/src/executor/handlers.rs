use super::{HandlerError, WorkflowExecutor};
use agentweave_core::template::render_instruction;
use agentweave_core::{
    AgentParams, AgentRegistry, ClassifierParams, ConditionParams, ContextPatch, ExecutionContext,
    FALSE_LABEL, LlmParams, Node, NodeData, TRUE_LABEL,
};
use agentweave_llm::{
    ChatBackend, GENERIC_AGENT_INSTRUCTION, ModelOverrides, classifier_system_prompt,
    generate, match_intent,
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Variable a classifier writes its matched intent to.
pub const INTENT_VARIABLE: &str = "intent";

#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    Text(String),
    Bool(bool),
}

/// What a handler hands back to the run loop. Handlers never touch the
/// context directly; the loop merges `patch` once the step is accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutcome {
    pub output: NodeOutput,
    pub patch: ContextPatch,
    /// Selects among labeled outgoing edges. `None` takes the first edge.
    pub branch_label: Option<String>,
    /// Extra lines for the execution log, e.g. fallbacks taken.
    pub notes: Vec<String>,
}

impl NodeOutcome {
    fn text(output: impl Into<String>) -> Self {
        Self {
            output: NodeOutput::Text(output.into()),
            patch: ContextPatch::default(),
            branch_label: None,
            notes: Vec::new(),
        }
    }

    /// Generated text: becomes `last_output` and the node's named variable.
    fn generated(node: &Node, text: String) -> Self {
        let patch = ContextPatch::default()
            .with_last_output(text.clone())
            .with_variable(node.id.clone(), Value::String(text.clone()));
        Self {
            patch,
            ..Self::text(text)
        }
    }

    pub fn text_output(&self) -> Option<&str> {
        match &self.output {
            NodeOutput::Text(text) => Some(text),
            NodeOutput::Bool(_) => None,
        }
    }
}

impl<C: ChatBackend, R: AgentRegistry> WorkflowExecutor<C, R> {
    /// Run one node's handler under the per-step timeout.
    pub(crate) async fn execute_node(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, HandlerError> {
        let timeout_ms = self.config.step_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), self.dispatch(node, ctx))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(HandlerError::Timeout { timeout_ms }),
        }
    }

    async fn dispatch(
        &self,
        node: &Node,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, HandlerError> {
        match &node.data {
            NodeData::Start => Ok(NodeOutcome::text(ctx.input.clone())),
            NodeData::Llm(params) => self.execute_llm(node, params, ctx).await,
            NodeData::Agent(params) => self.execute_agent(node, params, ctx).await,
            NodeData::Condition(params) => Ok(execute_condition(params, ctx)),
            NodeData::Classifier(params) => self.execute_classifier(node, params, ctx).await,
            NodeData::End => Ok(NodeOutcome::text(ctx.final_output())),
        }
    }

    async fn execute_llm(
        &self,
        node: &Node,
        params: &LlmParams,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, HandlerError> {
        let instruction = render_instruction(&params.system_instruction, ctx);
        let overrides = ModelOverrides {
            model: params.model.clone(),
            temperature: params.temperature,
        };
        let text = self.call_backend(&ctx.input, &instruction, overrides).await?;
        Ok(NodeOutcome::generated(node, text))
    }

    async fn execute_agent(
        &self,
        node: &Node,
        params: &AgentParams,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, HandlerError> {
        let agent = params
            .agent_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .and_then(|id| self.agents.lookup(id));

        let mut notes = Vec::new();
        let template = match &agent {
            Some(agent) => {
                debug!("Node {} running as agent '{}'", node.id, agent.display_name);
                agent.system_instruction.as_str()
            }
            None => {
                let reference = params.agent_id.as_deref().unwrap_or("");
                warn!(
                    "Agent '{}' not found for node {}, using generic instruction",
                    reference, node.id
                );
                notes.push(format!(
                    "Agent '{}' not found, using the generic assistant",
                    reference
                ));
                GENERIC_AGENT_INSTRUCTION
            }
        };

        let instruction = render_instruction(template, ctx);
        let overrides = ModelOverrides {
            model: params.model.clone(),
            temperature: params.temperature,
        };
        let text = self.call_backend(&ctx.input, &instruction, overrides).await?;
        Ok(NodeOutcome {
            notes,
            ..NodeOutcome::generated(node, text)
        })
    }

    async fn execute_classifier(
        &self,
        node: &Node,
        params: &ClassifierParams,
        ctx: &ExecutionContext,
    ) -> Result<NodeOutcome, HandlerError> {
        let Some(fallback) = params.intents.first() else {
            return Err(HandlerError::InvalidNode(format!(
                "classifier '{}' declares no intents",
                node.label()
            )));
        };

        let instruction = render_instruction(&params.instruction, ctx);
        let system = classifier_system_prompt(&params.intents, &instruction);
        let overrides = ModelOverrides {
            model: params.model.clone(),
            temperature: Some(0.0),
        };
        let response = self.call_backend(&ctx.input, &system, overrides).await?;

        let mut notes = Vec::new();
        let intent = match match_intent(&response, &params.intents) {
            Some(intent) => intent,
            None => {
                let fallback = fallback.trim().to_string();
                warn!(
                    "Classifier {} reply {:?} matched no intent, falling back to '{}'",
                    node.id, response, fallback
                );
                notes.push(format!(
                    "Reply matched no declared intent, falling back to '{}'",
                    fallback
                ));
                fallback
            }
        };

        let patch = ContextPatch::default()
            .with_variable(INTENT_VARIABLE, Value::String(intent.clone()))
            .with_variable(node.id.clone(), Value::String(intent.clone()));
        Ok(NodeOutcome {
            output: NodeOutput::Text(intent.clone()),
            patch,
            branch_label: Some(intent),
            notes,
        })
    }

    async fn call_backend(
        &self,
        prompt: &str,
        system_instruction: &str,
        overrides: ModelOverrides,
    ) -> Result<String, HandlerError> {
        generate(&self.backend, prompt, system_instruction, Some(overrides))
            .await
            .map_err(|e| HandlerError::Generation(format!("{:#}", e)))
    }
}

fn execute_condition(params: &ConditionParams, ctx: &ExecutionContext) -> NodeOutcome {
    let passed = ctx.evaluate_condition(params);
    let label = if passed { TRUE_LABEL } else { FALSE_LABEL };
    NodeOutcome {
        output: NodeOutput::Bool(passed),
        patch: ContextPatch::default(),
        branch_label: Some(label.to_string()),
        notes: Vec::new(),
    }
}
