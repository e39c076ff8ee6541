mod handlers;
mod run_loop;
mod trace;


pub use handlers::{INTENT_VARIABLE, NodeOutcome, NodeOutput};

use agentweave_core::{AgentRegistry, ExecutionLog, StaticAgentRegistry, ValidationError, Workflow};
use agentweave_llm::{ChatBackend, LlmClient, LlmConfig};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorState {
    Idle,
    Running,
    Halted,
}

pub enum ExecutorCommand {
    Stop,
}

/// Events sent from the executor to whoever is watching the run.
///
/// `NodeStarted` and `EdgeTraversed` carry the currently active node and
/// edge ids. They are progress signals only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutorEvent {
    Log(agentweave_core::LogEntry),
    StateChanged(ExecutorState),
    NodeStarted(String),
    NodeCompleted(String),
    NodeFailed(String, String),
    EdgeTraversed(String),
    WorkflowCompleted(RunStatus),
}

/// Defensive bounds for a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Handler invocations allowed before the run is halted.
    pub max_steps: usize,
    /// Per-node ceiling on handler time, mostly the generation call.
    pub step_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_steps: 64,
            step_timeout_ms: 60_000,
        }
    }
}

/// A node handler failed. The run halts at that node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("invalid node: {0}")]
    InvalidNode(String),
}

/// Errors returned by [`WorkflowExecutor::run`] before any node executes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid graph: {0}")]
    InvalidGraph(#[from] ValidationError),

    #[error("a run is already in progress on this executor")]
    AlreadyRunning,
}

/// Why a run halted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// An `end` node ran.
    Completed,
    /// No outgoing edge matched at `node_id`. A normal halt.
    DeadEnd { node_id: String },
    Failed { node_id: String, error: String },
    /// A stop command arrived.
    Stopped,
    StepLimit { max_steps: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// The `end` node's output, or the last produced output for any
    /// other halt. `None` only if the run stopped before producing any.
    pub output: Option<String>,
    pub log: ExecutionLog,
    pub visited_nodes: Vec<String>,
    pub traversed_edges: Vec<String>,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

pub struct WorkflowExecutor<C: ChatBackend = LlmClient, R: AgentRegistry = StaticAgentRegistry> {
    workflow: Workflow,
    backend: C,
    agents: R,
    config: ExecutorConfig,
    event_tx: Sender<ExecutorEvent>,
    state: RwLock<ExecutorState>,
}

impl WorkflowExecutor {
    pub fn new(
        workflow: Workflow,
        llm_config: LlmConfig,
        agents: StaticAgentRegistry,
        config: ExecutorConfig,
        event_tx: Sender<ExecutorEvent>,
    ) -> Self {
        Self::with_backends(workflow, LlmClient::new(llm_config), agents, config, event_tx)
    }
}

impl<C: ChatBackend, R: AgentRegistry> WorkflowExecutor<C, R> {
    /// The workflow is taken by value: edits made elsewhere after this
    /// point never reach a run.
    pub fn with_backends(
        workflow: Workflow,
        backend: C,
        agents: R,
        config: ExecutorConfig,
        event_tx: Sender<ExecutorEvent>,
    ) -> Self {
        Self {
            workflow,
            backend,
            agents,
            config,
            event_tx,
            state: RwLock::new(ExecutorState::Idle),
        }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn state(&self) -> ExecutorState {
        match self.state.read() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
