use super::{
    EngineError, ExecutorCommand, ExecutorEvent, ExecutorState, RunReport, RunStatus,
    WorkflowExecutor,
};
use agentweave_core::{
    AgentRegistry, Edge, ExecutionContext, ExecutionLog, LogKind, NodeKind, UserProfile,
    ValidationError, validate_workflow,
};
use agentweave_llm::ChatBackend;
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

/// Moves the executor to `Halted` when the run ends, including when the
/// caller drops the run future part way through.
struct RunGuard<'a, C: ChatBackend, R: AgentRegistry> {
    executor: &'a WorkflowExecutor<C, R>,
}

impl<C: ChatBackend, R: AgentRegistry> Drop for RunGuard<'_, C, R> {
    fn drop(&mut self) {
        self.executor.set_state(ExecutorState::Halted);
    }
}

impl<C: ChatBackend, R: AgentRegistry> WorkflowExecutor<C, R> {
    /// Pick the edge to follow out of `node_id`.
    ///
    /// With a branch label, only an edge carrying that label qualifies,
    /// ignoring surrounding whitespace on either side. Without one, the first outgoing edge in insertion order
    /// is taken.
    pub(crate) fn follow_edge(&self, node_id: &str, branch_label: Option<&str>) -> Option<&Edge> {
        let mut outgoing = self.workflow.outgoing_edges(node_id).into_iter();
        match branch_label {
            Some(label) => {
                let label = label.trim();
                outgoing.find(|e| e.label.as_deref().map(str::trim) == Some(label))
            }
            None => outgoing.next(),
        }
    }

    /// Execute the workflow once for `input`.
    ///
    /// Returns `Err` only if the run could not start; handler failures,
    /// dead ends, stops and the step ceiling all end in a [`RunReport`].
    pub async fn run(
        &self,
        input: impl Into<String>,
        user_profile: UserProfile,
        mut command_rx: Receiver<ExecutorCommand>,
    ) -> Result<RunReport, EngineError> {
        validate_workflow(&self.workflow)?;
        let start_id = match self.workflow.start_node() {
            Some(start) => start.id.clone(),
            None => return Err(ValidationError::MissingStartNode { count: 0 }.into()),
        };

        if !self.try_begin() {
            return Err(EngineError::AlreadyRunning);
        }
        let _guard = RunGuard { executor: self };

        let run_id = Uuid::new_v4();
        let mut ctx = ExecutionContext::new(input, user_profile);
        let mut log = ExecutionLog::new();
        let mut visited_nodes = Vec::new();
        let mut traversed_edges = Vec::new();
        let mut final_output = None;

        self.log(
            &mut log,
            format!("Starting run {} of '{}'", run_id, self.workflow.name),
            None,
        );
        self.record(&mut log, LogKind::User, ctx.input.clone(), None);

        let mut current = start_id;
        let mut steps = 0;

        let status = loop {
            if self.stop_requested(&mut command_rx) {
                self.log(&mut log, "Run stopped", None);
                break RunStatus::Stopped;
            }

            if steps >= self.config.max_steps {
                self.log_error(
                    &mut log,
                    format!(
                        "Step limit of {} reached, halting before this node",
                        self.config.max_steps
                    ),
                    &current,
                );
                break RunStatus::StepLimit {
                    max_steps: self.config.max_steps,
                };
            }
            steps += 1;

            // Edges are validated, so this only trips on a graph edited
            // behind our back.
            let Some(node) = self.workflow.find_node(&current) else {
                self.log_error(&mut log, format!("Node {} not found", current), &current);
                break RunStatus::Failed {
                    node_id: current.clone(),
                    error: "node not found".to_string(),
                };
            };

            self.emit(ExecutorEvent::NodeStarted(node.id.clone()));
            visited_nodes.push(node.id.clone());
            self.log(
                &mut log,
                format!(
                    "Executing node: {} ({})",
                    node.label(),
                    node.kind().display_name()
                ),
                Some(&node.id),
            );

            let result = self.execute_node(node, &ctx).await;

            if self.stop_requested(&mut command_rx) {
                self.log(
                    &mut log,
                    format!("Run stopped, discarding result of {}", node.label()),
                    Some(&node.id),
                );
                break RunStatus::Stopped;
            }

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    let error = e.to_string();
                    self.log_error(
                        &mut log,
                        format!("Node {} failed: {}", node.label(), error),
                        &node.id,
                    );
                    self.emit(ExecutorEvent::NodeFailed(node.id.clone(), error.clone()));
                    break RunStatus::Failed {
                        node_id: node.id.clone(),
                        error,
                    };
                }
            };

            for note in &outcome.notes {
                self.log(&mut log, note.clone(), Some(&node.id));
            }
            match node.kind() {
                NodeKind::Llm | NodeKind::Agent | NodeKind::End => {
                    if let Some(text) = outcome.text_output() {
                        self.record(&mut log, LogKind::Output, text, Some(&node.id));
                    }
                }
                NodeKind::Condition | NodeKind::Classifier => {
                    if let Some(label) = &outcome.branch_label {
                        self.log(
                            &mut log,
                            format!("{} chose branch '{}'", node.label(), label),
                            Some(&node.id),
                        );
                    }
                }
                NodeKind::Start => {}
            }

            let branch_label = outcome.branch_label.clone();
            if node.kind() == NodeKind::End {
                final_output = outcome.text_output().map(str::to_string);
            }
            ctx.apply(outcome.patch);
            self.emit(ExecutorEvent::NodeCompleted(node.id.clone()));

            if node.kind() == NodeKind::End {
                self.log(&mut log, "Workflow execution completed", Some(&node.id));
                break RunStatus::Completed;
            }

            match self.follow_edge(&node.id, branch_label.as_deref()) {
                Some(edge) => {
                    self.emit(ExecutorEvent::EdgeTraversed(edge.id.clone()));
                    traversed_edges.push(edge.id.clone());
                    current = edge.target.clone();
                }
                None => {
                    let detail = match &branch_label {
                        Some(label) => format!(" for branch '{}'", label),
                        None => String::new(),
                    };
                    self.log(
                        &mut log,
                        format!(
                            "Halting at {}: no connecting edge{}",
                            node.label(),
                            detail
                        ),
                        Some(&node.id),
                    );
                    break RunStatus::DeadEnd {
                        node_id: node.id.clone(),
                    };
                }
            }
        };

        let output = match status {
            RunStatus::Completed => final_output,
            RunStatus::DeadEnd { .. } => Some(ctx.final_output().to_string()),
            _ => ctx.last_output.clone(),
        };

        self.emit(ExecutorEvent::WorkflowCompleted(status.clone()));

        Ok(RunReport {
            run_id,
            status,
            output,
            log,
            visited_nodes,
            traversed_edges,
        })
    }
}
