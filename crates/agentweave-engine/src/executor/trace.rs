use super::{ExecutorCommand, ExecutorEvent, ExecutorState, WorkflowExecutor};
use agentweave_core::{AgentRegistry, ExecutionLog, LogEntry, LogKind};
use agentweave_llm::ChatBackend;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, info};

impl<C: ChatBackend, R: AgentRegistry> WorkflowExecutor<C, R> {
    pub(crate) fn emit(&self, event: ExecutorEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            error!("Failed to send executor event: {}", e);
        }
    }

    /// Append to the run's log, mirror to `tracing` and to the event stream.
    pub(crate) fn record(
        &self,
        log: &mut ExecutionLog,
        kind: LogKind,
        message: impl Into<String>,
        node_id: Option<&str>,
    ) {
        let entry = LogEntry::new(kind, message, node_id);
        let node = node_id.unwrap_or("-");
        match kind {
            LogKind::Info | LogKind::Output => info!(node = node, "{}", entry.message),
            LogKind::Error => error!(node = node, "{}", entry.message),
            LogKind::User => debug!(node = node, "{}", entry.message),
        }
        self.emit(ExecutorEvent::Log(entry.clone()));
        log.push(entry);
    }

    pub(crate) fn log(&self, log: &mut ExecutionLog, msg: impl Into<String>, node_id: Option<&str>) {
        self.record(log, LogKind::Info, msg, node_id);
    }

    pub(crate) fn log_error(&self, log: &mut ExecutionLog, msg: impl Into<String>, node_id: &str) {
        self.record(log, LogKind::Error, msg, Some(node_id));
    }

    pub(crate) fn set_state(&self, state: ExecutorState) {
        match self.state.write() {
            Ok(mut current) => *current = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
        self.emit(ExecutorEvent::StateChanged(state));
    }

    /// Move to `Running` unless a run is already in progress.
    pub(crate) fn try_begin(&self) -> bool {
        let mut current = match self.state.write() {
            Ok(current) => current,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *current == ExecutorState::Running {
            return false;
        }
        *current = ExecutorState::Running;
        drop(current);
        self.emit(ExecutorEvent::StateChanged(ExecutorState::Running));
        true
    }

    /// A closed channel is not a stop request.
    pub(crate) fn stop_requested(&self, command_rx: &mut Receiver<ExecutorCommand>) -> bool {
        matches!(command_rx.try_recv(), Ok(ExecutorCommand::Stop))
    }
}
