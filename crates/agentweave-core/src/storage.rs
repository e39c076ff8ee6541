use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{LogEntry, Workflow};

/// On-disk envelope around a saved workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SavedWorkflow {
    saved_at: DateTime<Utc>,
    workflow: Workflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub id: Uuid,
    pub name: String,
    pub saved_at: DateTime<Utc>,
    pub node_count: usize,
}

/// Persists workflows as JSON and run logs as JSON lines.
///
/// Directory layout:
/// ```text
/// <root>/
///   workflows/<workflow_id>.json
///   runs/<workflow_id>/<run_id>.jsonl
/// ```
pub struct WorkflowStore {
    root: PathBuf,
}

impl WorkflowStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn workflows_dir(&self) -> PathBuf {
        self.root.join("workflows")
    }

    fn workflow_path(&self, id: Uuid) -> PathBuf {
        self.workflows_dir().join(format!("{}.json", id))
    }

    /// Save (or overwrite) a workflow. Returns its id.
    pub fn save(&self, workflow: &Workflow) -> Result<Uuid> {
        std::fs::create_dir_all(self.workflows_dir())
            .context("Failed to create workflows directory")?;

        let saved = SavedWorkflow {
            saved_at: Utc::now(),
            workflow: workflow.clone(),
        };
        let json = serde_json::to_string_pretty(&saved).context("Failed to serialize workflow")?;
        std::fs::write(self.workflow_path(workflow.id), json)
            .context("Failed to write workflow file")?;

        debug!("Saved workflow {} ({})", workflow.id, workflow.name);
        Ok(workflow.id)
    }

    pub fn load(&self, id: Uuid) -> Result<Workflow> {
        Ok(Self::read_saved(&self.workflow_path(id))?.workflow)
    }

    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let path = self.workflow_path(id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).context("Failed to delete workflow file")?;
        Ok(true)
    }

    /// Saved workflows, most recently saved first. Unreadable files are
    /// skipped with a warning.
    pub fn list(&self) -> Result<Vec<WorkflowSummary>> {
        let dir = self.workflows_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        for entry in std::fs::read_dir(&dir).context("Failed to read workflows directory")? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_saved(&path) {
                Ok(saved) => summaries.push(WorkflowSummary {
                    id: saved.workflow.id,
                    name: saved.workflow.name,
                    saved_at: saved.saved_at,
                    node_count: saved.workflow.nodes.len(),
                }),
                Err(e) => warn!("Skipping unreadable workflow {}: {:#}", path.display(), e),
            }
        }

        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(summaries)
    }

    /// Append a run's log entries to `runs/<workflow_id>/<run_id>.jsonl`.
    pub fn append_run_log(
        &self,
        workflow_id: Uuid,
        run_id: Uuid,
        entries: &[LogEntry],
    ) -> Result<PathBuf> {
        let dir = self.root.join("runs").join(workflow_id.to_string());
        std::fs::create_dir_all(&dir).context("Failed to create run log directory")?;
        let path = dir.join(format!("{}.jsonl", run_id));

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open run log")?;
        for entry in entries {
            let mut line = serde_json::to_string(entry).context("Failed to serialize log entry")?;
            line.push('\n');
            file.write_all(line.as_bytes())
                .context("Failed to write log entry")?;
        }

        Ok(path)
    }

    fn read_saved(path: &Path) -> Result<SavedWorkflow> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&data).context("Failed to parse workflow file")
    }
}
