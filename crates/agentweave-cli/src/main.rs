use std::path::{Path, PathBuf};

use agentweave_core::storage::WorkflowStore;
use agentweave_core::{
    AgentDefinition, LogKind, StaticAgentRegistry, UserProfile, Workflow, lint_workflow,
    validate_all,
};
use agentweave_engine::{ExecutorCommand, ExecutorConfig, ExecutorEvent, RunStatus, WorkflowExecutor};
use agentweave_llm::{LlmConfig, synthesize_graph};
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "agentweave", version, about = "Run and author LLM agent workflows")]
struct Cli {
    /// Also write JSON logs to this directory, rotated daily
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a workflow for structural errors and authoring warnings
    Validate {
        /// Workflow JSON file
        workflow: PathBuf,
    },
    /// Execute a workflow once
    Run {
        /// Workflow JSON file, or a saved workflow id (with --store)
        workflow: String,
        /// The triggering message
        #[arg(short, long)]
        input: String,
        /// User profile entry, repeatable
        #[arg(short, long = "profile", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        profile: Vec<(String, String)>,
        /// JSON file with a list of agent personas
        #[arg(long)]
        agents: Option<PathBuf>,
        /// Store directory; the run log is appended under it
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long, default_value_t = ExecutorConfig::default().max_steps)]
        max_steps: usize,
        #[arg(long, default_value_t = ExecutorConfig::default().step_timeout_ms)]
        step_timeout_ms: u64,
        #[command(flatten)]
        llm: LlmArgs,
    },
    /// Propose a workflow graph from a description
    Synthesize {
        description: String,
        /// Language for node names and instructions
        #[arg(long, default_value = "English")]
        language: String,
        /// Write the workflow here instead of printing it
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[command(flatten)]
        llm: LlmArgs,
    },
    /// Save a workflow file into the store and print its id
    Save {
        workflow: PathBuf,
        #[arg(long, default_value = ".agentweave")]
        store: PathBuf,
    },
    /// List saved workflows
    List {
        #[arg(long, default_value = ".agentweave")]
        store: PathBuf,
    },
}

#[derive(Args)]
struct LlmArgs {
    /// OpenAI-compatible endpoint
    #[arg(long, env = "AGENTWEAVE_BASE_URL")]
    base_url: Option<String>,
    #[arg(long, env = "AGENTWEAVE_MODEL")]
    model: Option<String>,
    #[arg(long, env = "AGENTWEAVE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

impl LlmArgs {
    fn into_config(self) -> LlmConfig {
        let mut config = LlmConfig::default();
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        config.api_key = self.api_key;
        config
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    Ok((key.trim().to_string(), value.to_string()))
}

fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).context("Failed to create log directory")?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("agentweave")
                .filename_suffix("log")
                .build(dir)
                .context("Failed to create log file appender")?;
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

fn read_workflow(path: &Path) -> Result<Workflow> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

/// A path, or a saved workflow id when a store is given.
fn resolve_workflow(reference: &str, store: Option<&WorkflowStore>) -> Result<Workflow> {
    if let (Some(store), Ok(id)) = (store, Uuid::parse_str(reference)) {
        return store.load(id);
    }
    read_workflow(Path::new(reference))
}

fn read_agents(path: &Path) -> Result<StaticAgentRegistry> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let agents: Vec<AgentDefinition> =
        serde_json::from_str(&json).context("Failed to parse agent definitions")?;
    Ok(agents.into_iter().collect())
}

fn validate(path: &Path) -> Result<()> {
    let workflow = read_workflow(path)?;

    let errors = validate_all(&workflow.nodes, &workflow.edges);
    for error in &errors {
        println!("error: {}", error);
    }
    for warning in lint_workflow(&workflow) {
        println!("warning: {}", warning);
    }

    if !errors.is_empty() {
        bail!("{} has {} error(s)", path.display(), errors.len());
    }
    println!(
        "{}: ok ({} nodes, {} edges)",
        workflow.name,
        workflow.nodes.len(),
        workflow.edges.len()
    );
    Ok(())
}

async fn run(
    reference: &str,
    input: String,
    profile: Vec<(String, String)>,
    agents: Option<PathBuf>,
    store: Option<PathBuf>,
    config: ExecutorConfig,
    llm: LlmConfig,
) -> Result<()> {
    let store = store.map(WorkflowStore::new);
    let workflow = resolve_workflow(reference, store.as_ref())?;
    let agents = match agents {
        Some(path) => read_agents(&path)?,
        None => StaticAgentRegistry::new(),
    };
    let user_profile: UserProfile = profile.into_iter().collect();

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let (command_tx, command_rx) = mpsc::channel(1);

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                ExecutorEvent::Log(entry) if entry.kind == LogKind::Output => {
                    debug!("output from {:?}", entry.node_id);
                }
                ExecutorEvent::EdgeTraversed(edge_id) => debug!("traversed {}", edge_id),
                _ => {}
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, stopping after the current step");
            let _ = command_tx.send(ExecutorCommand::Stop).await;
        }
    });

    let executor = WorkflowExecutor::new(workflow, llm, agents, config, event_tx);
    let report = executor.run(input, user_profile, command_rx).await?;
    let workflow_id = executor.workflow().id;
    drop(executor);
    printer.await.ok();

    if let Some(store) = &store {
        let path = store.append_run_log(workflow_id, report.run_id, report.log.entries())?;
        info!("Run log written to {}", path.display());
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize run report")?
    );

    match &report.status {
        RunStatus::Completed | RunStatus::DeadEnd { .. } | RunStatus::Stopped => Ok(()),
        RunStatus::Failed { node_id, error } => bail!("Node {} failed: {}", node_id, error),
        RunStatus::StepLimit { max_steps } => bail!("Run exceeded {} steps", max_steps),
    }
}

/// Only structurally valid graphs get an id in the store.
fn save(path: &Path, store: PathBuf) -> Result<()> {
    let workflow = read_workflow(path)?;
    let errors = validate_all(&workflow.nodes, &workflow.edges);
    if !errors.is_empty() {
        for error in &errors {
            println!("error: {}", error);
        }
        bail!("Refusing to save {}: {} error(s)", path.display(), errors.len());
    }
    let id = WorkflowStore::new(store).save(&workflow)?;
    println!("{}", id);
    Ok(())
}

async fn synthesize(
    description: &str,
    language: &str,
    out: Option<PathBuf>,
    llm: LlmConfig,
) -> Result<()> {
    let proposal = synthesize_graph(description, language, llm).await?;

    let mut workflow = Workflow::new(proposal.name.clone());
    let warnings = proposal
        .install(&mut workflow)
        .context("Synthesized graph failed validation")?;
    for warning in &warnings {
        warn!("{}", warning);
    }
    for lint in lint_workflow(&workflow) {
        warn!("{}", lint);
    }

    let json = serde_json::to_string_pretty(&workflow).context("Failed to serialize workflow")?;
    match out {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Validate { workflow } => validate(&workflow),
        Commands::Run {
            workflow,
            input,
            profile,
            agents,
            store,
            max_steps,
            step_timeout_ms,
            llm,
        } => {
            let config = ExecutorConfig {
                max_steps,
                step_timeout_ms,
            };
            run(
                &workflow,
                input,
                profile,
                agents,
                store,
                config,
                llm.into_config(),
            )
            .await
        }
        Commands::Synthesize {
            description,
            language,
            out,
            llm,
        } => synthesize(&description, &language, out, llm.into_config()).await,
        Commands::Save { workflow, store } => save(&workflow, store),
        Commands::List { store } => {
            for summary in WorkflowStore::new(store).list()? {
                println!(
                    "{}  {}  {} nodes  saved {}",
                    summary.id,
                    summary.name,
                    summary.node_count,
                    summary.saved_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentweave_core::{NodeKind, Position};

    fn write_workflow(dir: &Path, file: &str, workflow: &Workflow) -> PathBuf {
        let path = dir.join(file);
        std::fs::write(&path, serde_json::to_string(workflow).unwrap()).unwrap();
        path
    }

    #[test]
    fn save_stores_valid_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_workflow(dir.path(), "ok.json", &Workflow::starter("ok"));
        let store = dir.path().join("store");

        save(&path, store.clone()).unwrap();

        let saved = WorkflowStore::new(store).list().unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].name, "ok");
    }

    #[test]
    fn save_refuses_invalid_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let mut workflow = Workflow::new("no entry");
        workflow.add_node(NodeKind::End, Position::default());
        let path = write_workflow(dir.path(), "broken.json", &workflow);
        let store = dir.path().join("store");

        let err = save(&path, store.clone()).unwrap_err();

        assert!(err.to_string().contains("1 error(s)"));
        assert!(WorkflowStore::new(store).list().unwrap().is_empty());
    }
}
