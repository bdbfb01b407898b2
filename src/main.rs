use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cogflow_core::config::{AppConfig, ModelConfig};
use cogflow_core::event::EventBus;
use cogflow_core::types::{FlowEvent, SelectionState};

use cogflow_engine::{FlowEngine, FlowGraph, FlowStore, NodeStatus, RunOutcome};

#[derive(Parser)]
#[command(name = "cogflow", version, about = "Run graphs of LLM reasoning steps")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "cogflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a flow graph end to end
    Run {
        /// Flow graph JSON file
        flow: PathBuf,
        /// Write the final per-node state to this file as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a flow graph and print its execution order
    Validate {
        /// Flow graph JSON file
        flow: PathBuf,
    },
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "cogflow", &mut io::stdout());
        return Ok(());
    }

    let config = match &cli.command {
        Commands::Validate { .. } => None,
        _ => Some(
            AppConfig::load(&cli.config)
                .with_context(|| format!("loading {}", cli.config.display()))?,
        ),
    };

    let fallback_filter = config
        .as_ref()
        .map(|c| c.log.filter.clone())
        .unwrap_or_else(|| "cogflow=info,warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_filter)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match (cli.command, config) {
        (Commands::Validate { flow }, _) => validate(&flow),
        (Commands::Config, Some(config)) => {
            println!("{}", toml::to_string_pretty(&redacted(config))?);
            Ok(())
        }
        (Commands::Run { flow, output }, Some(config)) => {
            run(&config, &flow, output.as_deref()).await
        }
        (Commands::Completions { .. }, _) => unreachable!("handled before config load"),
        (_, None) => unreachable!("config loaded for every other command"),
    }
}

fn validate(flow: &Path) -> anyhow::Result<()> {
    let graph =
        FlowGraph::load(flow).with_context(|| format!("reading {}", flow.display()))?;
    let order = graph.validate()?;
    println!(
        "{}: {} nodes, {} edges",
        flow.display(),
        graph.nodes().len(),
        graph.edges().len()
    );
    for edge in graph.dangling_edges() {
        println!("  warning: edge {} references an unknown node", edge.id);
    }
    println!("Execution order:");
    for (i, id) in order.iter().enumerate() {
        let node = graph.node(id);
        let marker = if graph.branches_at(id) { " [choose]" } else { "" };
        let label = node.map(|n| n.label.as_str()).unwrap_or_default();
        println!("  {:>3}. {} {}{}", i + 1, id, label, marker);
    }
    Ok(())
}

async fn run(config: &AppConfig, flow: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let graph =
        FlowGraph::load(flow).with_context(|| format!("reading {}", flow.display()))?;

    let llm = cogflow_llm::create_generator(config)?;
    let selector = cogflow_llm::create_selector(config, llm.clone())?;
    let engine = FlowEngine::new(llm, selector, config.model.clone());

    let event_bus = Arc::new(EventBus::new(config.engine.event_capacity));
    let store = FlowStore::new(graph, event_bus.clone());

    // Spawn event printer
    let mut rx = event_bus.subscribe();
    let print_handle = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(FlowEvent::NodeResponse {
                    node_id,
                    text,
                    loading: false,
                }) => {
                    println!("── {} ──", node_id);
                    if text.is_empty() {
                        println!("(no response)");
                    } else {
                        println!("{}", text);
                    }
                    println!();
                    io::stdout().flush().ok();
                }
                Ok(FlowEvent::NodeSelection {
                    node_id,
                    state: SelectionState::Skipped,
                }) => {
                    eprintln!("[{}: skipped]", node_id);
                }
                Ok(FlowEvent::RunComplete { .. }) | Ok(FlowEvent::RunFailed { .. }) => break,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("[{} progress events dropped]", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let outcome = store.run_flow(&engine).await;
    print_handle.await.ok();

    let summary = match outcome {
        Ok(RunOutcome::Finished(summary)) => summary,
        Ok(RunOutcome::AlreadyRunning) => anyhow::bail!("a run is already in progress"),
        Err(e) => {
            error!(error = %e, "Flow run failed");
            return Err(e.into());
        }
    };

    println!(
        "Run {}: {} completed, {} failed, {} skipped in {} ms",
        summary.run_id,
        summary.count(NodeStatus::Completed),
        summary.count(NodeStatus::Failed),
        summary.count(NodeStatus::Skipped),
        summary.elapsed_ms
    );
    for result in summary.results.iter().filter(|r| r.status == NodeStatus::Failed) {
        eprintln!(
            "  {} failed: {}",
            result.node_id,
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    if let Some(path) = output {
        let nodes: BTreeMap<_, _> = store.node_states().into_iter().collect();
        let report = serde_json::json!({
            "summary": summary,
            "nodes": nodes,
        });
        std::fs::write(path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "Wrote run results");
    }
    Ok(())
}

fn redact(model: &mut ModelConfig) {
    if model.api_key.is_some() {
        model.api_key = Some("********".into());
    }
}

fn redacted(mut config: AppConfig) -> AppConfig {
    redact(&mut config.model);
    if let Some(model) = config.branch_model.as_mut() {
        redact(model);
    }
    config.fallback_models.iter_mut().for_each(redact);
    config
}
