//! vana-gateway: VANA coordination gateway binary
//!
//! Usage:
//!   vana-gateway                  - Start interactive routing CLI
//!   vana-gateway --route <task>   - Route one task and print the decision
//!   vana-gateway --agents         - Probe agents and print their status
//!   vana-gateway --help           - Show help

mod cli;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vana_core::agents::{AgentStatus, HttpReachability, StatusReporter, TaskRequest};
use vana_core::{AgentRegistry, Config, Coordinator};

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Interactive CLI mode
    Cli,
    /// Route a single task
    Route(String),
    /// Print the agent roster with probed status
    Agents,
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = parse_args(&args);

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("vana-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Logs go to stderr so decisions on stdout stay machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting vana-gateway...");
    tracing::info!(
        "Limits: max_hops={}, max_repeat_transfers={}, fallback={}",
        config.coordinator.max_hops,
        config.coordinator.max_repeat_transfers,
        config.coordinator.fallback_agent
    );

    let registry = Arc::new(
        AgentRegistry::from_agents(config.descriptors())
            .map_err(|e| anyhow::anyhow!("Failed to register agents: {}", e))?,
    );
    tracing::info!("Registered {} agents: {:?}", registry.len(), registry.names());

    let check = HttpReachability::new(Duration::from_secs(config.health.timeout_secs))
        .map_err(|e| anyhow::anyhow!("Failed to create health client: {}", e))?;
    let reporter = StatusReporter::new(Arc::clone(&registry), Arc::new(check));
    reporter
        .probe_all()
        .await
        .map_err(|e| anyhow::anyhow!("Initial health probe failed: {}", e))?;

    let coordinator = Coordinator::new(Arc::clone(&registry), config.coordinator.clone());

    match mode {
        RunMode::Route(description) => run_route(&coordinator, &description),
        RunMode::Agents => {
            print_agents(&coordinator)?;
            Ok(())
        }
        RunMode::Cli => cli::run_cli(coordinator, reporter).await,
        RunMode::Help | RunMode::Version => Ok(()),
    }
}

/// Parse command line arguments
fn parse_args(args: &[String]) -> RunMode {
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--route" | "-r" => {
                let description = iter.by_ref().cloned().collect::<Vec<_>>().join(" ");
                if description.trim().is_empty() {
                    return RunMode::Help;
                }
                return RunMode::Route(description);
            }
            "--agents" | "-a" => return RunMode::Agents,
            "--cli" | "-c" => return RunMode::Cli,
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            _ => {}
        }
    }

    RunMode::Cli
}

/// Print help message
fn print_help() {
    println!("vana-gateway - VANA multi-agent task router");
    println!();
    println!("Usage:");
    println!("  vana-gateway                 Start interactive routing CLI");
    println!("  vana-gateway --route <task>  Route one task and print the decision as JSON");
    println!("  vana-gateway --agents        Print agents and their status as JSON");
    println!("  vana-gateway --help          Show this help message");
    println!("  vana-gateway --version       Show version");
    println!();
    println!("Environment Variables:");
    println!("  VANA_CONFIG_PATH             Config file (default: ./vana.toml)");
    println!("  VANA_MAX_HOPS                Delegations per conversation (default: 6)");
    println!("  VANA_MAX_REPEAT_TRANSFERS    Transfers between two agents (default: 2)");
    println!("  VANA_FALLBACK_AGENT          Agent for unmatched tasks (default: vana)");
    println!("  VANA_ROOT_AGENT              Agent answering halted tasks (default: root)");
    println!("  VANA_HEALTH_TIMEOUT_SECS     Health probe timeout (default: 5)");
}

/// Route one task from the root agent
fn run_route(coordinator: &Coordinator, description: &str) -> anyhow::Result<()> {
    let task = TaskRequest::builder(description)
        .requester(coordinator.config().root_agent.clone())
        .build();

    let decision = coordinator.route(&task)?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

#[derive(Serialize)]
struct AgentView<'a> {
    name: &'a str,
    status: AgentStatus,
    capabilities: Vec<&'a str>,
}

fn print_agents(coordinator: &Coordinator) -> anyhow::Result<()> {
    let agents = coordinator.discover();
    let views: Vec<AgentView<'_>> = agents
        .iter()
        .map(|a| AgentView {
            name: &a.name,
            status: a.status,
            capabilities: a.capabilities.iter().map(String::as_str).collect(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}
