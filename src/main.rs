//! Tekton Fabric - CI specialist messaging CLI
//!
//! The shell-facing entry point: send prompts, broadcast, manage forwards,
//! inspect health and the roster. Exit codes are stable for scripting:
//! 0 success (including per-target errors inside a broadcast), 1 invalid
//! invocation, 2 configuration error, 3 unknown specialist.

#![allow(clippy::too_many_lines)]

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::sync::Arc;
use tekton_fabric::{
    Discovery, Fabric, FabricConfig, FabricError, ForwardFormat, OrchestratorFacade, PortMapper,
    RoleName, ShellFacade,
};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "tekton-fabric",
    version,
    about = "Messaging fabric for Tekton CI specialists"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a prompt to one specialist
    Send {
        /// Specialist name (canonical, bare, or host:port)
        name: String,
        /// Prompt body (words are joined with spaces)
        #[arg(required = true)]
        body: Vec<String>,
    },
    /// Send a prompt to every specialist in the catalog
    Broadcast {
        /// Prompt body (words are joined with spaces)
        #[arg(required = true)]
        body: Vec<String>,
    },
    /// Manage the forwarding overlay
    Forward {
        #[command(subcommand)]
        action: ForwardAction,
    },
    /// Show fabric status: manifest, channels, forwards, roster
    Status,
    /// List specialists with health and model information
    List {
        /// Only specialists with this role
        #[arg(long)]
        role: Option<String>,
    },
    /// Show the current roster
    Roster,
    /// Hire a specialist into the roster
    Hire {
        /// Specialist to hire
        id: String,
        /// Role label; defaults to the catalog category
        role: Option<String>,
    },
    /// Remove a specialist from the roster
    Fire {
        /// Specialist to fire
        id: String,
    },
}

#[derive(Subcommand)]
enum ForwardAction {
    /// Divert a specialist's traffic to another specialist or a terminal
    Set {
        /// Source specialist
        name: String,
        /// Destination: specialist name or terminal (use terminal:<name> to force)
        destination: String,
        /// Wrap terminal deliveries as a JSON envelope
        #[arg(long)]
        json: bool,
    },
    /// Stop diverting a specialist's traffic
    Remove {
        /// Source specialist
        name: String,
    },
    /// Show all forwarding entries
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tekton_fabric=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

/// Maps the underlying fabric failure to the CLI's stable exit codes,
/// looking through any context layered on top.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<FabricError>() {
        Some(FabricError::Config { .. }) => 2,
        Some(FabricError::UnknownSpecialist { .. }) => 3,
        _ => 1,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mapper = PortMapper::from_env().context("fabric startup")?;
    let fabric = Arc::new(Fabric::new(FabricConfig::production(), mapper));
    let discovery = Arc::new(Discovery::new(fabric.mapper().clone(), fabric.config()));
    let shell = ShellFacade::new(Arc::clone(&fabric));
    let orchestrator = OrchestratorFacade::new(Arc::clone(&fabric), Arc::clone(&discovery));

    let outcome = dispatch(cli.command, &fabric, &discovery, &shell, &orchestrator).await;
    fabric.close().await;
    outcome
}

async fn dispatch(
    command: Command,
    fabric: &Arc<Fabric>,
    discovery: &Arc<Discovery>,
    shell: &ShellFacade,
    orchestrator: &OrchestratorFacade,
) -> Result<()> {
    match command {
        Command::Send { name, body } => {
            let reply = shell.send_name(&name, &body.join(" ")).await?;
            info!(latency_ms = reply.latency_ms, "send completed");
            println!("{}", reply.content);
        }
        Command::Broadcast { body } => {
            let results = shell.broadcast(&body.join(" ")).await?;
            let mut lines: Vec<_> = results.into_iter().collect();
            lines.sort_by(|a, b| a.0.cmp(&b.0));
            for (target, result) in lines {
                // Per-specialist failures render inline and still exit 0 so
                // scripts can parse the output uniformly.
                match result {
                    Ok(reply) => println!("{target}: {}", reply.content),
                    Err(err) => println!("{target}: ERROR: {err}"),
                }
            }
        }
        Command::Forward { action } => match action {
            ForwardAction::Set {
                name,
                destination,
                json,
            } => {
                let entry = shell.set_forward(&name, &destination, json)?;
                let mode = match entry.format {
                    ForwardFormat::JsonEnvelope => " (JSON mode)",
                    ForwardFormat::Plain => "",
                };
                println!("Forwarding {name} messages to {}{mode}", entry.destination);
            }
            ForwardAction::Remove { name } => {
                if shell.remove_forward(&name)? {
                    println!("Stopped forwarding {name}");
                } else {
                    println!("No forward set for {name}");
                }
            }
            ForwardAction::List => {
                let forwards = shell.list_forwards();
                if forwards.is_empty() {
                    println!("No forwards active");
                }
                for (source, entry) in forwards {
                    let mode = match entry.format {
                        ForwardFormat::JsonEnvelope => " [JSON]",
                        ForwardFormat::Plain => "",
                    };
                    println!("{source} -> {}{mode}", entry.destination);
                }
            }
        },
        Command::Status => {
            let manifest = discovery.manifest();
            println!("tekton-fabric {}", manifest.version);
            println!("endpoint formula: {}", manifest.endpoint_formula);
            println!(
                "component base {} / ai base {}",
                fabric.mapper().component_base(),
                fabric.mapper().ai_base()
            );
            println!("open channels: {}", fabric.channel_count());
            println!("forwards: {}", fabric.overlay().list().len());
            println!("rostered: {}", fabric.roster().entries().len());
        }
        Command::List { role } => {
            for summary in orchestrator.list(role.as_deref()).await {
                let health = match summary.healthy {
                    Some(true) => "healthy",
                    Some(false) => "unreachable",
                    None => "unknown",
                };
                let roles = summary.roles.join(",");
                let model = summary.model.as_deref().unwrap_or("-");
                println!(
                    "{:<18} {:<22} {health:<12} {roles:<14} {model}",
                    summary.id, summary.endpoint
                );
            }
        }
        Command::Roster => {
            let entries = orchestrator.roster();
            if entries.is_empty() {
                println!("Roster is empty");
            }
            for entry in entries {
                let role = entry.role.to_string();
                let perf = entry.performance;
                println!(
                    "{:<18} {role:<14} hired {} ({} requests, {} ok, {} failed)",
                    entry.specialist_id,
                    entry.hired_at.format("%Y-%m-%d %H:%M:%S"),
                    perf.requests,
                    perf.successes,
                    perf.failures
                );
            }
        }
        Command::Hire { id, role } => {
            let role = role
                .map(|role| {
                    RoleName::try_new(role).map_err(|err| FabricError::InvalidArgument {
                        message: format!("bad role: {err}"),
                    })
                })
                .transpose()?;
            let entry = orchestrator.hire(&id, role).await?;
            println!("Hired {} as {}", entry.specialist_id, entry.role);
        }
        Command::Fire { id } => {
            if orchestrator.fire(&id)? {
                println!("Fired {id}");
            } else {
                println!("{id} was not hired");
            }
        }
    }
    Ok(())
}
