//! shield-agent - Focus Shield enforcement agent.
//!
//! The privileged half of Focus Shield. Owns the hosts override region,
//! the packet-filter anchor, connection kills, and browser tab closes;
//! serves the policy IPC socket; sweeps expired allowances.
//!
//! # Lifecycle
//!
//! `initializing → restoring → serving → draining`. Restoration reapplies
//! the hosts region and the filter anchor from the persisted mirror
//! *before* the socket is bound: if the agent crashed while the shield was
//! on, the machine comes back blocked, never open. A restoration failure
//! is fatal; the service supervisor restarts us and we try again.
//!
//! The agent never forks; it is expected to run under launchd (or an
//! equivalent supervisor) with restart-on-failure.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use shield_agent::enforcer::{Enforcer, EnforcerConfig};
use shield_agent::state::AgentState;
use shield_agent::{ipc_server, sweep};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Focus Shield enforcement agent.
#[derive(Parser, Debug)]
#[command(name = "shield-agent")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the IPC Unix socket.
    #[arg(long, default_value = "/var/run/focus-shield.sock")]
    socket: PathBuf,

    /// Path to the agent's persisted state mirror.
    #[arg(long, default_value = "/var/db/focus-shield/agent-state.json")]
    state_file: PathBuf,

    /// Path to the OS hosts file.
    #[arg(long, default_value = "/etc/hosts")]
    hosts_file: PathBuf,

    /// Path to the main packet-filter configuration.
    #[arg(long, default_value = "/etc/pf.conf")]
    pf_conf: PathBuf,

    /// Path to the pf anchor file the agent owns.
    #[arg(long, default_value = "/etc/pf.anchors/focus.shield")]
    anchor_file: PathBuf,

    /// Skip all external commands (pfctl, osascript, dig, cache flush).
    /// File artifacts are still written. For development and tests.
    #[arg(long)]
    no_commands: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stdout.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_tracing(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(log_file) = &args.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .context("failed to open log file")?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    info!(socket = ?args.socket, state = ?args.state_file, "agent initializing");

    let state = Arc::new(
        AgentState::load(&args.state_file).context("failed to load agent state mirror")?,
    );
    let enforcer = Arc::new(Enforcer::new(EnforcerConfig {
        hosts_path: args.hosts_file.clone(),
        anchor_path: args.anchor_file.clone(),
        pf_conf_path: args.pf_conf.clone(),
        flush_interface: std::env::var("SHIELD_FLUSH_INTERFACE").ok(),
        external_commands: !args.no_commands,
    }));

    // Restoring: reapply enforcement from the mirror before the socket
    // exists. A failure here is fatal; coming up open is not an option.
    let mirror = state.snapshot();
    if mirror.shield && !mirror.domains.is_empty() {
        info!(domains = mirror.domains.len(), "restoring enforcement");
        enforcer
            .apply_primary(true, &state.enforced_set())
            .await
            .context("failed to restore enforcement surfaces")?;
    } else {
        info!(shield = mirror.shield, "nothing to restore");
    }

    // Serving.
    let sweeper = tokio::spawn(sweep::run(
        Arc::clone(&state),
        Arc::clone(&enforcer),
        sweep::SWEEP_PERIOD,
    ));

    let signal_state = Arc::clone(&state);
    let signal_task = tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
        signal_state.request_shutdown();
    });

    info!("agent serving");
    ipc_server::run(args.socket.clone(), Arc::clone(&state), Arc::clone(&enforcer)).await?;

    // Draining: the accept loop has closed the socket; flush state and
    // stop the timers.
    info!("agent draining");
    signal_task.abort();
    if let Err(e) = state.prune_expired() {
        warn!(error = %e, "final state flush failed");
    }
    let _ = sweeper.await;

    info!("agent shutdown complete");
    Ok(())
}
