//! shield-server - Focus Shield control server.
//!
//! The unprivileged policy front end: loads the authoritative policy
//! store, exposes the HTTP API on loopback, and drives the privileged
//! agent over its IPC socket. Expected to run under a service supervisor;
//! it never forks.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use shield_core::categories::{self, Category};
use shield_core::policy::PolicyStore;
use shield_server::agent_client::AgentClient;
use shield_server::state::ServerState;
use shield_server::token::ApiToken;
use shield_server::{routes, ticker};
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Focus Shield control server.
#[derive(Parser, Debug)]
#[command(name = "shield-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Loopback address to listen on.
    #[arg(long, default_value = "127.0.0.1:7877")]
    listen: SocketAddr,

    /// Path to the agent's IPC Unix socket.
    #[arg(long, default_value = "/var/run/focus-shield.sock")]
    agent_socket: PathBuf,

    /// Path to the policy file (defaults to the platform data directory).
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Path to the bearer token file (defaults to `SHIELD_TOKEN_PATH` or
    /// the platform data directory).
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Seed every category bundle instead of the default set
    /// (also `SHIELD_ALL_CATEGORIES=1`).
    #[arg(long)]
    all_categories: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log to file instead of stdout.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn data_dir() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
    if cfg!(target_os = "macos") {
        home.join("Library/Application Support/Focus Shield")
    } else {
        std::env::var_os("XDG_DATA_HOME")
            .map_or_else(|| home.join(".local/share"), PathBuf::from)
            .join("focus-shield")
    }
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

async fn shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = ctrl_c => info!("received interrupt"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args)?;

    let state_path = args
        .state_file
        .clone()
        .unwrap_or_else(|| data_dir().join("policy.json"));
    let token_path = args
        .token_file
        .clone()
        .or_else(|| std::env::var_os("SHIELD_TOKEN_PATH").map(PathBuf::from))
        .unwrap_or_else(|| data_dir().join("token"));

    let all_categories = args.all_categories
        || std::env::var("SHIELD_ALL_CATEGORIES").is_ok_and(|v| v == "1" || v == "true");
    let seed = if all_categories {
        categories::seed_domains(&Category::ALL)
    } else {
        categories::default_seed()
    };

    let store =
        PolicyStore::load_or_seed(&state_path, seed).context("failed to load policy store")?;
    let token =
        ApiToken::load_or_generate(&token_path).context("failed to load bearer token")?;
    let agent = AgentClient::new(&args.agent_socket);

    let state = Arc::new(ServerState::new(store, agent, token));

    info!(
        listen = %args.listen,
        agent_socket = ?args.agent_socket,
        policy = ?state_path,
        "control server starting"
    );

    // Push current policy to the agent (and enable if the shield is on).
    state.sync_agent().await;

    let ticker_task = tokio::spawn(ticker::run(Arc::clone(&state), ticker::TICK_PERIOD));

    let app = routes::router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .context("failed to bind listen address")?;
    info!("policy API listening on {}", args.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    ticker_task.abort();
    info!("control server shutdown complete");
    Ok(())
}
