//! shieldctl - operator CLI for Focus Shield.
//!
//! A thin client over the control server's loopback HTTP API. Exit codes:
//! 0 success, 1 request or server error, 2 policy refusal (hard lockout).

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Value, json};

/// Focus Shield control CLI.
#[derive(Parser, Debug)]
#[command(name = "shieldctl")]
#[command(version, about, long_about = None)]
struct Args {
    /// Base URL of the control server.
    #[arg(long, default_value = "http://127.0.0.1:7877")]
    server: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show shield status.
    Status,
    /// List blocked domains.
    Blocked,
    /// Add a domain to the blocklist.
    Block {
        /// Domain to block.
        domain: String,
    },
    /// Remove a domain from the blocklist.
    Unblock {
        /// Domain to unblock.
        domain: String,
    },
    /// Check whether a domain is blocked.
    Check {
        /// Domain to check.
        domain: String,
    },
    /// Grant a time-limited allowance.
    Grant {
        /// Domain to allow.
        domain: String,
        /// Allowance length in minutes (1-30).
        #[arg(long, default_value_t = 10)]
        minutes: u32,
        /// Why the exception is needed.
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Revoke an active allowance.
    Revoke {
        /// Domain to revoke.
        domain: String,
    },
    /// List active allowances.
    Allowances,
    /// Turn the shield on or off.
    Shield {
        /// `on` or `off`.
        state: String,
    },
    /// Manage the delay list.
    Delay {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Manage hard lockouts.
    Lock {
        #[command(subcommand)]
        action: LockAction,
    },
    /// Flush the system resolver cache.
    FlushDns,
}

#[derive(Subcommand, Debug)]
enum ListAction {
    /// List entries.
    Ls,
    /// Add a domain.
    Add {
        /// Domain to add.
        domain: String,
    },
    /// Remove a domain.
    Rm {
        /// Domain to remove.
        domain: String,
    },
}

#[derive(Subcommand, Debug)]
enum LockAction {
    /// List active lockouts.
    Ls,
    /// Install a lockout.
    Add {
        /// Domain to lock.
        domain: String,
        /// Expiry date (YYYY-MM-DD or RFC 3339).
        #[arg(long)]
        until: String,
    },
    /// Remove an expired lockout entry.
    Rm {
        /// Domain to remove.
        domain: String,
    },
}

enum Verb {
    Get,
    Post(Value),
    Delete,
}

fn call(client: &Client, base: &str, path: &str, verb: &Verb) -> Result<(StatusCode, Value)> {
    let url = format!("{base}{path}");
    let response = match verb {
        Verb::Get => client.get(&url).send(),
        Verb::Post(body) => client.post(&url).json(body).send(),
        Verb::Delete => client.delete(&url).send(),
    }
    .with_context(|| format!("request to {url} failed (is shield-server running?)"))?;

    let status = response.status();
    let body: Value = response.json().unwrap_or(Value::Null);
    Ok((status, body))
}

fn print_status(body: &Value) {
    let on = body["shield"].as_bool().unwrap_or(false);
    println!("shield:       {}", if on { "ON" } else { "off" });
    println!(
        "agent:        {}",
        if body["daemon_running"].as_bool().unwrap_or(false) {
            "running"
        } else {
            "UNREACHABLE"
        }
    );
    println!("blocked:      {}", body["blocked_count"]);
    println!("allowances:   {}", body["active_allowances"]);
}

fn print_domains(body: &Value) {
    match body["domains"].as_array() {
        Some(domains) if !domains.is_empty() => {
            for d in domains {
                println!("{}", d.as_str().unwrap_or_default());
            }
        },
        _ => println!("(none)"),
    }
}

fn print_allowances(body: &Value) {
    match body["allowances"].as_array() {
        Some(list) if !list.is_empty() => {
            for a in list {
                println!(
                    "{:<30} {:>3} min left  ({})",
                    a["domain"].as_str().unwrap_or_default(),
                    a["remaining_minutes"],
                    a["reason"].as_str().unwrap_or_default(),
                );
            }
        },
        _ => println!("(none)"),
    }
}

fn print_locks(body: &Value) {
    match body["locks"].as_array() {
        Some(list) if !list.is_empty() => {
            for l in list {
                println!(
                    "{:<30} until {}",
                    l["domain"].as_str().unwrap_or_default(),
                    l["until"].as_str().unwrap_or_default(),
                );
            }
        },
        _ => println!("(none)"),
    }
}

fn run(args: &Args, client: &Client) -> Result<(StatusCode, Value)> {
    let base = args.server.trim_end_matches('/');
    let (path, verb) = match &args.command {
        Command::Status => ("/status".to_string(), Verb::Get),
        Command::Blocked => ("/api/blocked".to_string(), Verb::Get),
        Command::Block { domain } => (
            "/api/block".to_string(),
            Verb::Post(json!({ "domain": domain })),
        ),
        Command::Unblock { domain } => (format!("/api/block/{domain}"), Verb::Delete),
        Command::Check { domain } => (format!("/api/check/{domain}"), Verb::Get),
        Command::Grant {
            domain,
            minutes,
            reason,
        } => (
            "/api/grant".to_string(),
            Verb::Post(json!({ "domain": domain, "minutes": minutes, "reason": reason })),
        ),
        Command::Revoke { domain } => (format!("/api/grant/{domain}"), Verb::Delete),
        Command::Allowances => ("/api/allowances".to_string(), Verb::Get),
        Command::Shield { state } => match state.as_str() {
            "on" => ("/api/shield/enable".to_string(), Verb::Post(json!({}))),
            "off" => ("/api/shield/disable".to_string(), Verb::Post(json!({}))),
            other => anyhow::bail!("shield takes `on` or `off`, got {other:?}"),
        },
        Command::Delay { action } => match action {
            ListAction::Ls => ("/api/delayed".to_string(), Verb::Get),
            ListAction::Add { domain } => (
                "/api/delay".to_string(),
                Verb::Post(json!({ "domain": domain })),
            ),
            ListAction::Rm { domain } => (format!("/api/delay/{domain}"), Verb::Delete),
        },
        Command::Lock { action } => match action {
            LockAction::Ls => ("/api/locks".to_string(), Verb::Get),
            LockAction::Add { domain, until } => (
                "/api/lock".to_string(),
                Verb::Post(json!({ "domain": domain, "until": until })),
            ),
            LockAction::Rm { domain } => (format!("/api/lock/{domain}"), Verb::Delete),
        },
        Command::FlushDns => ("/api/flush-dns".to_string(), Verb::Post(json!({}))),
    };
    call(client, base, &path, &verb)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let client = match Client::builder().timeout(Duration::from_secs(60)).build() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(1);
        },
    };

    let (status, body) = match run(&args, &client) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(1);
        },
    };

    if !status.is_success() {
        let message = body["error"].as_str().unwrap_or("request failed");
        eprintln!("refused ({}): {message}", status.as_u16());
        return if status == StatusCode::FORBIDDEN {
            ExitCode::from(2)
        } else {
            ExitCode::from(1)
        };
    }

    match &args.command {
        Command::Status => print_status(&body),
        Command::Blocked | Command::Delay { action: ListAction::Ls } => print_domains(&body),
        Command::Allowances => print_allowances(&body),
        Command::Lock {
            action: LockAction::Ls,
        } => print_locks(&body),
        Command::Check { .. } => {
            println!(
                "{}: {}",
                body["domain"].as_str().unwrap_or_default(),
                if body["blocked"].as_bool().unwrap_or(false) {
                    "BLOCKED".to_string()
                } else if body["allowance_minutes"].as_u64().unwrap_or(0) > 0 {
                    format!("allowed ({} min left)", body["allowance_minutes"])
                } else {
                    "not blocked".to_string()
                }
            );
        },
        _ => {
            println!("ok");
        },
    }
    ExitCode::SUCCESS
}
