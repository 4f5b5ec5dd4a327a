//! IPC request dispatch.
//!
//! Maps each [`AgentRequest`] to state mutation plus surface effects. The
//! mutation happens under the state lock and is persisted before any
//! surface work starts; surface work never runs while the lock is held.
//!
//! Error routing follows the surface contract: hosts failures come back as
//! [`AgentResponse::Error`] (the caller decides what that means for its
//! own reply), everything downstream of the hosts region is best-effort
//! and logged.

use std::sync::Arc;

use shield_core::domain;
use shield_core::ipc::{AgentRequest, AgentResponse};
use shield_core::policy::MAX_PRIVILEGED_GRANT_MINUTES;
use tracing::{info, warn};

use crate::enforcer::Enforcer;
use crate::state::AgentState;

fn error(message: impl Into<String>) -> AgentResponse {
    AgentResponse::Error {
        message: message.into(),
    }
}

/// Handles one request.
pub async fn handle(
    request: AgentRequest,
    state: &Arc<AgentState>,
    enforcer: &Arc<Enforcer>,
) -> AgentResponse {
    match request {
        AgentRequest::Blocklist { domains } => blocklist(state, enforcer, domains).await,
        AgentRequest::Grant {
            domain,
            minutes,
            reason,
        } => grant(state, enforcer, &domain, minutes, &reason).await,
        AgentRequest::Revoke { domain } => {
            revoke_cascade(state, enforcer, &domain, false).await
        },
        AgentRequest::EnforceBlock { domain } => {
            revoke_cascade(state, enforcer, &domain, true).await
        },
        AgentRequest::Enable => set_shield(state, enforcer, true).await,
        AgentRequest::Disable => set_shield(state, enforcer, false).await,
        AgentRequest::FlushDns => {
            enforcer.flush_dns().await;
            AgentResponse::Ok
        },
        AgentRequest::Clear => clear(state, enforcer).await,
        AgentRequest::Status => status(state),
    }
}

async fn reapply(state: &AgentState, enforcer: &Enforcer) -> Result<(), AgentResponse> {
    let shield = state.shield();
    let enforced = state.enforced_set();
    enforcer
        .apply_primary(shield, &enforced)
        .await
        .map_err(|e| error(format!("enforcement apply failed: {e}")))
}

async fn blocklist(
    state: &Arc<AgentState>,
    enforcer: &Arc<Enforcer>,
    domains: Vec<String>,
) -> AgentResponse {
    // The socket is world-writable; re-canonicalize defensively and keep
    // the valid entries rather than dropping the whole set.
    let mut set = std::collections::BTreeSet::new();
    for raw in domains {
        match domain::canonicalize(&raw) {
            Ok(d) => {
                set.insert(d);
            },
            Err(e) => warn!(domain = %raw, error = %e, "skipping invalid blocklist entry"),
        }
    }

    info!(count = set.len(), "blocklist replaced");
    if let Err(e) = state.set_domains(set) {
        return error(format!("state persist failed: {e}"));
    }
    if let Err(resp) = reapply(state, enforcer).await {
        return resp;
    }
    AgentResponse::Ok
}

async fn grant(
    state: &Arc<AgentState>,
    enforcer: &Arc<Enforcer>,
    raw: &str,
    minutes: u32,
    reason: &str,
) -> AgentResponse {
    let d = match domain::canonicalize(raw) {
        Ok(d) => d,
        Err(e) => return error(e.to_string()),
    };
    if minutes == 0 || minutes > MAX_PRIVILEGED_GRANT_MINUTES {
        return error(format!("minutes out of range: {minutes}"));
    }

    info!(domain = %d, minutes, "allowance recorded");
    if let Err(e) = state.record_allowance(&d, minutes, reason) {
        return error(format!("state persist failed: {e}"));
    }
    enforcer.lift_dynamic(&d).await;
    if let Err(resp) = reapply(state, enforcer).await {
        return resp;
    }
    enforcer.flush_dns().await;
    AgentResponse::Ok
}

/// The shared revoke / enforce-block cascade.
///
/// `insert` distinguishes a freshly blocked domain (which must join the
/// mirror) from a revocation (which only drops the allowance).
async fn revoke_cascade(
    state: &Arc<AgentState>,
    enforcer: &Arc<Enforcer>,
    raw: &str,
    insert: bool,
) -> AgentResponse {
    let d = match domain::canonicalize(raw) {
        Ok(d) => d,
        Err(e) => return error(e.to_string()),
    };

    if insert {
        if let Err(e) = state.insert_domain(&d) {
            return error(format!("state persist failed: {e}"));
        }
    }
    match state.drop_allowance(&d) {
        Ok(existed) => info!(domain = %d, had_allowance = existed, "re-blocking"),
        Err(e) => return error(format!("state persist failed: {e}")),
    }

    if let Err(resp) = reapply(state, enforcer).await {
        return resp;
    }
    enforcer.aggressive_block(&d).await;
    AgentResponse::Ok
}

async fn set_shield(
    state: &Arc<AgentState>,
    enforcer: &Arc<Enforcer>,
    on: bool,
) -> AgentResponse {
    info!(shield = on, "shield toggled");
    if let Err(e) = state.set_shield(on) {
        return error(format!("state persist failed: {e}"));
    }
    if let Err(resp) = reapply(state, enforcer).await {
        return resp;
    }
    enforcer.flush_dns().await;
    AgentResponse::Ok
}

async fn clear(state: &Arc<AgentState>, enforcer: &Arc<Enforcer>) -> AgentResponse {
    info!("clearing shield and allowances");
    if let Err(e) = state.clear() {
        return error(format!("state persist failed: {e}"));
    }
    if let Err(resp) = reapply(state, enforcer).await {
        return resp;
    }
    AgentResponse::Ok
}

fn status(state: &Arc<AgentState>) -> AgentResponse {
    let mirror = state.snapshot();
    AgentResponse::Status {
        running: true,
        shield: mirror.shield,
        blocked_count: mirror.domains.len(),
        active_allowances: state.allowance_infos(),
    }
}
