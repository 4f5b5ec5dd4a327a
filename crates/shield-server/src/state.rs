//! Shared server state and the policy actions behind every endpoint.
//!
//! Both the REST surface and the remote tool surface are thin wrappers
//! over the methods here, so the two stay behaviorally identical.
//!
//! # Drive rules
//!
//! Errors route by the direction of the mutation (default-deny):
//!
//! - *Enforcement-reducing* calls (grant, unblock, shield off) reach the
//!   agent first; policy is persisted only after the agent ack, so
//!   persisted state and applied state can only drift in the direction
//!   that keeps things blocked.
//! - *Enforcement-increasing* calls (block, revoke, shield on) persist
//!   first and report success even when the agent drive fails; the
//!   failure is logged and the agent's restore path or the next drive
//!   catches up.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shield_core::domain;
use shield_core::policy::{
    Allowance, HardLockout, MAX_PRIVILEGED_GRANT_MINUTES, MAX_PUBLIC_GRANT_MINUTES, PolicyStore,
};
use tracing::{info, warn};

use crate::agent_client::AgentClient;
use crate::error::ApiError;
use crate::token::ApiToken;

/// `GET /status` body.
#[derive(Debug, Serialize)]
pub struct StatusPayload {
    /// The control server is answering.
    pub running: bool,
    /// Shield flag from the policy store.
    pub shield: bool,
    /// Whether the enforcement agent answered a status probe.
    pub daemon_running: bool,
    /// Number of blocked domains.
    pub blocked_count: usize,
    /// Number of active allowances.
    pub active_allowances: usize,
}

/// `GET /api/check/{domain}` body.
#[derive(Debug, Serialize)]
pub struct CheckPayload {
    /// Canonical form of the queried domain.
    pub domain: String,
    /// Whether the query is blocked right now.
    pub blocked: bool,
    /// Whole minutes remaining on a covering allowance, else 0.
    pub allowance_minutes: u32,
    /// Shield flag.
    pub shield_active: bool,
    /// Whether a hard lockout covers the domain.
    pub locked: bool,
}

/// One allowance in `GET /api/allowances`.
#[derive(Debug, Serialize)]
pub struct AllowancePayload {
    /// Canonical domain.
    pub domain: String,
    /// Reason given at grant time.
    pub reason: String,
    /// Originally granted minutes.
    pub granted_minutes: u32,
    /// Whole minutes remaining, rounded up.
    pub remaining_minutes: u32,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
}

impl AllowancePayload {
    fn from_allowance(a: &Allowance, now: DateTime<Utc>) -> Self {
        Self {
            domain: a.domain.clone(),
            reason: a.reason.clone(),
            granted_minutes: a.granted_minutes,
            remaining_minutes: a.remaining_minutes(now),
            expires_at: a.expires_at,
        }
    }
}

/// One lockout in `GET /api/locks`.
#[derive(Debug, Serialize)]
pub struct LockPayload {
    /// Canonical domain.
    pub domain: String,
    /// Expiry instant.
    pub until: DateTime<Utc>,
}

/// Shared state behind every handler.
pub struct ServerState {
    /// The authoritative policy store.
    pub store: PolicyStore,
    /// IPC client for the enforcement agent.
    pub agent: AgentClient,
    /// Bearer token for the remote tool surface.
    pub token: ApiToken,
}

impl ServerState {
    /// Bundles the parts into a server state.
    #[must_use]
    pub fn new(store: PolicyStore, agent: AgentClient, token: ApiToken) -> Self {
        Self {
            store,
            agent,
            token,
        }
    }

    fn ensure_not_locked(&self, canonical: &str) -> Result<(), ApiError> {
        if let Some(until) = self.store.hard_lock_until(canonical)? {
            return Err(ApiError::LockoutRefusal {
                domain: canonical.to_string(),
                until,
            });
        }
        Ok(())
    }

    /// Pushes the current effective set to the agent.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::AgentUnavailable`] on any IPC failure.
    pub async fn drive_blocklist(&self) -> Result<(), ApiError> {
        let effective = self.store.effective_block_set();
        self.agent.blocklist(&effective).await?;
        Ok(())
    }

    /// Startup synchronization: probe the agent, push the effective set,
    /// then enable if the persisted shield flag is on. Failures are
    /// logged; the server still comes up and retries on the next
    /// mutation.
    pub async fn sync_agent(&self) {
        match self.agent.status().await {
            Ok(status) => info!(
                agent_shield = status.shield,
                agent_blocked = status.blocked_count,
                "agent reachable"
            ),
            Err(e) => {
                warn!(error = %e, "agent unreachable at startup");
                return;
            },
        }

        if let Err(e) = self.drive_blocklist().await {
            warn!(error = %e, "startup blocklist push failed");
            return;
        }
        if self.store.shield() {
            if let Err(e) = self.agent.enable().await {
                warn!(error = %e, "startup shield enable failed");
            }
        }
    }

    /// `GET /status`.
    pub async fn status(&self) -> StatusPayload {
        let daemon_running = self.agent.status().await.is_ok();
        let doc = self.store.snapshot();
        StatusPayload {
            running: true,
            shield: doc.shield,
            daemon_running,
            blocked_count: doc.blocklist.len(),
            active_allowances: self.store.active_allowances().len(),
        }
    }

    /// The sorted blocklist.
    #[must_use]
    pub fn blocked_domains(&self) -> Vec<String> {
        self.store.snapshot().blocklist.into_iter().collect()
    }

    /// Adds a domain to the blocklist and drives the aggressive cascade.
    ///
    /// Adding to the block set is always safe, so the policy persists even
    /// when the agent drive fails.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure only.
    pub async fn add_block(&self, raw: &str) -> Result<String, ApiError> {
        let d = domain::canonicalize(raw).map_err(|e| ApiError::Validation(e.to_string()))?;
        self.store.add_block(&d)?;
        info!(domain = %d, "domain blocked");

        if let Err(e) = self.drive_blocklist().await {
            warn!(domain = %d, error = %e, "agent drive failed; will catch up");
            return Ok(d);
        }
        if let Err(e) = self.agent.enforce_block(&d).await {
            warn!(domain = %d, error = %e, "enforce-block cascade failed");
        }
        Ok(d)
    }

    /// Removes a domain from the blocklist.
    ///
    /// Refused while hard-locked. The agent applies the reduced set
    /// before anything is persisted.
    ///
    /// # Errors
    ///
    /// Lockout refusal, validation, agent unavailability, or persistence
    /// failure.
    pub async fn remove_block(&self, raw: &str) -> Result<String, ApiError> {
        let d = domain::canonicalize(raw).map_err(|e| ApiError::Validation(e.to_string()))?;
        self.ensure_not_locked(&d)?;

        let mut prospective: BTreeSet<String> = self.store.effective_block_set();
        prospective.remove(&d);
        self.agent.blocklist(&prospective).await?;

        self.store.remove_block(&d)?;
        info!(domain = %d, "domain unblocked");
        if let Err(e) = self.agent.flush_dns().await {
            warn!(error = %e, "resolver flush after unblock failed");
        }
        Ok(d)
    }

    /// `GET /api/check/{domain}`.
    ///
    /// # Errors
    ///
    /// Validation failure.
    pub fn check(&self, raw: &str) -> Result<CheckPayload, ApiError> {
        let d = domain::canonicalize(raw).map_err(|e| ApiError::Validation(e.to_string()))?;
        Ok(CheckPayload {
            blocked: self.store.is_blocked(&d)?,
            allowance_minutes: self.store.remaining_minutes(&d)?,
            shield_active: self.store.shield(),
            locked: self.store.hard_lock_until(&d)?.is_some(),
            domain: d,
        })
    }

    /// Grants an allowance.
    ///
    /// Refused while hard-locked. `privileged` raises the cap from the
    /// public 30 minutes to 24 hours. The agent applies the exception
    /// before the allowance is persisted.
    ///
    /// # Errors
    ///
    /// Lockout refusal, validation, agent unavailability, or persistence
    /// failure.
    pub async fn grant(
        &self,
        raw: &str,
        minutes: u32,
        reason: &str,
        privileged: bool,
    ) -> Result<Allowance, ApiError> {
        let d = domain::canonicalize(raw).map_err(|e| ApiError::Validation(e.to_string()))?;
        self.ensure_not_locked(&d)?;

        let cap = if privileged {
            MAX_PRIVILEGED_GRANT_MINUTES
        } else {
            MAX_PUBLIC_GRANT_MINUTES
        };
        if minutes == 0 || minutes > cap {
            return Err(ApiError::Validation(format!(
                "minutes out of range: {minutes} (allowed 1..={cap})"
            )));
        }

        self.agent.grant(&d, minutes, reason).await?;
        let allowance = self.store.grant_with_cap(&d, minutes, reason, cap)?;
        info!(domain = %d, minutes, "allowance granted");
        Ok(allowance)
    }

    /// Revokes an allowance and drives the revoke cascade.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure only; the cascade itself is
    /// enforcement-increasing and never fails the call.
    pub async fn revoke(&self, raw: &str) -> Result<bool, ApiError> {
        let d = domain::canonicalize(raw).map_err(|e| ApiError::Validation(e.to_string()))?;
        let existed = self.store.revoke(&d)?;
        info!(domain = %d, existed, "allowance revoked");

        if let Err(e) = self.agent.revoke(&d).await {
            warn!(domain = %d, error = %e, "revoke cascade failed; sweeper will catch up");
        }
        Ok(existed)
    }

    /// `GET /api/allowances`.
    #[must_use]
    pub fn allowances(&self) -> Vec<AllowancePayload> {
        let now = Utc::now();
        self.store
            .active_allowances()
            .iter()
            .map(|a| AllowancePayload::from_allowance(a, now))
            .collect()
    }

    /// Toggles the shield.
    ///
    /// # Errors
    ///
    /// Disabling requires the agent ack (reduces enforcement); enabling
    /// persists regardless and the drive is best-effort.
    pub async fn set_shield(&self, on: bool) -> Result<(), ApiError> {
        if on {
            self.store.set_shield(true)?;
            info!("shield enabled");
            if let Err(e) = self.drive_blocklist().await {
                warn!(error = %e, "shield-on drive failed; agent will restore");
            } else if let Err(e) = self.agent.enable().await {
                warn!(error = %e, "shield-on enable failed; agent will restore");
            }
            Ok(())
        } else {
            self.agent.disable().await?;
            self.store.set_shield(false)?;
            info!("shield disabled");
            Ok(())
        }
    }

    /// The sorted delay list.
    #[must_use]
    pub fn delayed_domains(&self) -> Vec<String> {
        self.store.snapshot().delay_list.into_iter().collect()
    }

    /// Adds a domain to the delay list.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure.
    pub fn add_delay(&self, raw: &str) -> Result<bool, ApiError> {
        Ok(self.store.add_delay(raw)?)
    }

    /// Removes a domain from the delay list.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure.
    pub fn remove_delay(&self, raw: &str) -> Result<bool, ApiError> {
        Ok(self.store.remove_delay(raw)?)
    }

    /// `GET /api/locks`.
    #[must_use]
    pub fn locks(&self) -> Vec<LockPayload> {
        self.store
            .active_locks()
            .iter()
            .map(|l: &HardLockout| LockPayload {
                domain: l.domain.clone(),
                until: l.until,
            })
            .collect()
    }

    /// Installs a hard lockout.
    ///
    /// A lockout overrides any standing allowance, so installing one is
    /// enforcement-increasing: the conflicting allowance is revoked here,
    /// the agent is told to re-block (dropping its own allowance record
    /// and running the aggressive cascade), and the effective set is
    /// re-driven. Agent failures are logged and the call still succeeds;
    /// the sweepers catch up.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure.
    pub async fn add_lock(
        &self,
        raw: &str,
        until: DateTime<Utc>,
    ) -> Result<LockPayload, ApiError> {
        let lock = self.store.add_lock(raw, until)?;
        info!(domain = %lock.domain, until = %lock.until, "hard lockout installed");

        let had_allowance = self.store.revoke(&lock.domain)?;
        if had_allowance {
            info!(domain = %lock.domain, "lockout revoked a standing allowance");
            if let Err(e) = self.agent.revoke(&lock.domain).await {
                warn!(domain = %lock.domain, error = %e, "lockout re-block cascade failed");
            }
        }
        if let Err(e) = self.drive_blocklist().await {
            warn!(domain = %lock.domain, error = %e, "agent drive failed; will catch up");
        }

        Ok(LockPayload {
            domain: lock.domain,
            until: lock.until,
        })
    }

    /// Removes a lockout entry.
    ///
    /// Refused while the lockout is still in effect: lifting it requires
    /// editing the policy file directly.
    ///
    /// # Errors
    ///
    /// Lockout refusal, validation, or persistence failure.
    pub fn remove_lock(&self, raw: &str) -> Result<bool, ApiError> {
        let d = domain::canonicalize(raw).map_err(|e| ApiError::Validation(e.to_string()))?;
        if let Some(until) = self.store.hard_lock_until(&d)? {
            return Err(ApiError::LockoutRefusal { domain: d, until });
        }
        Ok(self.store.remove_lock(&d)?)
    }

    /// Forwards a resolver-cache flush to the agent.
    ///
    /// # Errors
    ///
    /// Agent unavailability.
    pub async fn flush_dns(&self) -> Result<(), ApiError> {
        self.agent.flush_dns().await?;
        Ok(())
    }
}
