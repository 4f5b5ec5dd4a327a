//! The agent's persisted mirror of enforced policy.
//!
//! The control server pushes the *effectively blocked* set; the agent
//! stores it verbatim together with the allowances it has been told about
//! and the shield flag, so that after a crash it can reapply enforcement
//! before accepting any IPC, and so its own sweeper can re-block on expiry
//! without a server round trip.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shield_core::fs_safe::{self, FsSafeError};
use shield_core::ipc::AllowanceInfo;
use shield_core::policy::Allowance;
use tracing::debug;

/// The agent's persisted state document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentMirror {
    /// Document format version.
    pub version: u32,
    /// Shield flag as last instructed.
    pub shield: bool,
    /// The effectively blocked set as last pushed by the server.
    pub domains: BTreeSet<String>,
    /// Allowances the agent has been told about, keyed by domain.
    pub allowances: BTreeMap<String, Allowance>,
}

impl Default for AgentMirror {
    fn default() -> Self {
        Self {
            version: 1,
            shield: true,
            domains: BTreeSet::new(),
            allowances: BTreeMap::new(),
        }
    }
}

impl AgentMirror {
    /// Domains with a currently active allowance.
    #[must_use]
    pub fn active_allowance_domains(&self, now: DateTime<Utc>) -> BTreeSet<String> {
        self.allowances
            .values()
            .filter(|a| a.is_active(now))
            .map(|a| a.domain.clone())
            .collect()
    }

    /// The set the surfaces must enforce right now.
    ///
    /// The pushed set already excludes granted domains, but the agent
    /// subtracts its own active allowances too so that a `grant` takes
    /// effect immediately and an expiry re-blocks without waiting for the
    /// server. The subtraction is idempotent.
    #[must_use]
    pub fn enforced_set(&self, now: DateTime<Utc>) -> BTreeSet<String> {
        self.domains
            .iter()
            .filter(|d| {
                !self
                    .allowances
                    .values()
                    .any(|a| a.is_active(now) && shield_core::domain_matches(d, &a.domain))
            })
            .cloned()
            .collect()
    }

    /// Drops expired allowances. Returns whether anything was removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> bool {
        let before = self.allowances.len();
        self.allowances.retain(|_, a| a.is_active(now));
        before != self.allowances.len()
    }
}

/// Handle to the agent's state with persistence and a shutdown flag.
pub struct AgentState {
    path: PathBuf,
    inner: Mutex<AgentMirror>,
    shutdown: AtomicBool,
}

impl AgentState {
    /// Loads the mirror from `path`, or starts from defaults when no file
    /// exists yet.
    ///
    /// Expired allowances are pruned on load so a restart never resurrects
    /// a lapsed exception.
    ///
    /// # Errors
    ///
    /// Returns [`FsSafeError`] if the file exists but cannot be read or
    /// parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FsSafeError> {
        let path = path.as_ref().to_path_buf();
        let mut mirror = if path.exists() {
            fs_safe::bounded_read_json(&path, fs_safe::DEFAULT_MAX_FILE_SIZE)?
        } else {
            AgentMirror::default()
        };
        mirror.prune_expired(Utc::now());
        debug!(
            shield = mirror.shield,
            domains = mirror.domains.len(),
            "agent state loaded"
        );
        Ok(Self {
            path,
            inner: Mutex::new(mirror),
            shutdown: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AgentMirror> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn persist(&self, mirror: &AgentMirror) -> Result<(), FsSafeError> {
        fs_safe::atomic_write_json(&self.path, mirror)
    }

    /// Request shutdown; checked by the accept loop and the sweeper.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// A point-in-time copy of the mirror.
    #[must_use]
    pub fn snapshot(&self) -> AgentMirror {
        self.lock().clone()
    }

    /// Whether the shield is on.
    #[must_use]
    pub fn shield(&self) -> bool {
        self.lock().shield
    }

    /// The set the surfaces must enforce right now.
    #[must_use]
    pub fn enforced_set(&self) -> BTreeSet<String> {
        self.lock().enforced_set(Utc::now())
    }

    /// Replaces the mirrored blocklist.
    ///
    /// # Errors
    ///
    /// Persistence failure.
    pub fn set_domains(&self, domains: BTreeSet<String>) -> Result<(), FsSafeError> {
        let mut mirror = self.lock();
        mirror.domains = domains;
        self.persist(&mirror)
    }

    /// Sets the shield flag.
    ///
    /// # Errors
    ///
    /// Persistence failure.
    pub fn set_shield(&self, on: bool) -> Result<(), FsSafeError> {
        let mut mirror = self.lock();
        mirror.shield = on;
        self.persist(&mirror)
    }

    /// Records an allowance, replacing any prior one for the domain.
    ///
    /// # Errors
    ///
    /// Persistence failure.
    pub fn record_allowance(
        &self,
        domain: &str,
        minutes: u32,
        reason: &str,
    ) -> Result<Allowance, FsSafeError> {
        let now = Utc::now();
        let allowance = Allowance {
            domain: domain.to_string(),
            granted_at: now,
            expires_at: now + Duration::minutes(i64::from(minutes)),
            reason: reason.to_string(),
            granted_minutes: minutes,
        };
        let mut mirror = self.lock();
        mirror
            .allowances
            .insert(domain.to_string(), allowance.clone());
        self.persist(&mirror)?;
        Ok(allowance)
    }

    /// Drops any allowance for the domain. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Persistence failure.
    pub fn drop_allowance(&self, domain: &str) -> Result<bool, FsSafeError> {
        let mut mirror = self.lock();
        let existed = mirror.allowances.remove(domain).is_some();
        if existed {
            self.persist(&mirror)?;
        }
        Ok(existed)
    }

    /// Ensures a domain is present in the mirrored blocklist.
    ///
    /// # Errors
    ///
    /// Persistence failure.
    pub fn insert_domain(&self, domain: &str) -> Result<bool, FsSafeError> {
        let mut mirror = self.lock();
        let changed = mirror.domains.insert(domain.to_string());
        if changed {
            self.persist(&mirror)?;
        }
        Ok(changed)
    }

    /// Drops all allowances and turns the shield off.
    ///
    /// # Errors
    ///
    /// Persistence failure.
    pub fn clear(&self) -> Result<(), FsSafeError> {
        let mut mirror = self.lock();
        mirror.allowances.clear();
        mirror.shield = false;
        self.persist(&mirror)
    }

    /// Drops expired allowances, persisting when something changed.
    ///
    /// # Errors
    ///
    /// Persistence failure.
    pub fn prune_expired(&self) -> Result<bool, FsSafeError> {
        let mut mirror = self.lock();
        let changed = mirror.prune_expired(Utc::now());
        if changed {
            self.persist(&mirror)?;
        }
        Ok(changed)
    }

    /// Domains with a currently active allowance.
    #[must_use]
    pub fn active_allowance_domains(&self) -> BTreeSet<String> {
        self.lock().active_allowance_domains(Utc::now())
    }

    /// Status-report summaries of the active allowances.
    #[must_use]
    pub fn allowance_infos(&self) -> Vec<AllowanceInfo> {
        let now = Utc::now();
        self.lock()
            .allowances
            .values()
            .filter(|a| a.is_active(now))
            .map(|a| AllowanceInfo {
                domain: a.domain.clone(),
                remaining_minutes: a.remaining_minutes(now),
                reason: a.reason.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn enforced_set_subtracts_active_allowances() {
        let mut mirror = AgentMirror::default();
        let now = Utc::now();
        mirror.domains = ["twitter.com".to_string(), "reddit.com".to_string()]
            .into_iter()
            .collect();
        mirror.allowances.insert(
            "reddit.com".into(),
            Allowance {
                domain: "reddit.com".into(),
                granted_at: now,
                expires_at: now + Duration::minutes(5),
                reason: String::new(),
                granted_minutes: 5,
            },
        );

        let enforced = mirror.enforced_set(now);
        assert!(enforced.contains("twitter.com"));
        assert!(!enforced.contains("reddit.com"));

        let enforced = mirror.enforced_set(now + Duration::minutes(6));
        assert!(enforced.contains("reddit.com"), "expiry re-blocks");
    }

    #[test]
    fn load_prunes_expired_allowances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mirror.json");
        let now = Utc::now();

        let mut mirror = AgentMirror::default();
        mirror.domains.insert("x.com".into());
        mirror.allowances.insert(
            "x.com".into(),
            Allowance {
                domain: "x.com".into(),
                granted_at: now - Duration::minutes(10),
                expires_at: now - Duration::minutes(5),
                reason: String::new(),
                granted_minutes: 5,
            },
        );
        shield_core::fs_safe::atomic_write_json(&path, &mirror).unwrap();

        let state = AgentState::load(&path).unwrap();
        assert!(state.snapshot().allowances.is_empty());
        assert!(state.enforced_set().contains("x.com"));
    }

    #[test]
    fn record_and_drop_allowance_round_trip() {
        let dir = tempdir().unwrap();
        let state = AgentState::load(dir.path().join("mirror.json")).unwrap();
        state
            .set_domains(["reddit.com".to_string()].into_iter().collect())
            .unwrap();

        state.record_allowance("reddit.com", 5, "break").unwrap();
        assert!(state.enforced_set().is_empty());
        assert_eq!(state.allowance_infos().len(), 1);

        assert!(state.drop_allowance("reddit.com").unwrap());
        assert!(!state.drop_allowance("reddit.com").unwrap());
        assert!(state.enforced_set().contains("reddit.com"));
    }
}
