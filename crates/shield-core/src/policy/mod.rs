//! The authoritative policy document and its store.
//!
//! A single [`PolicyStore`] owns the persisted policy: blocked domains,
//! delayed domains, active allowances, hard lockouts, delay sessions, and
//! the shield flag. All mutation goes through the store, behind one mutex,
//! and every mutation ends with an atomic write-temp-then-rename persist.
//! There is no ambient global state.
//!
//! Time-dependent queries are split in two layers: [`PolicyDocument`]
//! methods are pure and take an explicit `now`, which is what the tests
//! exercise; [`PolicyStore`] wraps them with the wall clock and
//! persistence.

mod delay;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use delay::{DelayDecision, DelaySession, required_wait_secs};

use crate::domain::{self, DomainError};
use crate::fs_safe::{self, FsSafeError};

/// Maximum allowance length on the public grant surfaces, in minutes.
pub const MAX_PUBLIC_GRANT_MINUTES: u32 = 30;

/// Maximum allowance length for privileged callers, in minutes.
pub const MAX_PRIVILEGED_GRANT_MINUTES: u32 = 1440;

/// Errors from policy operations.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The domain failed syntactic validation.
    #[error(transparent)]
    InvalidDomain(#[from] DomainError),

    /// Requested allowance length is outside the permitted range.
    #[error("minutes out of range: {minutes} (allowed 1..={max})")]
    MinutesOutOfRange {
        /// Requested minutes.
        minutes: u32,
        /// Cap for the calling surface.
        max: u32,
    },

    /// The policy document could not be written durably.
    #[error("failed to persist policy: {0}")]
    Persist(#[from] FsSafeError),
}

/// A time-bounded exception to blocking.
///
/// At most one allowance exists per canonical domain; granting replaces any
/// prior entry for the same domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    /// Canonical domain the allowance covers (subdomain-inclusive).
    pub domain: String,
    /// When the allowance was granted.
    pub granted_at: DateTime<Utc>,
    /// When the allowance dies. Expiry is monotonic: no resurrection.
    pub expires_at: DateTime<Utc>,
    /// Caller-supplied reason.
    pub reason: String,
    /// The originally granted length in minutes.
    pub granted_minutes: u32,
}

impl Allowance {
    /// Whether the allowance is still alive at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Whole minutes remaining at `now`, rounded up; 0 once expired.
    #[must_use]
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> u32 {
        let secs = (self.expires_at - now).num_seconds();
        if secs <= 0 {
            return 0;
        }
        u32::try_from(secs)
            .map(|s| s.div_ceil(60))
            .unwrap_or(u32::MAX)
    }
}

/// A date-bounded veto on mutating a domain's block/grant state.
///
/// A lockout blocks grants and unblocks at the policy layer; it cannot be
/// lifted through the control API while still in effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardLockout {
    /// Canonical domain the lockout covers (subdomain-inclusive).
    pub domain: String,
    /// Wall-clock instant the lockout expires on its own.
    pub until: DateTime<Utc>,
}

impl HardLockout {
    /// Whether the lockout is still in effect at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.until
    }
}

/// The persisted policy document.
///
/// Serialized as a single JSON file; every field defaults so documents
/// written by older versions still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDocument {
    /// Document format version.
    pub version: u32,
    /// Global enable flag. When false, enforcement surfaces are emptied
    /// but policy is retained.
    pub shield: bool,
    /// Canonical blocked domains.
    pub blocklist: BTreeSet<String>,
    /// Canonical domains eligible for progressive friction.
    pub delay_list: BTreeSet<String>,
    /// Active and not-yet-pruned allowances, keyed by domain.
    pub allowances: BTreeMap<String, Allowance>,
    /// Hard lockouts, keyed by domain.
    pub locks: BTreeMap<String, HardLockout>,
    /// Per-domain delay-session bookkeeping for the friction path.
    pub delay_sessions: BTreeMap<String, DelaySession>,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            version: 1,
            shield: true,
            blocklist: BTreeSet::new(),
            delay_list: BTreeSet::new(),
            allowances: BTreeMap::new(),
            locks: BTreeMap::new(),
            delay_sessions: BTreeMap::new(),
        }
    }
}

impl PolicyDocument {
    /// The active allowance covering `query`, if any.
    #[must_use]
    pub fn active_allowance_for(&self, query: &str, now: DateTime<Utc>) -> Option<&Allowance> {
        self.allowances
            .values()
            .find(|a| a.is_active(now) && domain::domain_matches(query, &a.domain))
    }

    /// The active hard lockout covering `query`, if any.
    #[must_use]
    pub fn active_lock_for(&self, query: &str, now: DateTime<Utc>) -> Option<&HardLockout> {
        self.locks
            .values()
            .find(|l| l.is_active(now) && domain::domain_matches(query, &l.domain))
    }

    /// Whether `query` is blocked: it matches a blocklist entry and no
    /// active allowance covers it.
    ///
    /// An active hard lockout overrides any allowance: a locked domain is
    /// blocked even while an earlier-granted allowance would still cover
    /// it.
    #[must_use]
    pub fn is_blocked(&self, query: &str, now: DateTime<Utc>) -> bool {
        self.blocklist
            .iter()
            .any(|p| domain::domain_matches(query, p))
            && (self.active_lock_for(query, now).is_some()
                || self.active_allowance_for(query, now).is_none())
    }

    /// The effective block set: blocklist minus domains covered by an
    /// active allowance, except that an active hard lockout forces its
    /// domain back into the set regardless of any allowance.
    #[must_use]
    pub fn effective_block_set(&self, now: DateTime<Utc>) -> BTreeSet<String> {
        self.blocklist
            .iter()
            .filter(|d| {
                self.active_lock_for(d, now).is_some()
                    || self.active_allowance_for(d, now).is_none()
            })
            .cloned()
            .collect()
    }

    /// Removes expired allowances and expired lockouts. Returns whether
    /// anything was removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> bool {
        let before = self.allowances.len() + self.locks.len();
        self.allowances.retain(|_, a| a.is_active(now));
        self.locks.retain(|_, l| l.is_active(now));
        before != self.allowances.len() + self.locks.len()
    }
}

/// Thread-safe store owning the policy document and its file.
pub struct PolicyStore {
    path: PathBuf,
    doc: Mutex<PolicyDocument>,
}

impl PolicyStore {
    /// Loads the policy from `path`, or initializes a fresh document with
    /// the given seed blocklist when no file exists yet.
    ///
    /// A freshly initialized document is persisted immediately so a crash
    /// right after first run still comes back with the seed policy.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Persist`] if the file exists but cannot be
    /// read or parsed, or the initial write fails.
    pub fn load_or_seed(
        path: impl AsRef<Path>,
        seed: BTreeSet<String>,
    ) -> Result<Self, PolicyError> {
        let path = path.as_ref().to_path_buf();
        let doc = if path.exists() {
            let doc: PolicyDocument =
                fs_safe::bounded_read_json(&path, fs_safe::DEFAULT_MAX_FILE_SIZE)?;
            debug!(
                blocked = doc.blocklist.len(),
                shield = doc.shield,
                "policy loaded"
            );
            doc
        } else {
            let doc = PolicyDocument {
                blocklist: seed,
                ..PolicyDocument::default()
            };
            fs_safe::atomic_write_json(&path, &doc)?;
            info!(blocked = doc.blocklist.len(), "policy initialized");
            doc
        };

        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    /// Loads the policy from `path`, seeding the default category bundles
    /// on first run.
    ///
    /// # Errors
    ///
    /// See [`PolicyStore::load_or_seed`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        Self::load_or_seed(path, crate::categories::default_seed())
    }

    fn persist(&self, doc: &PolicyDocument) -> Result<(), PolicyError> {
        fs_safe::atomic_write_json(&self.path, doc)?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PolicyDocument> {
        // A poisoned mutex means a panic mid-mutation; the in-memory doc is
        // still structurally valid (mutations build new values before
        // inserting), so continue with it rather than wedging the process.
        self.doc.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// A point-in-time copy of the whole document.
    #[must_use]
    pub fn snapshot(&self) -> PolicyDocument {
        self.lock().clone()
    }

    /// Whether the shield is on.
    #[must_use]
    pub fn shield(&self) -> bool {
        self.lock().shield
    }

    /// Sets the shield flag.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Persist`] if the write fails.
    pub fn set_shield(&self, on: bool) -> Result<(), PolicyError> {
        let mut doc = self.lock();
        doc.shield = on;
        self.persist(&doc)
    }

    /// Whether `raw` is currently blocked.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidDomain`] for malformed input.
    pub fn is_blocked(&self, raw: &str) -> Result<bool, PolicyError> {
        let q = domain::canonicalize(raw)?;
        Ok(self.lock().is_blocked(&q, Utc::now()))
    }

    /// The effective block set at the current instant.
    #[must_use]
    pub fn effective_block_set(&self) -> BTreeSet<String> {
        self.lock().effective_block_set(Utc::now())
    }

    /// Adds a domain to the blocklist. Idempotent; returns whether the set
    /// changed.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure.
    pub fn add_block(&self, raw: &str) -> Result<bool, PolicyError> {
        let d = domain::canonicalize(raw)?;
        let mut doc = self.lock();
        let changed = doc.blocklist.insert(d);
        if changed {
            self.persist(&doc)?;
        }
        Ok(changed)
    }

    /// Removes a domain from the blocklist. Idempotent.
    ///
    /// Hard-lockout refusal is the control server's job; the store itself
    /// performs the removal unconditionally.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure.
    pub fn remove_block(&self, raw: &str) -> Result<bool, PolicyError> {
        let d = domain::canonicalize(raw)?;
        let mut doc = self.lock();
        let changed = doc.blocklist.remove(&d);
        if changed {
            self.persist(&doc)?;
        }
        Ok(changed)
    }

    /// Adds a domain to the delay list. Idempotent.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure.
    pub fn add_delay(&self, raw: &str) -> Result<bool, PolicyError> {
        let d = domain::canonicalize(raw)?;
        let mut doc = self.lock();
        let changed = doc.delay_list.insert(d);
        if changed {
            self.persist(&doc)?;
        }
        Ok(changed)
    }

    /// Removes a domain from the delay list. Idempotent.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure.
    pub fn remove_delay(&self, raw: &str) -> Result<bool, PolicyError> {
        let d = domain::canonicalize(raw)?;
        let mut doc = self.lock();
        let changed = doc.delay_list.remove(&d);
        if changed {
            self.persist(&doc)?;
        }
        Ok(changed)
    }

    /// Grants an allowance with the public 30-minute cap.
    ///
    /// Replaces any prior allowance for the same domain.
    ///
    /// # Errors
    ///
    /// Validation, cap, or persistence failure.
    pub fn grant(&self, raw: &str, minutes: u32, reason: &str) -> Result<Allowance, PolicyError> {
        self.grant_with_cap(raw, minutes, reason, MAX_PUBLIC_GRANT_MINUTES)
    }

    /// Grants an allowance with an explicit cap (privileged surfaces pass
    /// [`MAX_PRIVILEGED_GRANT_MINUTES`]).
    ///
    /// # Errors
    ///
    /// Validation, cap, or persistence failure.
    pub fn grant_with_cap(
        &self,
        raw: &str,
        minutes: u32,
        reason: &str,
        cap: u32,
    ) -> Result<Allowance, PolicyError> {
        let d = domain::canonicalize(raw)?;
        if minutes == 0 || minutes > cap {
            return Err(PolicyError::MinutesOutOfRange { minutes, max: cap });
        }

        let now = Utc::now();
        let allowance = Allowance {
            domain: d.clone(),
            granted_at: now,
            expires_at: now + Duration::minutes(i64::from(minutes)),
            reason: reason.to_string(),
            granted_minutes: minutes,
        };

        let mut doc = self.lock();
        doc.allowances.insert(d, allowance.clone());
        self.persist(&doc)?;
        Ok(allowance)
    }

    /// Revokes any allowance for the domain. Idempotent; returns whether
    /// one existed.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure.
    pub fn revoke(&self, raw: &str) -> Result<bool, PolicyError> {
        let d = domain::canonicalize(raw)?;
        let mut doc = self.lock();
        let changed = doc.allowances.remove(&d).is_some();
        if changed {
            self.persist(&doc)?;
        }
        Ok(changed)
    }

    /// The active allowances, pruning expired ones from storage as a side
    /// effect.
    #[must_use]
    pub fn active_allowances(&self) -> Vec<Allowance> {
        let now = Utc::now();
        let mut doc = self.lock();
        if doc.prune_expired(now) {
            if let Err(e) = self.persist(&doc) {
                tracing::warn!(error = %e, "failed to persist allowance prune");
            }
        }
        doc.allowances.values().cloned().collect()
    }

    /// The active hard lockouts, pruning expired ones alongside
    /// [`PolicyStore::active_allowances`] semantics.
    #[must_use]
    pub fn active_locks(&self) -> Vec<HardLockout> {
        let now = Utc::now();
        let mut doc = self.lock();
        if doc.prune_expired(now) {
            if let Err(e) = self.persist(&doc) {
                tracing::warn!(error = %e, "failed to persist lock prune");
            }
        }
        doc.locks.values().cloned().collect()
    }

    /// Whole minutes remaining on any allowance covering `raw`, else 0.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidDomain`] for malformed input.
    pub fn remaining_minutes(&self, raw: &str) -> Result<u32, PolicyError> {
        let q = domain::canonicalize(raw)?;
        let now = Utc::now();
        Ok(self
            .lock()
            .active_allowance_for(&q, now)
            .map_or(0, |a| a.remaining_minutes(now)))
    }

    /// The expiry of an active hard lockout covering `raw`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidDomain`] for malformed input.
    pub fn hard_lock_until(&self, raw: &str) -> Result<Option<DateTime<Utc>>, PolicyError> {
        let q = domain::canonicalize(raw)?;
        Ok(self
            .lock()
            .active_lock_for(&q, Utc::now())
            .map(|l| l.until))
    }

    /// Installs a hard lockout. Replaces any prior lockout for the domain.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure.
    pub fn add_lock(&self, raw: &str, until: DateTime<Utc>) -> Result<HardLockout, PolicyError> {
        let d = domain::canonicalize(raw)?;
        let lock = HardLockout {
            domain: d.clone(),
            until,
        };
        let mut doc = self.lock();
        doc.locks.insert(d, lock.clone());
        self.persist(&doc)?;
        Ok(lock)
    }

    /// Removes a lockout entry. The control server refuses this while the
    /// lockout is active; the store removes unconditionally.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure.
    pub fn remove_lock(&self, raw: &str) -> Result<bool, PolicyError> {
        let d = domain::canonicalize(raw)?;
        let mut doc = self.lock();
        let changed = doc.locks.remove(&d).is_some();
        if changed {
            self.persist(&doc)?;
        }
        Ok(changed)
    }

    /// The friction decision for a delayed domain: an open session window
    /// or a required wait.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidDomain`] for malformed input.
    pub fn delay_decision(&self, raw: &str) -> Result<DelayDecision, PolicyError> {
        let d = domain::canonicalize(raw)?;
        Ok(delay::decision(&self.lock().delay_sessions, &d, Utc::now()))
    }

    /// Records a completed delay wait for a domain, opening its session
    /// window.
    ///
    /// # Errors
    ///
    /// Validation or persistence failure.
    pub fn record_delay_access(&self, raw: &str) -> Result<DelaySession, PolicyError> {
        let d = domain::canonicalize(raw)?;
        let now = Utc::now();
        let mut doc = self.lock();
        let session = delay::record_access(&mut doc.delay_sessions, &d, now);
        self.persist(&doc)?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::tempdir;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
    }

    fn doc_with_blocks(domains: &[&str]) -> PolicyDocument {
        PolicyDocument {
            blocklist: domains.iter().map(|d| (*d).to_string()).collect(),
            ..PolicyDocument::default()
        }
    }

    #[test]
    fn subdomain_coverage() {
        let doc = doc_with_blocks(&["youtube.com"]);
        let now = t0();
        assert!(doc.is_blocked("youtube.com", now));
        assert!(doc.is_blocked("m.youtube.com", now));
        assert!(doc.is_blocked("music.youtube.com", now));
        assert!(!doc.is_blocked("notyoutube.com", now));
    }

    #[test]
    fn allowance_dominates_until_expiry() {
        let mut doc = doc_with_blocks(&["twitter.com"]);
        let now = t0();
        doc.allowances.insert(
            "twitter.com".into(),
            Allowance {
                domain: "twitter.com".into(),
                granted_at: now,
                expires_at: now + Duration::minutes(5),
                reason: "test".into(),
                granted_minutes: 5,
            },
        );

        assert!(!doc.is_blocked("twitter.com", now));
        assert!(!doc.is_blocked("mobile.twitter.com", now));
        assert!(doc.effective_block_set(now).is_empty());

        let later = now + Duration::minutes(5);
        assert!(doc.is_blocked("twitter.com", later), "expiry is monotonic");
        assert_eq!(doc.effective_block_set(later).len(), 1);
    }

    #[test]
    fn allowance_on_parent_covers_subdomain_entries() {
        let mut doc = doc_with_blocks(&["reddit.com", "old.reddit.com"]);
        let now = t0();
        doc.allowances.insert(
            "reddit.com".into(),
            Allowance {
                domain: "reddit.com".into(),
                granted_at: now,
                expires_at: now + Duration::minutes(10),
                reason: String::new(),
                granted_minutes: 10,
            },
        );
        assert!(doc.effective_block_set(now).is_empty());
    }

    #[test]
    fn lockout_overrides_an_existing_allowance() {
        let mut doc = doc_with_blocks(&["twitter.com"]);
        let now = t0();
        doc.allowances.insert(
            "twitter.com".into(),
            Allowance {
                domain: "twitter.com".into(),
                granted_at: now,
                expires_at: now + Duration::minutes(30),
                reason: "granted before the lock".into(),
                granted_minutes: 30,
            },
        );
        assert!(!doc.is_blocked("twitter.com", now));

        // Lock installed after the grant: the allowance no longer opens
        // anything.
        doc.locks.insert(
            "twitter.com".into(),
            HardLockout {
                domain: "twitter.com".into(),
                until: now + Duration::days(365),
            },
        );
        assert!(doc.is_blocked("twitter.com", now));
        assert!(doc.is_blocked("mobile.twitter.com", now));
        assert!(doc.effective_block_set(now).contains("twitter.com"));
    }

    #[test]
    fn remaining_minutes_rounds_up() {
        let now = t0();
        let a = Allowance {
            domain: "x.com".into(),
            granted_at: now,
            expires_at: now + Duration::seconds(61),
            reason: String::new(),
            granted_minutes: 2,
        };
        assert_eq!(a.remaining_minutes(now), 2);
        assert_eq!(a.remaining_minutes(now + Duration::seconds(60)), 1);
        assert_eq!(a.remaining_minutes(now + Duration::seconds(61)), 0);
    }

    #[test]
    fn prune_removes_only_expired() {
        let mut doc = PolicyDocument::default();
        let now = t0();
        doc.allowances.insert(
            "a.com".into(),
            Allowance {
                domain: "a.com".into(),
                granted_at: now - Duration::minutes(10),
                expires_at: now - Duration::minutes(1),
                reason: String::new(),
                granted_minutes: 9,
            },
        );
        doc.allowances.insert(
            "b.com".into(),
            Allowance {
                domain: "b.com".into(),
                granted_at: now,
                expires_at: now + Duration::minutes(9),
                reason: String::new(),
                granted_minutes: 9,
            },
        );

        assert!(doc.prune_expired(now));
        assert!(!doc.allowances.contains_key("a.com"));
        assert!(doc.allowances.contains_key("b.com"));
        assert!(!doc.prune_expired(now), "second prune is a no-op");
    }

    #[test]
    fn store_seeds_and_reloads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy.json");

        let store =
            PolicyStore::load_or_seed(&path, ["twitter.com".to_string()].into_iter().collect())
                .unwrap();
        assert!(store.shield());
        assert!(store.is_blocked("twitter.com").unwrap());
        drop(store);

        // Reload reads the persisted file, not the seed.
        let store = PolicyStore::load_or_seed(&path, BTreeSet::new()).unwrap();
        assert!(store.is_blocked("m.twitter.com").unwrap());
    }

    #[test]
    fn add_block_is_idempotent_in_state_and_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("policy.json");
        let store = PolicyStore::load_or_seed(&path, BTreeSet::new()).unwrap();

        assert!(store.add_block("https://www.Example.com/feed").unwrap());
        let bytes_once = std::fs::read(&path).unwrap();
        assert!(!store.add_block("example.com").unwrap());
        let bytes_twice = std::fs::read(&path).unwrap();

        assert_eq!(bytes_once, bytes_twice);
        assert!(store.is_blocked("example.com").unwrap());
    }

    #[test]
    fn grant_replaces_and_respects_cap() {
        let dir = tempdir().unwrap();
        let store =
            PolicyStore::load_or_seed(dir.path().join("p.json"), BTreeSet::new()).unwrap();
        store.add_block("reddit.com").unwrap();

        let first = store.grant("reddit.com", 5, "first").unwrap();
        let second = store.grant("reddit.com", 10, "second").unwrap();
        assert!(second.expires_at > first.expires_at);
        assert_eq!(store.active_allowances().len(), 1);
        assert_eq!(store.active_allowances()[0].reason, "second");

        assert!(matches!(
            store.grant("reddit.com", 31, "too long"),
            Err(PolicyError::MinutesOutOfRange { minutes: 31, max: 30 })
        ));
        assert!(matches!(
            store.grant("reddit.com", 0, "zero"),
            Err(PolicyError::MinutesOutOfRange { .. })
        ));
        assert!(store
            .grant_with_cap("reddit.com", 240, "evening", MAX_PRIVILEGED_GRANT_MINUTES)
            .is_ok());
    }

    #[test]
    fn lockout_lookup_is_subdomain_inclusive() {
        let dir = tempdir().unwrap();
        let store =
            PolicyStore::load_or_seed(dir.path().join("p.json"), BTreeSet::new()).unwrap();
        let until = Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap();
        store.add_lock("twitter.com", until).unwrap();

        assert_eq!(store.hard_lock_until("twitter.com").unwrap(), Some(until));
        assert_eq!(
            store.hard_lock_until("mobile.twitter.com").unwrap(),
            Some(until)
        );
        assert_eq!(store.hard_lock_until("x.com").unwrap(), None);
    }

    #[test]
    fn invalid_domains_are_rejected_without_side_effects() {
        let dir = tempdir().unwrap();
        let store =
            PolicyStore::load_or_seed(dir.path().join("p.json"), BTreeSet::new()).unwrap();

        assert!(store.add_block("not a domain").is_err());
        assert!(store.add_block("nodot").is_err());
        assert!(store.effective_block_set().is_empty());
    }
}
