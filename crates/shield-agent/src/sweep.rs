//! Allowance-expiry sweeper.
//!
//! A ticker scans the active allowances and, for every domain whose
//! allowance expired since the previous tick (`prev_active \ curr_active`),
//! runs the full revoke cascade: hosts re-block, dynamic filter rules,
//! connection kills, tab closes, resolver-cache flush.
//!
//! The difference-of-sets bookkeeping gives at-least-once semantics per
//! expiry: a missed tick only means the next tick sees a larger
//! difference. The control server runs a defensive ticker of its own; both
//! are idempotent.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::enforcer::Enforcer;
use crate::state::AgentState;

/// Sweep period. An expired allowance stays in force at most this long.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(30);

/// Runs the sweeper until shutdown is requested.
pub async fn run(state: Arc<AgentState>, enforcer: Arc<Enforcer>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut prev_active = state.active_allowance_domains();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = wait_for_shutdown(&state) => break,
        }

        let curr_active = state.active_allowance_domains();
        let expired: Vec<String> = prev_active.difference(&curr_active).cloned().collect();
        prev_active = curr_active;

        if expired.is_empty() {
            continue;
        }

        info!(count = expired.len(), "allowances expired; re-blocking");
        if let Err(e) = state.prune_expired() {
            warn!(error = %e, "failed to persist allowance prune");
        }

        let shield = state.shield();
        let enforced = state.enforced_set();
        if let Err(e) = enforcer.apply_primary(shield, &enforced).await {
            // Default-deny: an apply failure here leaves the expired
            // domain unblocked only on the hosts layer, so retry hard on
            // the next tick by restoring it into the difference set.
            warn!(error = %e, "expiry reapply failed; will retry next tick");
            prev_active.extend(expired.iter().cloned());
            continue;
        }
        if shield {
            for domain in &expired {
                enforcer.aggressive_block(domain).await;
            }
        }
    }

    info!("expiry sweeper stopped");
}

async fn wait_for_shutdown(state: &AgentState) {
    loop {
        if state.is_shutdown_requested() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use tempfile::TempDir;

    use super::*;
    use crate::enforcer::EnforcerConfig;

    fn fixture() -> (TempDir, Arc<AgentState>, Arc<Enforcer>) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hosts"), "127.0.0.1 localhost\n").unwrap();
        let state = Arc::new(AgentState::load(dir.path().join("mirror.json")).unwrap());
        let enforcer = Arc::new(Enforcer::new(EnforcerConfig {
            hosts_path: dir.path().join("hosts"),
            anchor_path: dir.path().join("anchor"),
            pf_conf_path: dir.path().join("pf.conf"),
            flush_interface: None,
            external_commands: false,
        }));
        (dir, state, enforcer)
    }

    #[tokio::test]
    async fn expired_allowance_is_reblocked_within_a_period() {
        let (dir, state, enforcer) = fixture();
        state
            .set_domains(BTreeSet::from(["reddit.com".to_string()]))
            .unwrap();

        // An allowance that dies almost immediately. record_allowance only
        // speaks minutes, so install the short-lived entry directly.
        state.record_allowance("reddit.com", 1, "test").unwrap();
        {
            let mut mirror = state.snapshot();
            let entry = mirror.allowances.get_mut("reddit.com").unwrap();
            entry.expires_at = chrono::Utc::now() + chrono::Duration::milliseconds(300);
            shield_core::fs_safe::atomic_write_json(&dir.path().join("mirror.json"), &mirror)
                .unwrap();
        }
        let state = Arc::new(AgentState::load(dir.path().join("mirror.json")).unwrap());

        // Granted: surfaces empty.
        enforcer
            .apply_primary(state.shield(), &state.enforced_set())
            .await
            .unwrap();
        let hosts = std::fs::read_to_string(dir.path().join("hosts")).unwrap();
        assert!(!hosts.contains("reddit.com"));

        let sweeper = tokio::spawn(run(
            Arc::clone(&state),
            Arc::clone(&enforcer),
            Duration::from_millis(50),
        ));

        tokio::time::sleep(Duration::from_millis(800)).await;
        state.request_shutdown();
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweeper.abort();

        let hosts = std::fs::read_to_string(dir.path().join("hosts")).unwrap();
        assert!(
            hosts.contains("0.0.0.0 reddit.com"),
            "expired allowance must be re-blocked"
        );
        assert!(state.snapshot().allowances.is_empty(), "prune persisted");
    }

    #[tokio::test]
    async fn sweeper_is_quiet_without_expiries() {
        let (dir, state, enforcer) = fixture();
        state
            .set_domains(BTreeSet::from(["x.com".to_string()]))
            .unwrap();
        state.record_allowance("x.com", 30, "long").unwrap();

        let sweeper = tokio::spawn(run(
            Arc::clone(&state),
            Arc::clone(&enforcer),
            Duration::from_millis(50),
        ));
        tokio::time::sleep(Duration::from_millis(250)).await;
        state.request_shutdown();
        sweeper.abort();

        assert_eq!(state.allowance_infos().len(), 1, "allowance survives");
        let hosts = std::fs::read_to_string(dir.path().join("hosts")).unwrap();
        assert!(!hosts.contains("x.com"));
    }
}
