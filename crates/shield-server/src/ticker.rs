//! Defensive allowance-expiry ticker.
//!
//! The agent's own sweeper is primary; this ticker only watches the
//! active-allowance count and, when it drops (an expiry pruned entries),
//! recomputes the effective set and re-drives the agent's blocklist. A
//! missed server tick therefore never leaves an expired allowance in
//! force: the agent re-blocks on its own, and this drive merely
//! reconciles the mirror.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::state::ServerState;

/// Ticker period, matching the agent's sweeper.
pub const TICK_PERIOD: Duration = Duration::from_secs(30);

/// Runs the ticker forever; the caller aborts the task on shutdown.
pub async fn run(state: Arc<ServerState>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await; // the immediate first tick

    let mut prev_count = state.store.active_allowances().len();

    loop {
        ticker.tick().await;
        let curr_count = state.store.active_allowances().len();
        if curr_count < prev_count {
            info!(
                expired = prev_count - curr_count,
                "allowances expired; re-driving blocklist"
            );
            if let Err(e) = state.drive_blocklist().await {
                warn!(error = %e, "defensive re-drive failed; agent sweeper is primary");
            }
        }
        prev_count = curr_count;
    }
}
