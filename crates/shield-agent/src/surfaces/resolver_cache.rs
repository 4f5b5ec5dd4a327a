//! System resolver cache invalidation.
//!
//! Applications and the system resolver cache name lookups; after any
//! change to the hosts region the cache must be flushed or the old answer
//! lingers until TTL. Best-effort: a failed flush is logged and ignored.

use std::time::Duration;

use tracing::info;

use crate::cmd;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Flushes the system resolver cache.
///
/// Runs `dscacheutil -flushcache` and HUPs `mDNSResponder`. When
/// `interface` names a network interface (the `SHIELD_FLUSH_INTERFACE`
/// toggle), its ARP entries are cleared as well.
pub async fn flush(interface: Option<&str>, external_commands: bool) {
    if !external_commands {
        return;
    }
    info!("flushing resolver cache");
    cmd::run_best_effort("dscacheutil", &["-flushcache"], FLUSH_TIMEOUT).await;
    cmd::run_best_effort("killall", &["-HUP", "mDNSResponder"], FLUSH_TIMEOUT).await;
    if let Some(ifname) = interface {
        cmd::run_best_effort("arp", &["-d", "-i", ifname, "-a"], FLUSH_TIMEOUT).await;
    }
}
