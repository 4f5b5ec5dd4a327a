//! Trusted external name resolution for dynamic filter rules.
//!
//! The system resolver is the thing we sabotage with the hosts region, so
//! dynamic rules resolve through an external resolver directly. Lookups
//! are bounded by a short deadline; on any failure the result is simply
//! empty (and logged) — a missing dynamic rule degrades enforcement to the
//! hosts layer, it never blocks the cascade.

use std::net::IpAddr;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cmd;

/// Resolver queried for dynamic rules.
const TRUSTED_RESOLVER: &str = "1.1.1.1";

/// Per-query deadline.
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

async fn query(domain: &str, record: &str) -> Vec<IpAddr> {
    let server = format!("@{TRUSTED_RESOLVER}");
    match cmd::run(
        "dig",
        &["+short", "+time=2", "+tries=1", &server, domain, record],
        RESOLVE_TIMEOUT,
    )
    .await
    {
        Ok(out) => out
            .lines()
            .filter_map(|l| l.trim().parse::<IpAddr>().ok())
            .collect(),
        Err(e) => {
            warn!(domain, record, error = %e, "external resolution failed");
            Vec::new()
        },
    }
}

/// Resolves the IPv4 and IPv6 addresses of a domain via the trusted
/// resolver. Returns an empty list on failure.
pub async fn resolve_domain(domain: &str, external_commands: bool) -> Vec<IpAddr> {
    if !external_commands {
        return Vec::new();
    }
    let mut ips = query(domain, "A").await;
    ips.extend(query(domain, "AAAA").await);
    ips.sort_unstable();
    ips.dedup();
    debug!(domain, count = ips.len(), "resolved for dynamic rules");
    ips
}
