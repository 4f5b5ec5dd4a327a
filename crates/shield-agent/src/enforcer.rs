//! Effective-apply sequencing across the enforcement surfaces.
//!
//! The enforcer turns a (shield flag, enforced set) pair into concrete
//! artifacts in a fixed order: hosts region first (fatal on failure),
//! packet-filter anchor second (retried on the next call), then the
//! best-effort tail (connection kills, tab closes, resolver-cache flush).

use std::collections::BTreeSet;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::resolve;
use crate::surfaces::firewall::Firewall;
use crate::surfaces::hosts::HostsFile;
use crate::surfaces::{SurfaceError, browser, resolver_cache};

/// Filesystem locations and toggles for the surfaces.
#[derive(Debug, Clone)]
pub struct EnforcerConfig {
    /// The OS hosts file.
    pub hosts_path: PathBuf,
    /// The pf anchor file.
    pub anchor_path: PathBuf,
    /// The main pf configuration.
    pub pf_conf_path: PathBuf,
    /// Interface whose ARP cache is cleared on flush
    /// (`SHIELD_FLUSH_INTERFACE`).
    pub flush_interface: Option<String>,
    /// When false, no external command runs; file artifacts are still
    /// written. Used by tests and dry runs.
    pub external_commands: bool,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            hosts_path: PathBuf::from("/etc/hosts"),
            anchor_path: PathBuf::from("/etc/pf.anchors/focus.shield"),
            pf_conf_path: PathBuf::from("/etc/pf.conf"),
            flush_interface: std::env::var("SHIELD_FLUSH_INTERFACE").ok(),
            external_commands: true,
        }
    }
}

/// Applies policy to the enforcement surfaces.
pub struct Enforcer {
    hosts: HostsFile,
    firewall: Firewall,
    flush_interface: Option<String>,
    external_commands: bool,
}

impl Enforcer {
    /// Creates an enforcer over the configured surface locations.
    #[must_use]
    pub fn new(config: EnforcerConfig) -> Self {
        Self {
            hosts: HostsFile::new(&config.hosts_path),
            firewall: Firewall::new(
                &config.anchor_path,
                &config.pf_conf_path,
                config.external_commands,
            ),
            flush_interface: config.flush_interface,
            external_commands: config.external_commands,
        }
    }

    /// Applies surfaces 1 and 2 for the given shield flag and enforced
    /// set.
    ///
    /// The hosts region is the primary lever: its failure fails the
    /// operation and nothing further runs. Anchor failures are logged and
    /// retried on the next call.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] only for the hosts surface.
    pub async fn apply_primary(
        &self,
        shield: bool,
        enforced: &BTreeSet<String>,
    ) -> Result<(), SurfaceError> {
        self.hosts.apply(shield, enforced)?;

        if let Err(e) = self.firewall.ensure_reference() {
            warn!(error = %e, "pf reference install failed; retrying on next apply");
        }
        if let Err(e) = self.firewall.apply(shield, enforced).await {
            warn!(error = %e, "pf anchor apply failed; retrying on next apply");
        }
        Ok(())
    }

    /// The aggressive cascade for a domain that must stop being reachable
    /// *now*: resolve via the trusted resolver, add dynamic rules, kill
    /// live flows, close tabs, flush the resolver cache.
    ///
    /// Everything here is best-effort by contract; the hosts region has
    /// already re-blocked the domain before this runs.
    pub async fn aggressive_block(&self, domain: &str) {
        info!(domain, "aggressive re-block cascade");
        let ips = resolve::resolve_domain(domain, self.external_commands).await;
        if let Err(e) = self.firewall.add_dynamic(domain, &ips).await {
            warn!(domain, error = %e, "dynamic rule install failed");
        }
        self.firewall.kill_states(domain, &ips).await;
        browser::close_matching_tabs(domain, self.external_commands).await;
        self.flush_dns().await;
    }

    /// Removes the dynamic rules for a granted domain. Best-effort.
    pub async fn lift_dynamic(&self, domain: &str) {
        if let Err(e) = self.firewall.remove_dynamic(domain).await {
            warn!(domain, error = %e, "dynamic rule removal failed");
        }
    }

    /// Invalidates the system resolver cache. Best-effort.
    pub async fn flush_dns(&self) {
        resolver_cache::flush(self.flush_interface.as_deref(), self.external_commands).await;
    }
}
