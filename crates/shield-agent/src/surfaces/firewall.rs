//! The packet-filter anchor.
//!
//! The agent owns a named pf anchor: a reference line pair in the main
//! packet-filter configuration (appended exactly once) and an anchor file
//! rewritten atomically. The anchor carries two kinds of rules:
//!
//! - *Static*: a short, fixed table of well-known corporate CIDR ranges
//!   for the largest services, present whenever the shield is on. Coarse
//!   by design.
//! - *Dynamic*: per-IP rules added when a domain needs aggressive
//!   enforcement (revocation, fresh block). Each carries the domain as a
//!   trailing comment so it can later be removed selectively.
//!
//! Reloads go through `pfctl`; a failed reload leaves the anchor file in
//! whichever state the write reached, and the next apply retries.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shield_core::fs_safe;
use tracing::{info, warn};

use super::SurfaceError;
use crate::cmd;

/// The pf anchor name.
pub const ANCHOR_NAME: &str = "focus.shield";

/// Deadline for `pfctl` invocations.
const PFCTL_TIMEOUT: Duration = Duration::from_secs(5);

/// Well-known corporate ranges for the largest offenders, blocked outbound
/// whenever the shield is on. Ownership of IP space drifts; the dynamic
/// per-domain rules are the load-bearing mechanism.
const STATIC_RANGES: &[(&str, &str)] = &[
    ("31.13.24.0/21", "facebook"),
    ("31.13.64.0/18", "facebook"),
    ("157.240.0.0/16", "facebook"),
    ("69.171.224.0/19", "facebook"),
    ("66.220.144.0/20", "facebook"),
    ("104.244.40.0/21", "twitter"),
    ("199.59.148.0/22", "twitter"),
    ("192.133.76.0/22", "twitter"),
];

/// Header comment for the anchor file.
const ANCHOR_HEADER: &str = "# focus.shield anchor - managed by shield-agent, do not edit\n";

/// Formats one dynamic per-IP rule tagged with its domain.
#[must_use]
pub fn dynamic_rule(ip: IpAddr, domain: &str) -> String {
    format!("block drop out quick proto {{ tcp, udp }} to {ip} # {domain}")
}

/// Extracts the domain tag from a dynamic rule line, if it is one.
#[must_use]
pub fn dynamic_rule_domain(line: &str) -> Option<&str> {
    if !line.starts_with("block drop out quick") {
        return None;
    }
    let (_, tag) = line.rsplit_once(" # ")?;
    if tag.starts_with("static:") {
        return None;
    }
    Some(tag.trim())
}

/// The reference lines the main pf configuration must carry.
#[must_use]
pub fn reference_lines(anchor_path: &Path) -> String {
    format!(
        "anchor \"{ANCHOR_NAME}\"\nload anchor \"{ANCHOR_NAME}\" from \"{}\"\n",
        anchor_path.display()
    )
}

fn render_anchor(static_enabled: bool, dynamic: &[String]) -> String {
    let mut out = String::from(ANCHOR_HEADER);
    if static_enabled {
        for (cidr, service) in STATIC_RANGES {
            let _ = writeln!(
                out,
                "block drop out quick proto {{ tcp, udp }} to {cidr} # static:{service}"
            );
        }
    }
    for rule in dynamic {
        out.push_str(rule);
        out.push('\n');
    }
    out
}

/// The packet-filter surface.
#[derive(Debug, Clone)]
pub struct Firewall {
    anchor_path: PathBuf,
    pf_conf_path: PathBuf,
    /// When false, file artifacts are still written but no `pfctl`
    /// invocation happens. Used by tests and dry runs.
    external_commands: bool,
}

impl Firewall {
    /// Creates the surface.
    #[must_use]
    pub fn new(
        anchor_path: impl Into<PathBuf>,
        pf_conf_path: impl Into<PathBuf>,
        external_commands: bool,
    ) -> Self {
        Self {
            anchor_path: anchor_path.into(),
            pf_conf_path: pf_conf_path.into(),
            external_commands,
        }
    }

    /// The anchor file path.
    #[must_use]
    pub fn anchor_path(&self) -> &Path {
        &self.anchor_path
    }

    fn read_anchor(&self) -> Result<String, SurfaceError> {
        if !self.anchor_path.exists() {
            return Ok(String::new());
        }
        Ok(String::from_utf8_lossy(&fs_safe::bounded_read(
            &self.anchor_path,
            fs_safe::DEFAULT_MAX_FILE_SIZE,
        )?)
        .into_owned())
    }

    fn current_dynamic_rules(&self) -> Result<Vec<String>, SurfaceError> {
        Ok(self
            .read_anchor()?
            .lines()
            .filter(|l| dynamic_rule_domain(l).is_some())
            .map(str::to_string)
            .collect())
    }

    /// Guarantees the reference line pair exists in the main pf
    /// configuration, appending it at most once across the agent's
    /// lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the configuration cannot be read or
    /// rewritten.
    pub fn ensure_reference(&self) -> Result<bool, SurfaceError> {
        let current = if self.pf_conf_path.exists() {
            String::from_utf8_lossy(&fs_safe::bounded_read(
                &self.pf_conf_path,
                fs_safe::DEFAULT_MAX_FILE_SIZE,
            )?)
            .into_owned()
        } else {
            String::new()
        };

        let needle = format!("anchor \"{ANCHOR_NAME}\"");
        if current.lines().any(|l| l.trim() == needle) {
            return Ok(false);
        }

        let mut next = current;
        if !next.is_empty() && !next.ends_with('\n') {
            next.push('\n');
        }
        next.push_str(&reference_lines(&self.anchor_path));
        fs_safe::atomic_write_mode(&self.pf_conf_path, next.as_bytes(), 0o644)?;
        info!(path = %self.pf_conf_path.display(), "pf anchor reference installed");
        Ok(true)
    }

    /// Rewrites the anchor for the current shield flag and enforced set.
    ///
    /// Dynamic rules whose tagged domain is still in the enforced set are
    /// retained; rules for granted or unblocked domains drop out. When the
    /// shield is off the anchor is emptied to its header.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] on file failure. Reload failures are
    /// logged and left for the next apply to retry.
    pub async fn apply(
        &self,
        shield: bool,
        enforced: &BTreeSet<String>,
    ) -> Result<(), SurfaceError> {
        let dynamic = if shield {
            self.current_dynamic_rules()?
                .into_iter()
                .filter(|rule| {
                    dynamic_rule_domain(rule).is_some_and(|d| enforced.contains(d))
                })
                .collect()
        } else {
            Vec::new()
        };

        let contents = render_anchor(shield, &dynamic);
        fs_safe::atomic_write_mode(&self.anchor_path, contents.as_bytes(), 0o644)?;
        self.reload().await;
        Ok(())
    }

    /// Appends dynamic rules for every resolved address of a domain and
    /// reloads.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] on file failure.
    pub async fn add_dynamic(
        &self,
        domain: &str,
        ips: &[IpAddr],
    ) -> Result<(), SurfaceError> {
        if ips.is_empty() {
            return Ok(());
        }

        let mut rules = self.current_dynamic_rules()?;
        for ip in ips {
            let rule = dynamic_rule(*ip, domain);
            if !rules.contains(&rule) {
                rules.push(rule);
            }
        }

        let contents = render_anchor(true, &rules);
        fs_safe::atomic_write_mode(&self.anchor_path, contents.as_bytes(), 0o644)?;
        info!(domain, ips = ips.len(), "dynamic filter rules added");
        self.reload().await;
        Ok(())
    }

    /// Removes every dynamic rule tagged with the domain and reloads.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] on file failure.
    pub async fn remove_dynamic(&self, domain: &str) -> Result<(), SurfaceError> {
        let rules = self.current_dynamic_rules()?;
        let retained: Vec<String> = rules
            .iter()
            .filter(|r| dynamic_rule_domain(r) != Some(domain))
            .cloned()
            .collect();
        if retained.len() == rules.len() {
            return Ok(());
        }

        // Preserve whether the static section was present.
        let static_present = self
            .read_anchor()?
            .lines()
            .any(|l| l.contains("# static:"));
        let contents = render_anchor(static_present, &retained);
        fs_safe::atomic_write_mode(&self.anchor_path, contents.as_bytes(), 0o644)?;
        info!(domain, "dynamic filter rules removed");
        self.reload().await;
        Ok(())
    }

    /// Reloads the packet filter from the main configuration. Best-effort:
    /// a failure here is logged and the next apply retries.
    pub async fn reload(&self) {
        if !self.external_commands {
            return;
        }
        let conf = self.pf_conf_path.display().to_string();
        if !cmd::run_best_effort("pfctl", &["-f", &conf], PFCTL_TIMEOUT).await {
            warn!("packet filter reload failed; previous ruleset remains loaded");
        }
        // Enabling an already-enabled filter exits non-zero on some
        // releases; treat as best-effort noise.
        cmd::run_best_effort("pfctl", &["-E"], PFCTL_TIMEOUT).await;
    }

    /// Tears down live state entries to the given addresses so existing
    /// keep-alive connections observe the block immediately. Best-effort.
    pub async fn kill_states(&self, domain: &str, ips: &[IpAddr]) {
        if !self.external_commands {
            return;
        }
        for ip in ips {
            let ip = ip.to_string();
            info!(domain, ip = %ip, "killing live flows");
            cmd::run_best_effort("pfctl", &["-k", "0.0.0.0/0", "-k", &ip], PFCTL_TIMEOUT).await;
        }
    }
}
