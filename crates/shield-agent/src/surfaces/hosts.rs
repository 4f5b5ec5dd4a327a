//! The host-name override region.
//!
//! The agent owns a delimited region of the OS hosts file, bracketed by
//! sentinel markers. On every update the region is stripped and, when the
//! shield is on and the enforced set is non-empty, rewritten as a pure
//! function of that set: one IPv4 null line and one IPv6 null line per
//! covered host name. Bytes outside the sentinels are never touched.
//!
//! The rewrite is atomic (temp + fsync + rename, mode 0644) and safe to
//! run any number of times.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use shield_core::domain::expand_variants;
use shield_core::fs_safe;
use tracing::info;

use super::SurfaceError;

/// First line of the owned region.
pub const BEGIN_MARKER: &str = "# BEGIN FOCUS SHIELD BLOCK";

/// Last line of the owned region.
pub const END_MARKER: &str = "# END FOCUS SHIELD BLOCK";

/// Strips the sentinel region, byte-preserving everything outside it.
#[must_use]
pub fn strip_region(contents: &str) -> String {
    let mut out = String::with_capacity(contents.len());
    let mut in_region = false;
    for line in contents.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == BEGIN_MARKER {
            in_region = true;
            continue;
        }
        if trimmed == END_MARKER {
            in_region = false;
            continue;
        }
        if !in_region {
            out.push_str(line);
        }
    }
    out
}

/// Renders the override entries for the enforced set.
///
/// Host names are collected into a sorted, deduplicated set first so the
/// region is a deterministic function of the input: two applies of the
/// same set yield byte-identical regions.
#[must_use]
pub fn render_entries(enforced: &BTreeSet<String>) -> String {
    let names: BTreeSet<String> = enforced.iter().flat_map(|d| expand_variants(d)).collect();

    let mut out = String::new();
    for name in &names {
        out.push_str("0.0.0.0 ");
        out.push_str(name);
        out.push('\n');
        out.push_str(":: ");
        out.push_str(name);
        out.push('\n');
    }
    out
}

/// Produces the new hosts-file contents: previous contents with the region
/// stripped, plus a fresh region when `entries` is present.
#[must_use]
pub fn splice_region(contents: &str, entries: Option<&str>) -> String {
    let mut out = strip_region(contents);
    if let Some(entries) = entries {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(BEGIN_MARKER);
        out.push('\n');
        out.push_str(entries);
        out.push_str(END_MARKER);
        out.push('\n');
    }
    out
}

/// The hosts file surface.
#[derive(Debug, Clone)]
pub struct HostsFile {
    path: PathBuf,
}

impl HostsFile {
    /// Creates the surface for the given hosts file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The underlying path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the owned region to reflect `enforced` (empty region when
    /// the shield is off or the set is empty).
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError`] if the file cannot be read or atomically
    /// replaced; the previous contents remain intact on failure.
    pub fn apply(
        &self,
        shield: bool,
        enforced: &BTreeSet<String>,
    ) -> Result<(), SurfaceError> {
        let current = if self.path.exists() {
            String::from_utf8_lossy(&fs_safe::bounded_read(
                &self.path,
                fs_safe::DEFAULT_MAX_FILE_SIZE,
            )?)
            .into_owned()
        } else {
            String::new()
        };

        let entries = if shield && !enforced.is_empty() {
            Some(render_entries(enforced))
        } else {
            None
        };
        let next = splice_region(&current, entries.as_deref());

        if next == current {
            return Ok(());
        }

        fs_safe::atomic_write_mode(&self.path, next.as_bytes(), 0o644)?;
        info!(
            path = %self.path.display(),
            domains = enforced.len(),
            active = entries.is_some(),
            "hosts region rewritten"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "##\n# Host Database\n##\n127.0.0.1\tlocalhost\n::1             localhost\n";

    fn set(domains: &[&str]) -> BTreeSet<String> {
        domains.iter().map(|d| (*d).to_string()).collect()
    }

    #[test]
    fn apply_then_clear_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, BASE).unwrap();

        let hosts = HostsFile::new(&path);
        hosts.apply(true, &set(&["twitter.com"])).unwrap();
        let blocked = std::fs::read_to_string(&path).unwrap();
        assert!(blocked.contains(BEGIN_MARKER));
        assert!(blocked.contains("0.0.0.0 twitter.com"));
        assert!(blocked.contains("0.0.0.0 www.twitter.com"));
        assert!(blocked.contains(":: twitter.com"));

        hosts.apply(false, &set(&["twitter.com"])).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), BASE);
    }

    #[test]
    fn double_apply_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, BASE).unwrap();

        let hosts = HostsFile::new(&path);
        hosts.apply(true, &set(&["reddit.com", "x.com"])).unwrap();
        let once = std::fs::read(&path).unwrap();
        hosts.apply(true, &set(&["reddit.com", "x.com"])).unwrap();
        let twice = std::fs::read(&path).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn region_survives_surrounding_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");
        std::fs::write(&path, BASE).unwrap();

        let hosts = HostsFile::new(&path);
        hosts.apply(true, &set(&["reddit.com"])).unwrap();

        // Another tool appends below the region.
        let mut contents = std::fs::read_to_string(&path).unwrap();
        contents.push_str("192.168.1.10 printer.local\n");
        std::fs::write(&path, &contents).unwrap();

        hosts.apply(true, &set(&["reddit.com", "x.com"])).unwrap();
        let after = std::fs::read_to_string(&path).unwrap();
        assert!(after.contains("printer.local"));
        assert!(after.contains("0.0.0.0 x.com"));
        assert_eq!(
            after.matches(BEGIN_MARKER).count(),
            1,
            "exactly one region"
        );
    }

    #[test]
    fn service_variants_are_emitted() {
        let entries = render_entries(&set(&["youtube.com"]));
        for name in [
            "m.youtube.com",
            "music.youtube.com",
            "youtu.be",
            "youtube-nocookie.com",
        ] {
            assert!(entries.contains(&format!("0.0.0.0 {name}\n")), "{name}");
            assert!(entries.contains(&format!(":: {name}\n")), "{name}");
        }
    }

    #[test]
    fn empty_set_renders_no_region() {
        assert_eq!(splice_region(BASE, None), BASE);
        let spliced = splice_region(BASE, Some(""));
        assert!(spliced.contains(BEGIN_MARKER));
        assert_eq!(strip_region(&spliced), BASE);
    }

    #[test]
    fn overlapping_domains_deduplicate() {
        let entries = render_entries(&set(&["youtube.com", "youtu.be"]));
        assert_eq!(entries.matches("0.0.0.0 youtu.be\n").count(), 1);
    }

    #[test]
    fn missing_file_is_created_with_region_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts");

        let hosts = HostsFile::new(&path);
        hosts.apply(true, &set(&["x.com"])).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with(BEGIN_MARKER));
        assert!(contents.trim_end().ends_with(END_MARKER));
    }
}
