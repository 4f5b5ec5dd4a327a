//! The four enforcement surfaces.
//!
//! Surface 1 (hosts region) and surface 2 (packet-filter anchor) are
//! load-bearing: their writes are atomic and their failures are surfaced.
//! Surfaces 3 and 4 (connection kills, tab closes) and the resolver-cache
//! flush are best-effort: failures are logged and swallowed.

pub mod browser;
pub mod firewall;
pub mod hosts;
pub mod resolver_cache;

use shield_core::fs_safe::FsSafeError;

use crate::cmd::CmdError;

/// Errors from the load-bearing surfaces.
#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    /// An atomic file operation failed; the previous on-disk state is
    /// intact.
    #[error("surface file operation failed: {0}")]
    File(#[from] FsSafeError),

    /// A kernel control command failed.
    #[error("surface command failed: {0}")]
    Command(#[from] CmdError),
}
