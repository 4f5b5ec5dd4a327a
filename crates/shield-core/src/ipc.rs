//! Agent wire protocol.
//!
//! The control server (and any other local caller) talks to the privileged
//! enforcement agent over a Unix domain socket. Messages are plain JSON,
//! framed with a 4-byte big-endian length prefix, one request/response pair
//! per round trip.
//!
//! The `op` tag values are the protocol contract: `blocklist`, `grant`,
//! `revoke`, `enforce-block`, `enable`, `disable`, `flush-dns`, `clear`,
//! `status`.

use serde::{Deserialize, Serialize};

/// Maximum frame size for agent IPC messages.
///
/// Policy payloads are small (a domain list tops out in the tens of
/// kilobytes); 1 MiB leaves ample headroom while bounding allocation from a
/// misbehaving peer.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Framing errors.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length prefix is shorter than 4 bytes.
    #[error("truncated frame header: {0} bytes")]
    TruncatedHeader(usize),

    /// The declared payload length exceeds [`MAX_FRAME_SIZE`].
    #[error("frame too large: {size} bytes (max: {max})")]
    TooLarge {
        /// Declared payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },
}

/// A request to the enforcement agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "kebab-case")]
pub enum AgentRequest {
    /// Replace the mirrored blocklist with the effectively blocked set and
    /// reapply the hosts and packet-filter surfaces.
    ///
    /// The caller sends the *effective* set (blocklist minus active
    /// allowances); the agent never re-derives it.
    Blocklist {
        /// Canonical domains to enforce.
        domains: Vec<String>,
    },

    /// Record a time-limited allowance and reapply without the domain.
    Grant {
        /// Canonical domain.
        domain: String,
        /// Allowance length in minutes.
        minutes: u32,
        /// Caller-supplied reason, kept for the status report.
        reason: String,
    },

    /// Drop an allowance and aggressively re-block: dynamic filter rules,
    /// connection kills, tab closes, resolver-cache flush.
    Revoke {
        /// Canonical domain.
        domain: String,
    },

    /// Run the same aggressive cascade as `revoke` for a freshly blocked
    /// domain.
    EnforceBlock {
        /// Canonical domain.
        domain: String,
    },

    /// Turn the shield on and populate the enforcement surfaces.
    Enable,

    /// Turn the shield off and clear the enforcement surfaces. Policy is
    /// retained.
    Disable,

    /// Invalidate the system resolver cache.
    FlushDns,

    /// Turn the shield off and drop all allowances.
    Clear,

    /// Report agent status.
    Status,
}

/// A summary of one active allowance, as reported by `status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllowanceInfo {
    /// Canonical domain.
    pub domain: String,
    /// Whole minutes remaining, rounded up.
    pub remaining_minutes: u32,
    /// Reason given at grant time.
    pub reason: String,
}

/// A response from the enforcement agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum AgentResponse {
    /// The operation completed; surfaces 1 and 2 reflect the request.
    Ok,

    /// Status report.
    Status {
        /// Always true when the agent can answer at all.
        running: bool,
        /// Current shield flag.
        shield: bool,
        /// Number of domains in the mirrored blocklist.
        blocked_count: usize,
        /// Active allowances.
        active_allowances: Vec<AllowanceInfo>,
    },

    /// The operation failed; surfaces retain their previous on-disk state.
    Error {
        /// Human-readable failure description.
        message: String,
    },
}

/// Frames a message payload with a 4-byte big-endian length prefix.
#[must_use]
pub fn frame_message(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(4 + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Parses a frame length prefix, enforcing [`MAX_FRAME_SIZE`].
///
/// # Errors
///
/// Returns [`FrameError`] if the header is truncated or the declared
/// length exceeds the cap.
pub fn parse_frame_length(header: &[u8]) -> Result<usize, FrameError> {
    if header.len() < 4 {
        return Err(FrameError::TruncatedHeader(header.len()));
    }
    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(len)
}
