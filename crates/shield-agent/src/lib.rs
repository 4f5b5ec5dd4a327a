//! shield-agent - Focus Shield enforcement agent library.
//!
//! The agent is the privileged half of Focus Shield. It owns the four
//! enforcement surfaces (hosts override region, packet-filter anchor, live
//! connection kills, browser tab closes), mirrors the effectively blocked
//! set pushed by the control server, and runs the expiry sweeper that
//! re-blocks when allowances lapse.
//!
//! # Modules
//!
//! - [`state`]: persisted mirror of the enforced policy
//! - [`enforcer`]: effective-apply sequencing across the surfaces
//! - [`surfaces`]: the concrete OS-level artifacts
//! - [`ipc_server`]: length-prefixed JSON IPC over a Unix socket
//! - [`sweep`]: the allowance-expiry ticker

pub mod cmd;
pub mod dispatch;
pub mod enforcer;
pub mod ipc_server;
pub mod resolve;
pub mod state;
pub mod surfaces;
pub mod sweep;
