//! # shield-core
//!
//! Core library for Focus Shield - a host-local distraction blocker.
//!
//! This crate provides the building blocks shared by the enforcement agent
//! and the control server:
//!
//! - **Domain model**: canonicalization, subdomain-inclusive matching, and
//!   the closed service-variant table
//! - **Policy store**: the authoritative policy document (blocklist, delay
//!   list, allowances, hard lockouts) with atomic persistence
//! - **IPC**: the agent wire protocol (length-prefixed JSON frames over a
//!   Unix socket)
//! - **Categories**: installer-facing bundles of default blocked domains
//!
//! The agent and the server are separate processes; they share only this
//! crate. Neither imports the other.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod categories;
pub mod domain;
pub mod fs_safe;
pub mod ipc;
pub mod policy;

pub use domain::{canonicalize, domain_matches};
pub use policy::{Allowance, HardLockout, PolicyDocument, PolicyStore};
