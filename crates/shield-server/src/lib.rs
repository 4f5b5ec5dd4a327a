//! shield-server - Focus Shield control server library.
//!
//! The unprivileged half of Focus Shield. Owns the authoritative policy
//! store, exposes the HTTP policy API on loopback, enforces caller-visible
//! policy (hard lockouts, grant-time caps), and drives the privileged
//! agent over its IPC socket.
//!
//! # Modules
//!
//! - [`state`]: shared server state and the policy actions behind every
//!   endpoint
//! - [`routes`]: the REST surface
//! - [`tools`]: the bearer-token remote tool surface
//! - [`agent_client`]: IPC client for the enforcement agent
//! - [`token`]: bearer-token generation and verification
//! - [`ticker`]: the defensive allowance-expiry ticker

pub mod agent_client;
pub mod error;
pub mod routes;
pub mod state;
pub mod ticker;
pub mod token;
pub mod tools;
