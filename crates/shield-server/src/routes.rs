//! The REST policy API.
//!
//! Every endpoint is a thin wrapper over [`ServerState`]; bodies are JSON
//! and failures render as `{error}` with the status from
//! [`crate::error::ApiError`]. The router is bound to loopback only by
//! `main`, so this surface carries no authentication; the remote tool
//! surface (`/tool`) is the bearer-token one.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::ServerState;
use crate::tools;

/// Request bodies are tiny; 64 KiB bounds a misbehaving caller.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Builds the full router, REST plus the tool surface.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/api/blocked", get(get_blocked))
        .route("/api/block", post(post_block))
        .route("/api/block/{domain}", delete(delete_block))
        .route("/api/check/{domain}", get(get_check))
        .route("/api/grant", post(post_grant))
        .route("/api/grant/{domain}", delete(delete_grant))
        .route("/api/allowances", get(get_allowances))
        .route("/api/shield/enable", post(post_shield_enable))
        .route("/api/shield/disable", post(post_shield_disable))
        .route("/api/delayed", get(get_delayed))
        .route("/api/delay", post(post_delay))
        .route("/api/delay/{domain}", delete(delete_delay))
        .route("/api/locks", get(get_locks))
        .route("/api/lock", post(post_lock))
        .route("/api/lock/{domain}", delete(delete_lock))
        .route("/api/flush-dns", post(post_flush_dns))
        .route("/tool", post(tools::handle_tool))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct DomainBody {
    domain: String,
}

#[derive(Debug, Deserialize)]
struct GrantBody {
    domain: String,
    minutes: u32,
    #[serde(default)]
    reason: String,
    /// Raises the cap from the public 30 minutes to 24 hours. Loopback
    /// callers are already local-trust; the flag exists so the default
    /// path keeps the friction-sized cap.
    #[serde(default)]
    privileged: bool,
}

#[derive(Debug, Deserialize)]
struct LockBody {
    domain: String,
    /// RFC 3339 instant or a plain `YYYY-MM-DD` date.
    until: String,
}

fn parse_until(raw: &str) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| ApiError::Validation(format!("invalid date: {raw}")))?;
        return Ok(midnight.and_utc());
    }
    Err(ApiError::Validation(format!(
        "invalid until date: {raw} (expected RFC 3339 or YYYY-MM-DD)"
    )))
}

async fn get_status(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(serde_json::to_value(state.status().await).unwrap_or_default())
}

async fn get_blocked(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({ "domains": state.blocked_domains() }))
}

async fn post_block(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<DomainBody>,
) -> Result<Json<Value>, ApiError> {
    let domain = state.add_block(&body.domain).await?;
    Ok(Json(json!({ "domain": domain, "blocked": true })))
}

async fn delete_block(
    State(state): State<Arc<ServerState>>,
    Path(domain): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let domain = state.remove_block(&domain).await?;
    Ok(Json(json!({ "domain": domain, "removed": true })))
}

async fn get_check(
    State(state): State<Arc<ServerState>>,
    Path(domain): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let payload = state.check(&domain)?;
    Ok(Json(serde_json::to_value(payload).unwrap_or_default()))
}

async fn post_grant(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<GrantBody>,
) -> Result<Json<Value>, ApiError> {
    let allowance = state
        .grant(&body.domain, body.minutes, &body.reason, body.privileged)
        .await?;
    Ok(Json(json!({
        "domain": allowance.domain,
        "minutes": allowance.granted_minutes,
        "reason": allowance.reason,
        "expires_at": allowance.expires_at,
    })))
}

async fn delete_grant(
    State(state): State<Arc<ServerState>>,
    Path(domain): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let revoked = state.revoke(&domain).await?;
    Ok(Json(json!({ "domain": domain, "revoked": revoked })))
}

async fn get_allowances(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({ "allowances": state.allowances() }))
}

async fn post_shield_enable(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Value>, ApiError> {
    state.set_shield(true).await?;
    Ok(Json(json!({ "shield": true })))
}

async fn post_shield_disable(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Value>, ApiError> {
    state.set_shield(false).await?;
    Ok(Json(json!({ "shield": false })))
}

async fn get_delayed(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({ "domains": state.delayed_domains() }))
}

async fn post_delay(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<DomainBody>,
) -> Result<Json<Value>, ApiError> {
    state.add_delay(&body.domain)?;
    Ok(Json(json!({ "domain": body.domain, "delayed": true })))
}

async fn delete_delay(
    State(state): State<Arc<ServerState>>,
    Path(domain): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.remove_delay(&domain)?;
    Ok(Json(json!({ "domain": domain, "removed": removed })))
}

async fn get_locks(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({ "locks": state.locks() }))
}

async fn post_lock(
    State(state): State<Arc<ServerState>>,
    Json(body): Json<LockBody>,
) -> Result<Json<Value>, ApiError> {
    let until = parse_until(&body.until)?;
    let lock = state.add_lock(&body.domain, until).await?;
    Ok(Json(serde_json::to_value(lock).unwrap_or_default()))
}

async fn delete_lock(
    State(state): State<Arc<ServerState>>,
    Path(domain): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.remove_lock(&domain)?;
    Ok(Json(json!({ "domain": domain, "removed": removed })))
}

async fn post_flush_dns(State(state): State<Arc<ServerState>>) -> Result<Json<Value>, ApiError> {
    state.flush_dns().await?;
    Ok(Json(json!({ "flushed": true })))
}
