//! The remote tool surface.
//!
//! A single bearer-token-authenticated endpoint accepting structured tool
//! calls that map 1:1 onto the REST surface. Remote callers (the model
//! tool, a companion app) get exactly the public contract: status, list,
//! check, grant capped at 30 minutes, add-block, and remove-block with the
//! hard-lockout refusal. The transport is ordinary JSON-over-HTTP; the
//! tool set and its semantics are the contract.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::state::ServerState;

/// One structured tool call.
#[derive(Debug, Deserialize)]
pub struct ToolCall {
    /// Tool name.
    pub tool: String,
    /// Tool arguments; shape depends on the tool.
    #[serde(default)]
    pub args: Value,
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ApiError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::Validation(format!("missing string argument: {key}")))
}

fn arg_u32(args: &Value, key: &str) -> Result<u32, ApiError> {
    args.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| ApiError::Validation(format!("missing integer argument: {key}")))
}

/// `POST /tool`.
///
/// # Errors
///
/// `401` without a valid bearer token; tool-specific refusals otherwise.
pub async fn handle_tool(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(call): Json<ToolCall>,
) -> Result<Json<Value>, ApiError> {
    state.token.authorize(&headers, &query)?;

    let result = match call.tool.as_str() {
        "status" => serde_json::to_value(state.status().await).unwrap_or_default(),
        "list_blocked" => json!({ "domains": state.blocked_domains() }),
        "check" => {
            let domain = arg_str(&call.args, "domain")?;
            serde_json::to_value(state.check(domain)?).unwrap_or_default()
        },
        "grant" => {
            let domain = arg_str(&call.args, "domain")?;
            let minutes = arg_u32(&call.args, "minutes")?;
            let reason = call
                .args
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default();
            // Public surface: the 30-minute cap is not negotiable here.
            let allowance = state.grant(domain, minutes, reason, false).await?;
            json!({
                "domain": allowance.domain,
                "minutes": allowance.granted_minutes,
                "expires_at": allowance.expires_at,
            })
        },
        "add_block" => {
            let domain = state.add_block(arg_str(&call.args, "domain")?).await?;
            json!({ "domain": domain, "blocked": true })
        },
        "remove_block" => {
            let domain = state.remove_block(arg_str(&call.args, "domain")?).await?;
            json!({ "domain": domain, "removed": true })
        },
        other => {
            return Err(ApiError::Validation(format!("unknown tool: {other}")));
        },
    };

    Ok(Json(json!({ "ok": true, "result": result })))
}
