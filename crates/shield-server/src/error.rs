//! API error kinds and their HTTP mapping.
//!
//! Every failure a handler can produce is one of these kinds; the
//! `IntoResponse` impl turns them into `{error}` JSON bodies with the
//! status the contract requires (policy refusals are 403, agent outages
//! 502).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde_json::json;
use shield_core::policy::PolicyError;
use thiserror::Error;

use crate::agent_client::AgentClientError;

/// Errors surfaced by the policy API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed domain, out-of-range minutes, or unparseable input.
    #[error("{0}")]
    Validation(String),

    /// The mutation is vetoed by an active hard lockout.
    #[error("{domain} is hard-locked until {}", until.format("%Y-%m-%d"))]
    LockoutRefusal {
        /// Domain the lockout covers.
        domain: String,
        /// When the lockout expires on its own.
        until: DateTime<Utc>,
    },

    /// IPC to the enforcement agent failed; no policy was persisted for
    /// enforcement-reducing calls.
    #[error("enforcement agent unavailable: {0}")]
    AgentUnavailable(String),

    /// Missing or wrong bearer token on the remote tool surface.
    #[error("unauthorized")]
    Unauthorized,

    /// Persistence or other internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The HTTP status for this error kind.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::LockoutRefusal { .. } => StatusCode::FORBIDDEN,
            Self::AgentUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::InvalidDomain(e) => Self::Validation(e.to_string()),
            PolicyError::MinutesOutOfRange { .. } => Self::Validation(err.to_string()),
            PolicyError::Persist(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<AgentClientError> for ApiError {
    fn from(err: AgentClientError) -> Self {
        Self::AgentUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn lockout_message_carries_the_date() {
        let err = ApiError::LockoutRefusal {
            domain: "twitter.com".into(),
            until: Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap(),
        };
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(err.to_string().contains("2099-01-01"));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::AgentUnavailable("down".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }
}
