//! Bearer token for the remote tool surface.
//!
//! Generated once on first run (32 random bytes, hex-encoded), stored with
//! owner-only permissions, and accepted either as an `Authorization:
//! Bearer` header or a `token` query parameter. Comparison is
//! constant-time.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use axum::http::HeaderMap;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::info;

use crate::error::ApiError;

/// The loaded bearer token.
#[derive(Clone)]
pub struct ApiToken {
    value: String,
}

impl std::fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiToken").finish_non_exhaustive()
    }
}

impl ApiToken {
    /// Loads the token from `path`, generating and persisting a fresh one
    /// (mode 0600) when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read or written.
    pub fn load_or_generate(path: &Path) -> std::io::Result<Self> {
        if path.exists() {
            let value = std::fs::read_to_string(path)?.trim().to_string();
            return Ok(Self { value });
        }

        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let value = bytes.iter().fold(String::new(), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        });

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &value)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        info!(path = %path.display(), "bearer token generated");
        Ok(Self { value })
    }

    /// Builds a token from a literal value (tests).
    #[must_use]
    pub fn from_value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Constant-time verification of a presented token.
    #[must_use]
    pub fn verify(&self, presented: &str) -> bool {
        presented.as_bytes().ct_eq(self.value.as_bytes()).into()
    }

    /// Authorizes a request from its headers or `token` query parameter.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthorized`] when no valid token is present.
    pub fn authorize(
        &self,
        headers: &HeaderMap,
        query: &HashMap<String, String>,
    ) -> Result<(), ApiError> {
        let presented = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .or_else(|| query.get("token").map(String::as_str));

        match presented {
            Some(tok) if self.verify(tok) => Ok(()),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_once_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");

        let first = ApiToken::load_or_generate(&path).unwrap();
        let second = ApiToken::load_or_generate(&path).unwrap();
        assert!(first.verify(&second.value));
        assert_eq!(second.value.len(), 64);
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_owner_only() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token");
        ApiToken::load_or_generate(&path).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().mode() & 0o777, 0o600);
    }

    #[test]
    fn authorize_accepts_header_or_query() {
        let token = ApiToken::from_value("sekrit");

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer sekrit".parse().unwrap(),
        );
        assert!(token.authorize(&headers, &HashMap::new()).is_ok());

        let query = HashMap::from([("token".to_string(), "sekrit".to_string())]);
        assert!(token.authorize(&HeaderMap::new(), &query).is_ok());

        let bad = HashMap::from([("token".to_string(), "wrong".to_string())]);
        assert!(token.authorize(&HeaderMap::new(), &bad).is_err());
        assert!(token.authorize(&HeaderMap::new(), &HashMap::new()).is_err());
    }
}
