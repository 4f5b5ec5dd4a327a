//! IPC client for the enforcement agent.
//!
//! Connects to the agent's Unix socket per request (connect, send one
//! length-prefixed JSON frame, read one back, close), with a deadline on
//! the whole round trip. Stateless per call.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shield_core::ipc::{
    AgentRequest, AgentResponse, AllowanceInfo, MAX_FRAME_SIZE, frame_message,
    parse_frame_length,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Default round-trip deadline.
///
/// A revoke cascade resolves, reloads the filter, kills flows, and drives
/// browsers; generous but bounded.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from agent IPC.
#[derive(Debug, thiserror::Error)]
pub enum AgentClientError {
    /// The agent socket does not exist or refused the connection.
    #[error("agent is not running")]
    AgentNotRunning,

    /// The round trip exceeded its deadline.
    #[error("agent request timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error during communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame exceeded the protocol cap.
    #[error("frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Observed size.
        size: usize,
        /// Protocol cap.
        max: usize,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serde(String),

    /// The agent answered with an error.
    #[error("agent error: {0}")]
    Agent(String),

    /// The agent answered with the wrong response type.
    #[error("unexpected agent response: {0}")]
    UnexpectedResponse(String),
}

/// Status report from the agent.
#[derive(Debug, Clone)]
pub struct AgentStatus {
    /// Shield flag as the agent sees it.
    pub shield: bool,
    /// Size of the mirrored blocklist.
    pub blocked_count: usize,
    /// Active allowances the agent tracks.
    pub active_allowances: Vec<AllowanceInfo>,
}

/// Client handle for the agent socket.
#[derive(Debug, Clone)]
pub struct AgentClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl AgentClient {
    /// Creates a client for the given socket path.
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overrides the round-trip deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The socket path this client targets.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Sends one request and reads one response.
    ///
    /// # Errors
    ///
    /// Returns [`AgentClientError`] on transport failure; an
    /// [`AgentResponse::Error`] body is returned as `Ok` for the caller to
    /// interpret.
    pub async fn request(
        &self,
        request: &AgentRequest,
    ) -> Result<AgentResponse, AgentClientError> {
        match tokio::time::timeout(self.timeout, self.round_trip(request)).await {
            Ok(result) => result,
            Err(_) => Err(AgentClientError::Timeout(self.timeout)),
        }
    }

    async fn round_trip(
        &self,
        request: &AgentRequest,
    ) -> Result<AgentResponse, AgentClientError> {
        if !self.socket_path.exists() {
            return Err(AgentClientError::AgentNotRunning);
        }

        let mut stream = match UnixStream::connect(&self.socket_path).await {
            Ok(s) => s,
            Err(e)
                if e.kind() == std::io::ErrorKind::NotFound
                    || e.kind() == std::io::ErrorKind::ConnectionRefused =>
            {
                return Err(AgentClientError::AgentNotRunning);
            },
            Err(e) => return Err(e.into()),
        };

        let payload =
            serde_json::to_vec(request).map_err(|e| AgentClientError::Serde(e.to_string()))?;
        if payload.len() > MAX_FRAME_SIZE {
            return Err(AgentClientError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        stream.write_all(&frame_message(&payload)).await?;
        stream.flush().await?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).await?;
        let len = parse_frame_length(&len_buf).map_err(|e| match e {
            shield_core::ipc::FrameError::TooLarge { size, max } => {
                AgentClientError::FrameTooLarge { size, max }
            },
            other => AgentClientError::Serde(other.to_string()),
        })?;

        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await?;
        serde_json::from_slice(&buf).map_err(|e| AgentClientError::Serde(e.to_string()))
    }

    /// Sends a request and requires a plain `Ok` back.
    ///
    /// # Errors
    ///
    /// Transport failure, an agent-side error, or an unexpected response
    /// type.
    pub async fn expect_ok(&self, request: &AgentRequest) -> Result<(), AgentClientError> {
        match self.request(request).await? {
            AgentResponse::Ok => Ok(()),
            AgentResponse::Error { message } => Err(AgentClientError::Agent(message)),
            other => Err(AgentClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }

    /// Pushes the effectively blocked set.
    ///
    /// # Errors
    ///
    /// See [`AgentClient::expect_ok`].
    pub async fn blocklist(&self, domains: &BTreeSet<String>) -> Result<(), AgentClientError> {
        self.expect_ok(&AgentRequest::Blocklist {
            domains: domains.iter().cloned().collect(),
        })
        .await
    }

    /// Records an allowance on the agent.
    ///
    /// # Errors
    ///
    /// See [`AgentClient::expect_ok`].
    pub async fn grant(
        &self,
        domain: &str,
        minutes: u32,
        reason: &str,
    ) -> Result<(), AgentClientError> {
        self.expect_ok(&AgentRequest::Grant {
            domain: domain.to_string(),
            minutes,
            reason: reason.to_string(),
        })
        .await
    }

    /// Runs the revoke cascade for a domain.
    ///
    /// # Errors
    ///
    /// See [`AgentClient::expect_ok`].
    pub async fn revoke(&self, domain: &str) -> Result<(), AgentClientError> {
        self.expect_ok(&AgentRequest::Revoke {
            domain: domain.to_string(),
        })
        .await
    }

    /// Runs the aggressive cascade for a freshly blocked domain.
    ///
    /// # Errors
    ///
    /// See [`AgentClient::expect_ok`].
    pub async fn enforce_block(&self, domain: &str) -> Result<(), AgentClientError> {
        self.expect_ok(&AgentRequest::EnforceBlock {
            domain: domain.to_string(),
        })
        .await
    }

    /// Turns the shield on.
    ///
    /// # Errors
    ///
    /// See [`AgentClient::expect_ok`].
    pub async fn enable(&self) -> Result<(), AgentClientError> {
        self.expect_ok(&AgentRequest::Enable).await
    }

    /// Turns the shield off.
    ///
    /// # Errors
    ///
    /// See [`AgentClient::expect_ok`].
    pub async fn disable(&self) -> Result<(), AgentClientError> {
        self.expect_ok(&AgentRequest::Disable).await
    }

    /// Flushes the system resolver cache.
    ///
    /// # Errors
    ///
    /// See [`AgentClient::expect_ok`].
    pub async fn flush_dns(&self) -> Result<(), AgentClientError> {
        self.expect_ok(&AgentRequest::FlushDns).await
    }

    /// Fetches the agent status report.
    ///
    /// # Errors
    ///
    /// Transport failure or an unexpected response type.
    pub async fn status(&self) -> Result<AgentStatus, AgentClientError> {
        match self.request(&AgentRequest::Status).await? {
            AgentResponse::Status {
                shield,
                blocked_count,
                active_allowances,
                ..
            } => Ok(AgentStatus {
                shield,
                blocked_count,
                active_allowances,
            }),
            AgentResponse::Error { message } => Err(AgentClientError::Agent(message)),
            other => Err(AgentClientError::UnexpectedResponse(format!("{other:?}"))),
        }
    }
}
