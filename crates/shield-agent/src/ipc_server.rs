//! IPC server for the enforcement agent.
//!
//! Listens on a Unix socket and serves length-prefixed JSON
//! request/response pairs. The socket is world-writable (0666) so the
//! unprivileged control server can reach the root agent; the protocol
//! itself only accepts policy the agent would enforce anyway, and anything
//! malformed gets an error response.
//!
//! Runs until shutdown is requested via the shared state, then removes the
//! socket file.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use shield_core::ipc::{self, AgentRequest, AgentResponse};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::dispatch;
use crate::enforcer::Enforcer;
use crate::state::AgentState;

/// Runs the IPC server.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound or its permissions set.
pub async fn run(
    socket_path: PathBuf,
    state: Arc<AgentState>,
    enforcer: Arc<Enforcer>,
) -> Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(&socket_path).context("failed to remove stale socket")?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create socket directory")?;
    }

    let listener = UnixListener::bind(&socket_path).context("failed to bind Unix socket")?;

    // World-writable: the control server runs unprivileged.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o666))
            .context("failed to set socket permissions")?;
    }

    info!("IPC server listening on {:?}", socket_path);

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let state = Arc::clone(&state);
                        let enforcer = Arc::clone(&enforcer);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, state, enforcer).await {
                                debug!("connection handler error: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        error!("failed to accept connection: {e}");
                    }
                }
            }

            () = wait_for_shutdown(&state) => {
                info!("IPC server shutting down");
                break;
            }
        }
    }

    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }

    Ok(())
}

async fn wait_for_shutdown(state: &AgentState) {
    loop {
        if state.is_shutdown_requested() {
            return;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}

async fn handle_connection(
    mut stream: UnixStream,
    state: Arc<AgentState>,
    enforcer: Arc<Enforcer>,
) -> Result<()> {
    debug!("new IPC connection");

    loop {
        let request = match read_request(&mut stream).await {
            Ok(Some(req)) => req,
            Ok(None) => {
                debug!("IPC connection closed");
                break;
            },
            Err(e) => {
                warn!("failed to read request: {e}");
                let resp = AgentResponse::Error {
                    message: format!("bad request: {e}"),
                };
                let _ = send_response(&mut stream, &resp).await;
                break;
            },
        };

        let response = dispatch::handle(request, &state, &enforcer).await;

        if let Err(e) = send_response(&mut stream, &response).await {
            warn!("failed to send response: {e}");
            break;
        }
    }

    Ok(())
}

/// Reads a framed request. Returns `Ok(None)` on clean close.
async fn read_request(stream: &mut UnixStream) -> Result<Option<AgentRequest>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {},
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Ok(None);
        },
        Err(e) => return Err(e.into()),
    }

    let len = ipc::parse_frame_length(&len_buf).context("invalid frame length")?;

    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;

    let request: AgentRequest =
        serde_json::from_slice(&payload).context("failed to parse request")?;
    Ok(Some(request))
}

async fn send_response(stream: &mut UnixStream, response: &AgentResponse) -> Result<()> {
    let json = serde_json::to_vec(response).context("failed to serialize response")?;
    let framed = ipc::frame_message(&json);
    stream.write_all(&framed).await?;
    stream.flush().await?;
    Ok(())
}
