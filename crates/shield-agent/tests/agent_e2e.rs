//! End-to-end tests for the agent: crash recovery and the IPC socket.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use shield_agent::enforcer::{Enforcer, EnforcerConfig};
use shield_agent::ipc_server;
use shield_agent::state::{AgentMirror, AgentState};
use shield_agent::surfaces::hosts::{BEGIN_MARKER, END_MARKER};
use shield_core::ipc::{AgentRequest, AgentResponse, frame_message, parse_frame_length};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

fn enforcer_for(dir: &TempDir) -> Arc<Enforcer> {
    Arc::new(Enforcer::new(EnforcerConfig {
        hosts_path: dir.path().join("hosts"),
        anchor_path: dir.path().join("anchor"),
        pf_conf_path: dir.path().join("pf.conf"),
        flush_interface: None,
        external_commands: false,
    }))
}

/// The restore path main() runs before binding the socket: load the
/// mirror, reapply surfaces 1 and 2.
async fn restore(state: &AgentState, enforcer: &Enforcer) {
    let mirror = state.snapshot();
    if mirror.shield && !mirror.domains.is_empty() {
        enforcer
            .apply_primary(true, &state.enforced_set())
            .await
            .expect("restore must succeed");
    }
}

#[tokio::test]
async fn crash_recovery_reapplies_all_domains_before_ipc() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hosts"), "127.0.0.1 localhost\n").unwrap();

    // Simulate the pre-crash mirror: 12 blocked domains, shield on.
    let mut mirror = AgentMirror::default();
    for i in 0..12 {
        mirror.domains.insert(format!("site{i}.example.com"));
    }
    shield_core::fs_safe::atomic_write_json(&dir.path().join("mirror.json"), &mirror).unwrap();

    // "Restart": fresh state handle, restore before any IPC exists.
    let state = AgentState::load(dir.path().join("mirror.json")).unwrap();
    let enforcer = enforcer_for(&dir);
    restore(&state, &enforcer).await;

    let hosts = std::fs::read_to_string(dir.path().join("hosts")).unwrap();
    assert!(hosts.contains(BEGIN_MARKER) && hosts.contains(END_MARKER));
    for i in 0..12 {
        assert!(
            hosts.contains(&format!("0.0.0.0 site{i}.example.com")),
            "site{i} missing after recovery"
        );
    }
    let anchor = std::fs::read_to_string(dir.path().join("anchor")).unwrap();
    assert!(anchor.contains("# static:"));
}

#[tokio::test]
async fn restore_with_shield_off_clears_stale_region() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("hosts"),
        format!("127.0.0.1 localhost\n{BEGIN_MARKER}\n0.0.0.0 stale.example.com\n{END_MARKER}\n"),
    )
    .unwrap();

    let mut mirror = AgentMirror::default();
    mirror.shield = false;
    mirror.domains.insert("stale.example.com".into());
    shield_core::fs_safe::atomic_write_json(&dir.path().join("mirror.json"), &mirror).unwrap();

    let state = AgentState::load(dir.path().join("mirror.json")).unwrap();
    let enforcer = enforcer_for(&dir);
    // Shield off: main() skips restore, but an explicit apply must clear.
    enforcer
        .apply_primary(false, &state.enforced_set())
        .await
        .unwrap();

    let hosts = std::fs::read_to_string(dir.path().join("hosts")).unwrap();
    assert!(!hosts.contains("stale.example.com"));
    assert_eq!(hosts, "127.0.0.1 localhost\n");
}

async fn roundtrip(stream: &mut UnixStream, request: &AgentRequest) -> AgentResponse {
    let payload = serde_json::to_vec(request).unwrap();
    stream.write_all(&frame_message(&payload)).await.unwrap();
    stream.flush().await.unwrap();

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = parse_frame_length(&len_buf).unwrap();
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.unwrap();
    serde_json::from_slice(&buf).unwrap()
}

#[tokio::test]
async fn ipc_socket_serves_requests_until_shutdown() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hosts"), "127.0.0.1 localhost\n").unwrap();
    let socket_path = dir.path().join("agent.sock");

    let state = Arc::new(AgentState::load(dir.path().join("mirror.json")).unwrap());
    let enforcer = enforcer_for(&dir);

    let server = tokio::spawn(ipc_server::run(
        socket_path.clone(),
        Arc::clone(&state),
        Arc::clone(&enforcer),
    ));

    // Wait for the socket to appear.
    for _ in 0..50 {
        if socket_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let mut stream = UnixStream::connect(&socket_path).await.unwrap();

    let resp = roundtrip(
        &mut stream,
        &AgentRequest::Blocklist {
            domains: vec!["twitter.com".into(), "reddit.com".into()],
        },
    )
    .await;
    assert_eq!(resp, AgentResponse::Ok);

    match roundtrip(&mut stream, &AgentRequest::Status).await {
        AgentResponse::Status {
            running,
            shield,
            blocked_count,
            ..
        } => {
            assert!(running);
            assert!(shield);
            assert_eq!(blocked_count, 2);
        },
        other => panic!("expected status, got {other:?}"),
    }

    // The 200-before-response ordering: by the time Ok came back, the
    // hosts region reflects the set.
    let hosts = std::fs::read_to_string(dir.path().join("hosts")).unwrap();
    assert!(hosts.contains("0.0.0.0 twitter.com"));
    assert!(hosts.contains("0.0.0.0 reddit.com"));

    state.request_shutdown();
    let result = tokio::time::timeout(Duration::from_secs(2), server).await;
    assert!(result.is_ok(), "server must drain promptly");
    assert!(!socket_path.exists(), "socket removed on drain");
}

#[tokio::test]
async fn malformed_frame_gets_an_error_response() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("hosts"), "127.0.0.1 localhost\n").unwrap();
    let socket_path = dir.path().join("agent.sock");

    let state = Arc::new(AgentState::load(dir.path().join("mirror.json")).unwrap());
    let enforcer = enforcer_for(&dir);
    let _server = tokio::spawn(ipc_server::run(
        socket_path.clone(),
        Arc::clone(&state),
        enforcer,
    ));
    for _ in 0..50 {
        if socket_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let mut stream = UnixStream::connect(&socket_path).await.unwrap();
    stream
        .write_all(&frame_message(b"{\"op\":\"no-such-op\"}"))
        .await
        .unwrap();

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = parse_frame_length(&len_buf).unwrap();
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.unwrap();
    let resp: AgentResponse = serde_json::from_slice(&buf).unwrap();
    assert!(matches!(resp, AgentResponse::Error { .. }));

    state.request_shutdown();
}
