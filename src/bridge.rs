//! Per-connection bridging between a WebSocket and a subprocess.
//!
//! ## Connection lifecycle
//!
//! 1. The upgrade handler snapshots request metadata (peer address, path,
//!    query, headers) — none of it is reachable once the socket is upgraded.
//! 2. After the upgrade: resolve the target, build its environment, spawn
//!    it. Any failure here logs and returns, which closes the socket without
//!    an application-level error frame — a client never learns *why*.
//! 3. Four pump tasks bridge the byte streams (see [`crate::pump`]). The
//!    handler itself blocks on the termination channel and acts on the first
//!    tag only; later tags from the other pumps are ignored.
//! 4. Teardown: stop the feeding pumps, give the socket writer a short grace
//!    to flush frames already in flight, kill the process group, return.
//!    Returning drops the socket halves, which closes the connection; closed
//!    pipes and a closed socket unblock any pump that is still running.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocket;
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderMap, Uri};
use axum::response::Response;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::env::{self, RequestMeta};
use crate::process::{self, ProcessHandle};
use crate::pump::{self, Pump};
use crate::resolve;
use crate::AppState;

/// How long the socket writer may keep flushing after the first termination
/// signal. Matters when the process exits with frames still queued outbound.
const FLUSH_GRACE: Duration = Duration::from_millis(500);

/// WebSocket upgrade handler for every path under the base path.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    uri: Uri,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let meta = RequestMeta {
        remote_addr,
        path: uri.path().to_string(),
        query: uri.query().map(ToString::to_string),
        headers,
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, meta))
}

/// The per-connection state machine: resolve → environment → spawn →
/// bridge → terminate.
async fn handle_socket(socket: WebSocket, state: AppState, meta: RequestMeta) {
    let conn = Uuid::new_v4();
    debug!("websocket {conn}: connect from {} to {}", meta.remote_addr, meta.path);

    let relative = base_relative_path(&meta.path, &state.config.server.base_path);
    let url_info = match resolve::resolve_path(&relative, &state.config) {
        Ok(info) => info,
        Err(e) => {
            debug!("websocket {conn}: {e}: {}", meta.path);
            return;
        }
    };
    debug!(
        "websocket {conn}: script {} path_info {:?}",
        url_info.script_path, url_info.path_info
    );

    let child_env = match env::build_env(&meta, &state.config, &url_info) {
        Ok(child_env) => child_env,
        Err(e) => {
            warn!("websocket {conn}: could not set up environment: {e}");
            return;
        }
    };

    let command = if state.config.using_script_dir() {
        url_info.file_path.to_string_lossy().into_owned()
    } else {
        state.config.target.command.clone().unwrap_or_default()
    };

    let ProcessHandle {
        child,
        stdin,
        stdout,
    } = match process::spawn_target(&command, &state.config.target.args, &child_env) {
        Ok(handle) => handle,
        Err(e) => {
            warn!("websocket {conn}: failed to start {command}: {e}");
            return;
        }
    };
    debug!("websocket {conn}: started {command} (pid {:?})", child.id());

    let (done_tx, mut done_rx) = mpsc::channel::<Pump>(4);
    let (outbound_tx, outbound_rx) = mpsc::channel::<String>(1);
    let (inbound_tx, inbound_rx) = mpsc::channel::<String>(1);
    let (ws_sink, ws_stream) = socket.split();

    let read_process = tokio::spawn(pump::read_process(stdout, outbound_tx, done_tx.clone()));
    let mut write_socket = tokio::spawn(pump::write_socket(ws_sink, outbound_rx, done_tx.clone()));
    let read_socket = tokio::spawn(pump::read_socket(ws_stream, inbound_tx, done_tx.clone()));
    let write_process = tokio::spawn(pump::write_process(stdin, inbound_rx, done_tx.clone()));
    drop(done_tx);

    // recv() cannot yield None here: a pump sends its tag before exiting and
    // all four are alive until the aborts below.
    let first = done_rx.recv().await;
    debug!("websocket {conn}: bridging ended by {first:?}");

    // Stop everything feeding the channels, then let the socket writer drain
    // what is already in flight. It exits on its own once the outbound sender
    // is gone (or as soon as a send fails against a closed peer).
    read_process.abort();
    read_socket.abort();
    write_process.abort();
    if tokio::time::timeout(FLUSH_GRACE, &mut write_socket).await.is_err() {
        write_socket.abort();
    }

    process::terminate(child).await;
    debug!("websocket {conn}: disconnect");
}

/// Strip the configured base path from a request path; the resolver works on
/// base-relative paths. Paths outside the base pass through untouched (the
/// router only dispatches paths under the base, so this is belt-and-braces).
fn base_relative_path(path: &str, base_path: &str) -> String {
    if base_path == "/" {
        return path.to_string();
    }
    let base = base_path.trim_end_matches('/');
    match path.strip_prefix(base) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_base_path_passes_through() {
        assert_eq!(base_relative_path("/foo/bar", "/"), "/foo/bar");
        assert_eq!(base_relative_path("/", "/"), "/");
    }

    #[test]
    fn base_prefix_is_stripped() {
        assert_eq!(base_relative_path("/ws/foo", "/ws"), "/foo");
        assert_eq!(base_relative_path("/ws/foo/bar", "/ws/"), "/foo/bar");
        assert_eq!(base_relative_path("/ws", "/ws"), "/");
    }

    #[test]
    fn unrelated_paths_pass_through() {
        assert_eq!(base_relative_path("/wsx", "/ws"), "/wsx");
        assert_eq!(base_relative_path("/other", "/ws"), "/other");
    }
}
