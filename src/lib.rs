#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! wsexec — expose command-line programs as interactive WebSocket endpoints.
//!
//! Each accepted WebSocket connection spawns one subprocess and is bridged
//! to it for the connection's lifetime: process stdout lines become outbound
//! text frames, inbound text frames become stdin lines. The executable is
//! either one fixed configured command or resolved per-request from a script
//! directory (CGI-style, including `PATH_INFO`).
//!
//! ```text
//! main.rs     — entry point, clap flags, tracing init, serve loop
//! config.rs   — TOML + env-var + CLI configuration
//! resolve.rs  — request path → executable (script-directory mode)
//! env.rs      — CGI-style child environment from request metadata
//! process.rs  — target spawning, process-group teardown
//! bridge.rs   — per-connection state machine, upgrade handler
//! pump.rs     — the four byte-stream pump routines
//! ```

pub mod bridge;
pub mod config;
pub mod env;
pub mod process;
pub mod pump;
pub mod resolve;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use resolve::UrlInfo;

/// Shared application state passed to the upgrade handler via Axum's `State`
/// extractor. The registered route and this state are the only process-wide
/// state; everything else lives per connection.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

/// Build the router: the WebSocket endpoint at the configured base path and
/// every path beneath it.
pub fn router(state: AppState) -> Router {
    let base = state.config.server.base_path.trim_end_matches('/').to_string();
    let mount = if base.is_empty() { "/".to_string() } else { base.clone() };
    Router::new()
        .route(&mount, get(bridge::ws_upgrade))
        .route(&format!("{base}/{{*rest}}"), get(bridge::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
