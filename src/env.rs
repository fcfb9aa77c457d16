//! CGI-style execution environment for spawned targets.
//!
//! The child process receives **only** the variables built here — the
//! launcher clears the inherited environment. `PATH` is re-exported so
//! scripts can still find ordinary tools.

use std::fmt;
use std::net::SocketAddr;

use axum::http::HeaderMap;

use crate::config::Config;
use crate::resolve::UrlInfo;

/// Request metadata captured before the WebSocket upgrade completes.
///
/// Header maps and URIs are not available on the upgraded socket, so the
/// handler snapshots what the environment builder needs up front.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    /// Peer socket address.
    pub remote_addr: SocketAddr,
    /// Full request path as received (before base-path stripping).
    pub path: String,
    /// Raw query string, without the `?`.
    pub query: Option<String>,
    /// All request headers.
    pub headers: HeaderMap,
}

/// Errors produced by [`build_env`].
#[derive(Debug)]
pub enum EnvError {
    /// A request header value is not valid UTF-8 and cannot be exported.
    InvalidHeader(String),
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::InvalidHeader(name) => {
                write!(f, "header {name} is not valid UTF-8")
            }
        }
    }
}

impl std::error::Error for EnvError {}

/// Build the complete ordered `KEY=VALUE` environment for one connection.
///
/// Field conventions follow CGI: server identity, peer address, script
/// routing results, and every request header as `HTTP_<NAME>`.
pub fn build_env(
    meta: &RequestMeta,
    config: &Config,
    url_info: &UrlInfo,
) -> Result<Vec<String>, EnvError> {
    let mut env = Vec::with_capacity(12 + meta.headers.len());

    env.push(format!(
        "SERVER_SOFTWARE=wsexec/{}",
        env!("CARGO_PKG_VERSION")
    ));
    env.push("GATEWAY_INTERFACE=CGI/1.1".to_string());
    env.push("SERVER_PROTOCOL=HTTP/1.1".to_string());

    let (server_name, server_port) = server_identity(meta, config);
    env.push(format!("SERVER_NAME={server_name}"));
    env.push(format!("SERVER_PORT={server_port}"));

    env.push(format!("REMOTE_ADDR={}", meta.remote_addr.ip()));
    env.push(format!("REMOTE_PORT={}", meta.remote_addr.port()));

    env.push(format!("SCRIPT_NAME={}", url_info.script_path));
    env.push(format!("PATH_INFO={}", url_info.path_info));
    env.push(format!(
        "QUERY_STRING={}",
        meta.query.as_deref().unwrap_or("")
    ));

    let path = std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string());
    env.push(format!("PATH={path}"));

    for (name, value) in &meta.headers {
        let value = value
            .to_str()
            .map_err(|_| EnvError::InvalidHeader(name.as_str().to_string()))?;
        let key = name.as_str().to_ascii_uppercase().replace('-', "_");
        env.push(format!("HTTP_{key}={value}"));
    }

    Ok(env)
}

/// Server name/port for the environment: the `Host` header when present,
/// otherwise the configured listen address.
fn server_identity(meta: &RequestMeta, config: &Config) -> (String, String) {
    let host = meta
        .headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok());
    let authority = host.unwrap_or(&config.server.listen);
    match authority.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => {
            (name.to_string(), port.to_string())
        }
        _ => (authority.to_string(), "80".to_string()),
    }
}
