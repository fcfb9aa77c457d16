//! Request-path to executable resolution.
//!
//! In fixed-command mode resolution is trivial: the whole request path is
//! handed to the target as extra path information and no filesystem access
//! occurs. In script-directory mode the path is walked segment by segment
//! against the script root; the first non-directory hit is the script and
//! any unconsumed segments become `PATH_INFO` (CGI-style).

use std::fmt;
use std::path::PathBuf;

use crate::config::Config;

/// The resolved routing result for one connection. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlInfo {
    /// URL-path prefix identifying the script, relative to the base path.
    pub script_path: String,
    /// Remaining URL-path suffix not consumed by the script, or empty.
    pub path_info: String,
    /// Absolute filesystem path of the resolved executable; empty when not
    /// in script-directory mode.
    pub file_path: PathBuf,
}

/// Errors produced by [`resolve_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// The request path does not map to a runnable target.
    ScriptNotFound,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::ScriptNotFound => write!(f, "script not found"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// Reject path segments that could address anything outside the script root.
///
/// Existence checks alone do not enforce containment (`..` exists as a
/// directory), so dot segments and NUL bytes fail resolution before any
/// filesystem access.
fn segment_is_unsafe(segment: &str) -> bool {
    segment == "." || segment == ".." || segment.contains('\0')
}

/// Map a request path (relative to the base path) to a [`UrlInfo`].
///
/// Outside script-directory mode this never touches the filesystem and never
/// fails: the entire path passes through as `path_info`.
///
/// In script-directory mode, segments are walked left to right. Each
/// accumulated candidate must exist under the script root; a directory at
/// the final segment is not invokable and fails. The first file hit wins —
/// leftover segments are joined into `path_info` with a leading `/`.
pub fn resolve_path(path: &str, config: &Config) -> Result<UrlInfo, ResolveError> {
    let Some(script_dir) = config.target.script_dir.as_deref() else {
        return Ok(UrlInfo {
            script_path: "/".to_string(),
            path_info: path.to_string(),
            file_path: PathBuf::new(),
        });
    };

    let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let mut script_path = String::new();
    let mut file_path = PathBuf::from(script_dir);

    for (i, &part) in parts.iter().enumerate() {
        if segment_is_unsafe(part) {
            return Err(ResolveError::ScriptNotFound);
        }
        script_path.push('/');
        script_path.push_str(part);
        file_path.push(part);
        let is_last = i == parts.len() - 1;

        let Ok(meta) = std::fs::metadata(&file_path) else {
            // not a valid path
            return Err(ResolveError::ScriptNotFound);
        };

        // at the end of the url but is a dir
        if is_last && meta.is_dir() {
            return Err(ResolveError::ScriptNotFound);
        }

        // we've hit a dir, carry on looking
        if meta.is_dir() {
            continue;
        }

        // no extra segments
        if is_last {
            return Ok(UrlInfo {
                script_path,
                path_info: String::new(),
                file_path,
            });
        }

        // leftover segments become path info
        return Ok(UrlInfo {
            script_path,
            path_info: format!("/{}", parts[i + 1..].join("/")),
            file_path,
        });
    }
    // Every iteration of the final segment returns or fails above.
    unreachable!("resolve_path consumed all segments without a verdict");
}
