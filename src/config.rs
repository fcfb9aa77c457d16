//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Command-line flags** — `--listen`, `--base-path`, `--dir`,
//!    `--verbose`, trailing `COMMAND [ARGS]...` (applied in `main`)
//! 2. **Environment variables** — `WSEXEC_LISTEN`, `WSEXEC_BASE_PATH`
//! 3. **Config file** — path via `--config <path>`, or `wsexec.toml` in CWD
//! 4. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "127.0.0.1:8080"
//! base_path = "/"
//!
//! [target]
//! script_dir = "/var/scripts"   # script-directory mode
//! # or:
//! command = "ls"                # fixed-command mode
//! args = ["-l"]                 # appended in both modes
//!
//! [logging]
//! level = "info"
//! ```

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration, deserialized from TOML. Immutable after startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `127.0.0.1:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// URL path the WebSocket endpoint is mounted at (default `/`).
    /// All upgrade requests under this path are dispatched to the bridge.
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

/// What to run for each connection.
///
/// Exactly one of `script_dir` / `command` must be set; `main` enforces this
/// after merging CLI flags. When `script_dir` is set the executable is
/// resolved per-request from the directory tree and `command` is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetConfig {
    /// Script root directory. Present => script-directory mode.
    pub script_dir: Option<String>,
    /// Fixed command to spawn for every connection.
    pub command: Option<String>,
    /// Arguments appended to the command — or to the resolved script path in
    /// script-directory mode.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` or
    /// `--verbose` (which forces `debug`).
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_base_path() -> String {
    "/".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            base_path: default_base_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            target: TargetConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise
    /// looks for `wsexec.toml` in the current directory, falling back to
    /// compiled defaults. Command-line overrides are applied by the caller.
    pub fn load(path: Option<&str>) -> Self {
        let mut config: Config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content)
                .unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("wsexec.toml").exists() {
            let content =
                std::fs::read_to_string("wsexec.toml").expect("Failed to read wsexec.toml");
            toml::from_str(&content).expect("Failed to parse wsexec.toml")
        } else {
            Config::default()
        };

        // Env var overrides
        if let Ok(listen) = std::env::var("WSEXEC_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(base) = std::env::var("WSEXEC_BASE_PATH") {
            config.server.base_path = base;
        }

        config
    }

    /// Whether the executable is resolved per-request from a directory tree
    /// rather than being one fixed configured command.
    pub fn using_script_dir(&self) -> bool {
        self.target.script_dir.is_some()
    }
}
