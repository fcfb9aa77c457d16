#![deny(clippy::all)]
#![warn(clippy::pedantic)]

//! # wsexec
//!
//! Expose command-line programs as interactive WebSocket endpoints.
//!
//! ```text
//! wsexec --listen 127.0.0.1:8080 -- cat          # one fixed command
//! wsexec --dir /var/scripts                      # resolve per request path
//! ```
//!
//! Every accepted connection spawns one process; lines written to stdout
//! arrive at the client as text frames, client text frames arrive on stdin.
//! Closing either side tears down the other.

use std::net::SocketAddr;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use wsexec::{router, AppState, Config};

/// Expose command-line programs as interactive WebSocket endpoints.
#[derive(Parser)]
#[command(name = "wsexec", version)]
struct Cli {
    /// Path to TOML config file.
    #[arg(long)]
    config: Option<String>,
    /// Socket address to listen on.
    #[arg(long)]
    listen: Option<String>,
    /// URL path to mount the WebSocket endpoint at.
    #[arg(long)]
    base_path: Option<String>,
    /// Resolve the executable per request from this directory tree.
    #[arg(long, value_name = "DIR", conflicts_with = "command")]
    dir: Option<String>,
    /// Log at debug level (connects, resolutions, spawn failures).
    #[arg(short, long)]
    verbose: bool,
    /// Fixed command (and arguments) to run for every connection.
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref());

    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if let Some(base) = cli.base_path {
        config.server.base_path = base;
    }
    if let Some(dir) = cli.dir {
        config.target.script_dir = Some(dir);
    }
    if let Some((command, args)) = cli.command.split_first() {
        config.target.command = Some(command.clone());
        config.target.args = args.to_vec();
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }

    if config.using_script_dir() && config.target.command.is_some() {
        eprintln!("wsexec: --dir and COMMAND are mutually exclusive");
        std::process::exit(2);
    }
    if !config.using_script_dir() && config.target.command.is_none() {
        eprintln!("wsexec: either --dir or a COMMAND is required");
        std::process::exit(2);
    }

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("wsexec v{} starting", env!("CARGO_PKG_VERSION"));
    if let Some(dir) = &config.target.script_dir {
        info!(
            "Listening on ws://{}{} -> {dir}",
            config.server.listen, config.server.base_path
        );
    } else {
        info!(
            "Listening on ws://{}{} -> {} {}",
            config.server.listen,
            config.server.base_path,
            config.target.command.as_deref().unwrap_or_default(),
            config.target.args.join(" ")
        );
    }

    let state = AppState::new(config);
    let listener = TcpListener::bind(&state.config.server.listen)
        .await
        .expect("Failed to bind");
    let app = router(state);

    // Graceful shutdown on SIGINT/SIGTERM; in-flight bridges are dropped.
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .expect("Server error");

    info!("Goodbye");
}
