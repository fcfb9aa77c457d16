//! Target process spawning.
//!
//! [`spawn_target`] starts the executable for one connection with piped
//! stdin/stdout and the environment produced by [`crate::env::build_env`].
//! All spawns set `kill_on_drop(true)` so orphaned processes are cleaned up
//! if the owning task is cancelled.

use std::io;
use std::process::Stdio;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// A live subprocess plus the two pipe ends the pumps operate on.
///
/// Owned exclusively by the connection bridge for the connection's duration;
/// at most one handle exists per connection.
#[derive(Debug)]
pub struct ProcessHandle {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

/// SIGKILL the target's process group and reap the child.
///
/// The target is spawned as a process group leader, so `kill(-pid, ...)`
/// reaches any children it forked. Safe to call after the process has
/// already exited.
pub async fn terminate(mut child: Child) {
    if let Some(pid) = child.id() {
        #[allow(clippy::cast_possible_wrap)]
        let pgid = pid as i32;
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
    let _ = child.kill().await;
}

/// Start `command` with `args` and exactly the given `KEY=VALUE` environment.
///
/// The inherited environment is cleared; stderr stays attached to the
/// server's own stderr so script diagnostics remain visible. The child is
/// made a process group leader via `setpgid(0, 0)` so teardown can signal
/// its whole tree.
///
/// Fails when the executable cannot be started. No process survives a
/// failure partway through setup: the pipes are wired by `spawn` itself, and
/// a missing stdio handle afterwards kills the child before returning.
pub fn spawn_target(command: &str, args: &[String], env: &[String]) -> io::Result<ProcessHandle> {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .env_clear()
        .envs(env.iter().filter_map(|kv| kv.split_once('=')))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);
    // SAFETY: setpgid is async-signal-safe per POSIX.
    unsafe {
        cmd.pre_exec(|| {
            libc::setpgid(0, 0);
            Ok(())
        });
    }
    let mut child = cmd.spawn()?;

    let Some(stdin) = child.stdin.take() else {
        child.start_kill().ok();
        return Err(io::Error::other("stdin pipe missing after spawn"));
    };
    let Some(stdout) = child.stdout.take() else {
        child.start_kill().ok();
        return Err(io::Error::other("stdout pipe missing after spawn"));
    };

    Ok(ProcessHandle {
        child,
        stdin,
        stdout,
    })
}
