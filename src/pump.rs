//! The four per-connection pump routines.
//!
//! Two read-then-forward loops (process stdout → outbound channel, socket →
//! inbound channel) and two forward-then-write loops (outbound channel →
//! socket, inbound channel → process stdin). Each loop runs until its first
//! EOF or I/O error, then reports which pump ended on the shared termination
//! channel and exits. The termination channel's capacity covers all four
//! senders, so reporting never blocks and the bridge simply takes the first
//! arrival.
//!
//! Message contract: one line of process output per outbound text frame, one
//! inbound text frame per line of process input. Within a direction order is
//! FIFO; the two directions are independent. Channels are capacity-1, so a
//! slow consumer stalls its own direction only.

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::mpsc::{Receiver, Sender};

/// Identifies which pump routine observed the end of the connection first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pump {
    ProcessReader,
    SocketWriter,
    SocketReader,
    ProcessWriter,
}

/// Read process stdout line by line and forward each line outbound.
///
/// Ends on stdout EOF (process exited or closed its end), on a read error,
/// or when the outbound consumer is gone.
pub async fn read_process(stdout: ChildStdout, outbound: Sender<String>, done: Sender<Pump>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if outbound.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) | Err(_) => break,
        }
    }
    let _ = done.send(Pump::ProcessReader).await;
}

/// Forward outbound messages to the socket as text frames.
///
/// Ends on a send error (peer gone) or when the outbound producer is gone.
pub async fn write_socket(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: Receiver<String>,
    done: Sender<Pump>,
) {
    while let Some(line) = outbound.recv().await {
        if sink.send(Message::Text(line.into())).await.is_err() {
            break;
        }
    }
    let _ = done.send(Pump::SocketWriter).await;
}

/// Forward incoming text frames to the inbound channel.
///
/// Binary, ping and pong frames are ignored (text-only contract; control
/// frames are answered by the protocol layer). Ends on a close frame, a
/// receive error, or when the inbound consumer is gone.
pub async fn read_socket(
    mut stream: SplitStream<WebSocket>,
    inbound: Sender<String>,
    done: Sender<Pump>,
) {
    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                if inbound.send(text.to_string()).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
    let _ = done.send(Pump::SocketReader).await;
}

/// Write each inbound message to process stdin as one line.
///
/// Ends on a write error (broken pipe) or when the inbound producer is gone.
/// Dropping stdin on exit delivers EOF to the process.
pub async fn write_process(
    mut stdin: ChildStdin,
    mut inbound: Receiver<String>,
    done: Sender<Pump>,
) {
    while let Some(line) = inbound.recv().await {
        if stdin.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if stdin.write_all(b"\n").await.is_err() {
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
    let _ = done.send(Pump::ProcessWriter).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{spawn_target, ProcessHandle};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const TICK: Duration = Duration::from_secs(5);

    fn plain_env() -> Vec<String> {
        vec!["PATH=/usr/bin:/bin".to_string()]
    }

    #[tokio::test]
    async fn lines_round_trip_through_cat_in_order() {
        let ProcessHandle {
            child,
            stdin,
            stdout,
        } = spawn_target("/bin/cat", &[], &plain_env()).unwrap();

        let (outbound_tx, mut outbound_rx) = mpsc::channel(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (done_tx, mut done_rx) = mpsc::channel(4);

        tokio::spawn(read_process(stdout, outbound_tx, done_tx.clone()));
        tokio::spawn(write_process(stdin, inbound_rx, done_tx.clone()));
        drop(done_tx);

        for line in ["first", "second", "third"] {
            inbound_tx.send(line.to_string()).await.unwrap();
            let echoed = timeout(TICK, outbound_rx.recv()).await.unwrap().unwrap();
            assert_eq!(echoed, line);
        }

        // Socket side goes away: the writer exits, stdin drops, cat sees EOF
        // and exits, and the reader follows on stdout EOF.
        drop(inbound_tx);
        let first = timeout(TICK, done_rx.recv()).await.unwrap().unwrap();
        let second = timeout(TICK, done_rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, Pump::ProcessWriter);
        assert_eq!(second, Pump::ProcessReader);
        assert!(timeout(TICK, done_rx.recv()).await.unwrap().is_none());

        crate::process::terminate(child).await;
    }

    #[tokio::test]
    async fn process_exit_signals_termination_after_all_lines() {
        let args = vec!["-c".to_string(), "echo one; echo two".to_string()];
        let ProcessHandle {
            child,
            stdin,
            stdout,
        } = spawn_target("/bin/sh", &args, &plain_env()).unwrap();

        let (outbound_tx, mut outbound_rx) = mpsc::channel(1);
        let (_inbound_tx, inbound_rx) = mpsc::channel::<String>(1);
        let (done_tx, mut done_rx) = mpsc::channel(4);

        tokio::spawn(read_process(stdout, outbound_tx, done_tx.clone()));
        tokio::spawn(write_process(stdin, inbound_rx, done_tx.clone()));
        drop(done_tx);

        assert_eq!(
            timeout(TICK, outbound_rx.recv()).await.unwrap().unwrap(),
            "one"
        );
        assert_eq!(
            timeout(TICK, outbound_rx.recv()).await.unwrap().unwrap(),
            "two"
        );
        assert!(timeout(TICK, outbound_rx.recv()).await.unwrap().is_none());

        let first = timeout(TICK, done_rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, Pump::ProcessReader);

        crate::process::terminate(child).await;
    }

    #[tokio::test]
    async fn broken_pipe_on_stdin_signals_termination() {
        // Target closes stdin immediately, then idles.
        let args = vec!["-c".to_string(), "exec 0<&-; sleep 30".to_string()];
        let ProcessHandle {
            child,
            stdin,
            stdout: _stdout,
        } = spawn_target("/bin/sh", &args, &plain_env()).unwrap();

        let (inbound_tx, inbound_rx) = mpsc::channel(1);
        let (done_tx, mut done_rx) = mpsc::channel(4);
        tokio::spawn(write_process(stdin, inbound_rx, done_tx.clone()));
        drop(done_tx);

        // Writes eventually fail with EPIPE; the pump must report and exit.
        tokio::spawn(async move {
            while inbound_tx.send("ping".to_string()).await.is_ok() {}
        });
        let first = timeout(TICK, done_rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, Pump::ProcessWriter);

        crate::process::terminate(child).await;
    }
}
