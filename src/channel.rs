//! Framed JSON-per-line duplex channel to a child process (§4.1).
//!
//! A plain OS pipe has no read-with-timeout primitive, so the channel owns a background
//! thread that blocks on `stdout` and forwards completed lines over an `mpsc` channel;
//! `recv(deadline)` is then `recv_timeout`. This keeps the match engine itself
//! single-threaded and synchronous — the reader thread is plumbing, not a scheduler.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::ChannelError;

enum ReaderEvent {
    Line(String),
    Eof,
}

/// Line-delimited JSON channel over a child process's stdio.
pub struct LineChannel {
    child: Child,
    stdin: Option<ChildStdin>,
    rx: Receiver<ReaderEvent>,
    /// Set by `send`, cleared by `recv`; enforces strict request/response ordering
    /// (testable property 2: no second `send` before the pending reply is consumed).
    awaiting_reply: bool,
    /// Set when a `recv` missed its deadline; the reply it was waiting for is still in
    /// flight and must be discarded, not handed to the next exchange, to preserve
    /// strict request/response alignment under cancellation (§4.1).
    stale_reply_pending: bool,
}

impl LineChannel {
    /// Spawn `command` with `args`, wiring stdin/stdout as a line channel. Stderr is
    /// drained on a separate thread; lines are logged at `debug` only when
    /// `debug_agent_stderr` is set, but are always drained so the child never blocks
    /// writing to a full stderr pipe.
    pub fn spawn(
        command: &Path,
        args: &[String],
        debug_agent_stderr: bool,
    ) -> anyhow::Result<LineChannel> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("could not spawn '{}': {e}", command.display()))?;

        let stdin = child.stdin.take().expect("stdin was piped");
        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => {
                        let _ = tx.send(ReaderEvent::Eof);
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim_end_matches(['\n', '\r']).to_owned();
                        if tx.send(ReaderEvent::Line(trimmed)).is_err() {
                            break;
                        }
                    }
                    Err(_) => {
                        let _ = tx.send(ReaderEvent::Eof);
                        break;
                    }
                }
            }
        });

        std::thread::spawn(move || {
            let mut reader = BufReader::new(stderr);
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if debug_agent_stderr {
                            debug!(agent_stderr = %line.trim_end(), "agent stderr");
                        }
                    }
                }
            }
        });

        Ok(LineChannel {
            child,
            stdin: Some(stdin),
            rx,
            awaiting_reply: false,
            stale_reply_pending: false,
        })
    }

    /// Encode `value` as a single JSON line, write it and flush.
    pub fn send(&mut self, value: &impl Serialize) -> Result<(), ChannelError> {
        if self.awaiting_reply {
            return Err(ChannelError::OrderingViolation);
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ChannelError::Write("stdin already closed".to_owned()))?;
        let mut line =
            serde_json::to_string(value).map_err(|e| ChannelError::Write(e.to_string()))?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .map_err(|e| ChannelError::Write(e.to_string()))?;
        stdin
            .flush()
            .map_err(|e| ChannelError::Write(e.to_string()))?;
        self.awaiting_reply = true;
        trace!(%line, "sent to agent");
        Ok(())
    }

    /// Read exactly one line within `deadline` and parse it as JSON.
    ///
    /// If the previous `recv` timed out, its reply is still somewhere on the wire; this
    /// call first discards that one stale line (itself bounded by `deadline`) before
    /// treating anything it reads as belonging to the current exchange. Without this, a
    /// late reply would be handed back as the answer to the next, unrelated request.
    pub fn recv(&mut self, deadline: Duration) -> Result<Value, ChannelError> {
        let start = Instant::now();
        if self.stale_reply_pending {
            let budget = deadline.saturating_sub(start.elapsed());
            match self.rx.recv_timeout(budget) {
                Ok(ReaderEvent::Line(line)) => {
                    trace!(%line, "discarded stale reply");
                    self.stale_reply_pending = false;
                }
                Ok(ReaderEvent::Eof) => {
                    self.awaiting_reply = false;
                    return Err(ChannelError::Eof);
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.awaiting_reply = false;
                    return Err(ChannelError::ReadTimeout);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.awaiting_reply = false;
                    return Err(ChannelError::Eof);
                }
            }
        }

        let remaining = deadline.saturating_sub(start.elapsed());
        let event = self.rx.recv_timeout(remaining).map_err(|e| match e {
            RecvTimeoutError::Timeout => {
                self.stale_reply_pending = true;
                ChannelError::ReadTimeout
            }
            RecvTimeoutError::Disconnected => ChannelError::Eof,
        });
        self.awaiting_reply = false;
        match event? {
            ReaderEvent::Line(line) => {
                trace!(%line, "received from agent");
                serde_json::from_str(&line).map_err(ChannelError::Parse)
            }
            ReaderEvent::Eof => Err(ChannelError::Eof),
        }
    }

    /// Close stdin and drain any remaining stdout, best-effort, without blocking long.
    pub fn close(&mut self) {
        self.stdin = None;
        while let Ok(ReaderEvent::Line(_)) = self.rx.recv_timeout(Duration::from_millis(1)) {
            // drain
        }
    }
}

impl Drop for LineChannel {
    fn drop(&mut self) {
        self.close();
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                if let Err(e) = self.child.kill() {
                    warn!("failed to kill agent child process: {e}");
                }
                let _ = self.child.wait();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sh(script: &str) -> LineChannel {
        LineChannel::spawn(Path::new("/bin/sh"), &["-c".to_owned(), script.to_owned()], false)
            .unwrap()
    }

    #[test]
    fn round_trip_echoes_a_line() {
        let mut channel = sh("while read -r line; do echo \"$line\"; done");
        channel.send(&json!({"ping": "foobar"})).unwrap();
        let reply = channel.recv(Duration::from_secs(2)).unwrap();
        assert_eq!(reply, json!({"ping": "foobar"}));
    }

    #[test]
    fn recv_without_reply_times_out() {
        let mut channel = sh("sleep 5");
        channel.send(&json!({"ping": "x"})).unwrap();
        let err = channel.recv(Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, ChannelError::ReadTimeout));
    }

    #[test]
    fn closed_stdin_surfaces_as_eof() {
        let mut channel = sh("exit 0");
        std::thread::sleep(Duration::from_millis(100));
        let err = channel.recv(Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, ChannelError::Eof));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let mut channel = sh("while read -r line; do echo 'not json'; done");
        channel.send(&json!({"ping": "x"})).unwrap();
        let err = channel.recv(Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, ChannelError::Parse(_)));
    }

    #[test]
    fn send_before_consuming_reply_is_rejected() {
        let mut channel = sh("while read -r line; do echo \"$line\"; done");
        channel.send(&json!({"ping": "x"})).unwrap();
        let err = channel.send(&json!({"ping": "y"})).unwrap_err();
        assert!(matches!(err, ChannelError::OrderingViolation));
    }

    #[test]
    fn late_reply_after_timeout_is_not_delivered_to_the_next_recv() {
        let mut channel = sh(
            "read -r first; sleep 0.2; echo \"$first\"; read -r second; echo \"$second\"",
        );
        channel.send(&json!({"n": 1})).unwrap();
        let err = channel.recv(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, ChannelError::ReadTimeout));

        channel.send(&json!({"n": 2})).unwrap();
        let reply = channel.recv(Duration::from_secs(2)).unwrap();
        assert_eq!(reply, json!({"n": 2}), "stale reply for n=1 must not surface here");
    }

    #[test]
    fn drop_kills_a_still_running_child() {
        let channel = sh("sleep 30");
        let pid = channel.child.id();
        drop(channel);
        std::thread::sleep(Duration::from_millis(200));
        let status = std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .status()
            .unwrap();
        assert!(!status.success(), "child process {pid} should no longer exist");
    }
}
