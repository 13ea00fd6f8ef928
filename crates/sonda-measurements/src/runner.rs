//! Subprocess driver for the external diagnostic tools.
//!
//! Every invocation carries a wall-clock cap. The child is spawned with
//! `kill_on_drop` so it cannot outlive its handler, and is killed
//! explicitly when the cap fires.

use sonda_common::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::debug;

/// Outcome of a completed (non-timed-out) tool run.
#[derive(Debug)]
pub struct ToolRun {
    pub success: bool,
    pub stderr: String,
}

/// A single external tool invocation.
#[derive(Debug)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    cap: Duration,
}

impl ToolCommand {
    pub fn new(program: &str, args: Vec<String>, cap: Duration) -> Self {
        Self {
            program: program.to_string(),
            args,
            cap,
        }
    }

    /// Wrap the invocation in `unbuffer` so interactive tools flush their
    /// stdout per line instead of per block when writing to a pipe.
    pub fn unbuffered(mut self) -> Self {
        let mut args = vec![std::mem::take(&mut self.program)];
        args.extend(std::mem::take(&mut self.args));
        self.program = "unbuffer".to_string();
        self.args = args;
        self
    }

    /// Spawn the tool and feed every stdout chunk to `on_chunk` as it
    /// arrives. Returns once the process exits; errors on spawn failure or
    /// when the wall-clock cap fires (the child is killed first).
    pub async fn stream<F>(self, mut on_chunk: F) -> Result<ToolRun>
    where
        F: FnMut(&str),
    {
        debug!(program = %self.program, args = ?self.args, "spawning tool");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::ToolProcess(format!("failed to start {}: {}", self.program, e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::ToolProcess("child stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::ToolProcess("child stderr not captured".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let deadline = tokio::time::Instant::now() + self.cap;
        let mut buf = [0u8; 4096];

        loop {
            let read = tokio::select! {
                read = stdout.read(&mut buf) => read?,
                _ = tokio::time::sleep_until(deadline) => {
                    return self.kill(&mut child).await;
                }
            };
            if read == 0 {
                break;
            }
            on_chunk(&String::from_utf8_lossy(&buf[..read]));
        }

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = tokio::time::sleep_until(deadline) => {
                return self.kill(&mut child).await;
            }
        };

        let stderr = stderr_task.await.unwrap_or_default();
        Ok(ToolRun {
            success: status.success(),
            stderr,
        })
    }

    async fn kill(&self, child: &mut tokio::process::Child) -> Result<ToolRun> {
        debug!(program = %self.program, "tool hit wall-clock cap, killing");
        let _ = child.start_kill();
        let _ = child.wait().await;
        Err(Error::ToolProcess(format!(
            "{} timed out after {:?}",
            self.program, self.cap
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_streams_stdout_chunks() {
        let cmd = ToolCommand::new(
            "sh",
            vec!["-c".to_string(), "printf 'a\\nb\\n'".to_string()],
            Duration::from_secs(5),
        );
        let mut collected = String::new();
        let run = cmd.stream(|chunk| collected.push_str(chunk)).await.unwrap();
        assert!(run.success);
        assert_eq!(collected, "a\nb\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_reported() {
        let cmd = ToolCommand::new(
            "sh",
            vec!["-c".to_string(), "echo oops >&2; exit 3".to_string()],
            Duration::from_secs(5),
        );
        let run = cmd.stream(|_| {}).await.unwrap();
        assert!(!run.success);
        assert_eq!(run.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_cap_kills_the_child() {
        let cmd = ToolCommand::new(
            "sh",
            vec!["-c".to_string(), "sleep 30".to_string()],
            Duration::from_millis(100),
        );
        let err = cmd.stream(|_| {}).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let cmd = ToolCommand::new(
            "definitely-not-a-real-tool",
            vec![],
            Duration::from_secs(1),
        );
        let err = cmd.stream(|_| {}).await.unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }

    #[test]
    fn test_unbuffered_wraps_program() {
        let cmd = ToolCommand::new("ping", vec!["-c".to_string()], Duration::from_secs(1))
            .unbuffered();
        assert_eq!(cmd.program, "unbuffer");
        assert_eq!(cmd.args[0], "ping");
        assert_eq!(cmd.args[1], "-c");
    }
}
