//! Process management utilities

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("empty argv")]
    EmptyArgv,

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("wait failed: {0}")]
    Wait(#[from] std::io::Error),

    #[error("failed to signal process group {pgid}: {errno}")]
    Signal { pgid: u32, errno: nix::errno::Errno },
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub program: String,
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, None if killed by a signal
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }

    /// One-line description of a failed run, for error messages
    pub fn failure_summary(&self) -> String {
        let status = match (self.status.code(), self.status.signal()) {
            (Some(code), _) => format!("status {}", code),
            (None, Some(sig)) => format!("signal {}", sig),
            (None, None) => "unknown status".to_string(),
        };
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("{} exited with {}", self.program, status)
        } else {
            format!("{} exited with {}: {}", self.program, status, stderr)
        }
    }
}

/// Short-lived child process in its own process group
pub struct ManagedProcess {
    child: Child,
    program: String,
    pgid: Option<u32>,
}

impl ManagedProcess {
    /// Spawn `argv` as the leader of a new session and process group.
    ///
    /// The child is killed if this handle is dropped before it exits.
    pub fn spawn(argv: &[String], piped_stdin: bool) -> Result<Self, ProcessError> {
        let (program, args) = argv.split_first().ok_or(ProcessError::EmptyArgv)?;

        let mut cmd = Command::new(program);
        cmd.args(args);

        cmd.env_clear();
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
        // Stable output for parsers
        cmd.env("LC_ALL", "C");

        cmd.stdin(if piped_stdin {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        // SAFETY: setsid is async-signal-safe and touches no parent state
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        // After setsid, pid == pgid
        let pgid = child.id();
        trace!(pgid = ?pgid, program = %program, "Process spawned");

        Ok(Self {
            child,
            program: program.clone(),
            pgid,
        })
    }

    pub fn pgid(&self) -> Option<u32> {
        self.pgid
    }

    /// Feed `input` on stdin, then wait for exit and collect output.
    ///
    /// On timeout the process group is killed and `ProcessError::Timeout`
    /// is returned.
    pub async fn finish(
        mut self,
        input: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<CommandOutput, ProcessError> {
        let stdin = self.child.stdin.take();
        let program = self.program.clone();
        let pgid = self.pgid;
        let child = self.child;

        let io = async move {
            if let (Some(mut pipe), Some(data)) = (stdin, input) {
                // The peer may exit before reading everything
                if let Err(e) = pipe.write_all(data).await {
                    trace!(error = %e, "stdin write failed");
                }
                drop(pipe);
            }
            child.wait_with_output().await
        };

        match tokio::time::timeout(timeout, io).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                program,
                status: output.status,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) => Err(ProcessError::Wait(e)),
            Err(_) => {
                if let Some(pgid) = pgid
                    && let Err(e) = kill_process_group(pgid)
                {
                    debug!(pgid, error = %e, "Failed to kill timed-out process group");
                }
                Err(ProcessError::Timeout { program, timeout })
            }
        }
    }
}

/// Spawn, feed stdin and wait, bounded by `timeout`
pub async fn run_command(
    argv: &[String],
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<CommandOutput, ProcessError> {
    ManagedProcess::spawn(argv, input.is_some())?
        .finish(input, timeout)
        .await
}

fn kill_process_group(pgid: u32) -> Result<(), ProcessError> {
    // Negative pid addresses the group
    let target = Pid::from_raw(-(pgid as i32));

    match signal::kill(target, Signal::SIGKILL) {
        Ok(()) => {
            debug!(pgid, "Sent SIGKILL to process group");
            Ok(())
        }
        // Already gone
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(errno) => Err(ProcessError::Signal { pgid, errno }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn run_simple_process() {
        let out = run_command(&argv(&["true"]), None, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(out.success());
        assert_eq!(out.code(), Some(0));
    }

    #[tokio::test]
    async fn stdin_is_delivered() {
        let out = run_command(&argv(&["cat"]), Some(b"FLAG{x}\n"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout, "FLAG{x}\n");
    }

    #[tokio::test]
    async fn failure_summary_includes_stderr() {
        let out = run_command(
            &argv(&["sh", "-c", "echo boom >&2; exit 3"]),
            None,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(out.code(), Some(3));
        assert_eq!(out.failure_summary(), "sh exited with status 3: boom");
    }

    #[tokio::test]
    async fn timeout_kills_process() {
        let started = Instant::now();
        let result = run_command(&argv(&["sleep", "30"]), None, Duration::from_millis(100)).await;

        assert!(matches!(result, Err(ProcessError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn spawn_errors() {
        assert!(matches!(
            run_command(&[], None, Duration::from_secs(1)).await,
            Err(ProcessError::EmptyArgv)
        ));
        assert!(matches!(
            run_command(&argv(&["/nonexistent/chaff-test"]), None, Duration::from_secs(1)).await,
            Err(ProcessError::Spawn { .. })
        ));
    }
}
