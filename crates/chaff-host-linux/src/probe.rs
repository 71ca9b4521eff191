//! Privileged-session probes

use async_trait::async_trait;
use chaff_config::ProbeSpec;
use chaff_host_api::{ProbeError, ProbeResult, SessionProbe};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::process::{run_command, ProcessError};

/// Build the probe a validated policy asks for
pub fn probe_from_spec(spec: &ProbeSpec) -> Arc<dyn SessionProbe> {
    match spec {
        ProbeSpec::Who { users } => Arc::new(WhoProbe::new(users.clone())),
        ProbeSpec::Command { argv } => Arc::new(CommandProbe::new(argv.clone())),
        ProbeSpec::Always => Arc::new(StaticProbe::new(true)),
        ProbeSpec::Never => Arc::new(StaticProbe::new(false)),
    }
}

fn probe_error(e: ProcessError) -> ProbeError {
    match e {
        ProcessError::Timeout { timeout, .. } => ProbeError::Timeout(timeout),
        ProcessError::Wait(io) => ProbeError::Io(io),
        other => ProbeError::CommandFailed(other.to_string()),
    }
}

/// Reports active when any listed user appears in `who` output
pub struct WhoProbe {
    users: Vec<String>,
}

impl WhoProbe {
    pub fn new(users: Vec<String>) -> Self {
        Self { users }
    }
}

/// True if the first column of any line names one of `users`
pub fn who_lists_any(output: &str, users: &[String]) -> bool {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|user| users.iter().any(|u| u == user))
}

#[async_trait]
impl SessionProbe for WhoProbe {
    async fn is_privileged_session_active(&self, timeout: Duration) -> ProbeResult<bool> {
        let output = run_command(&["who".to_string()], None, timeout)
            .await
            .map_err(probe_error)?;

        if !output.success() {
            return Err(ProbeError::CommandFailed(output.failure_summary()));
        }

        let active = who_lists_any(&output.stdout, &self.users);
        trace!(active, "who probe sampled");
        Ok(active)
    }

    fn describe(&self) -> String {
        ProbeSpec::Who {
            users: self.users.clone(),
        }
        .to_string()
    }
}

/// Runs a command; exit status 0 means active
pub struct CommandProbe {
    argv: Vec<String>,
}

impl CommandProbe {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl SessionProbe for CommandProbe {
    async fn is_privileged_session_active(&self, timeout: Duration) -> ProbeResult<bool> {
        let output = run_command(&self.argv, None, timeout)
            .await
            .map_err(probe_error)?;

        match output.code() {
            Some(code) => Ok(code == 0),
            // Killed by a signal: no answer
            None => Err(ProbeError::CommandFailed(output.failure_summary())),
        }
    }

    fn describe(&self) -> String {
        ProbeSpec::Command {
            argv: self.argv.clone(),
        }
        .to_string()
    }
}

/// Fixed answer, for lab testing
pub struct StaticProbe {
    active: bool,
}

impl StaticProbe {
    pub fn new(active: bool) -> Self {
        Self { active }
    }
}

#[async_trait]
impl SessionProbe for StaticProbe {
    async fn is_privileged_session_active(&self, _timeout: Duration) -> ProbeResult<bool> {
        Ok(self.active)
    }

    fn describe(&self) -> String {
        if self.active {
            ProbeSpec::Always
        } else {
            ProbeSpec::Never
        }
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHO_OUTPUT: &str = "\
alice    pts/0        2024-03-01 10:02 (10.0.0.4)
root     tty1         2024-03-01 09:58
bob      pts/1        2024-03-01 10:15 (10.0.0.7)
";

    fn users(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn who_matches_first_column_only() {
        assert!(who_lists_any(WHO_OUTPUT, &users(&["root"])));
        assert!(who_lists_any(WHO_OUTPUT, &users(&["admin", "bob"])));
        assert!(!who_lists_any(WHO_OUTPUT, &users(&["pts/0"])));
        assert!(!who_lists_any(WHO_OUTPUT, &users(&["roo"])));
        assert!(!who_lists_any("", &users(&["root"])));
    }

    #[tokio::test]
    async fn command_probe_maps_exit_status() {
        let yes = CommandProbe::new(users(&["true"]));
        assert!(yes.is_privileged_session_active(Duration::from_secs(5)).await.unwrap());

        let no = CommandProbe::new(users(&["false"]));
        assert!(!no.is_privileged_session_active(Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn command_probe_timeout() {
        let slow = CommandProbe::new(users(&["sleep", "30"]));
        let result = slow
            .is_privileged_session_active(Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(ProbeError::Timeout(_))));
    }

    #[tokio::test]
    async fn command_probe_missing_program() {
        let missing = CommandProbe::new(users(&["/nonexistent/admin-check"]));
        let result = missing
            .is_privileged_session_active(Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(ProbeError::CommandFailed(_))));
    }

    #[tokio::test]
    async fn static_probe() {
        assert!(StaticProbe::new(true)
            .is_privileged_session_active(Duration::from_secs(1))
            .await
            .unwrap());
        assert_eq!(StaticProbe::new(false).describe(), "never");
    }

    #[test]
    fn probes_describe_their_spec() {
        let specs = [
            ProbeSpec::Who {
                users: users(&["root", "admin"]),
            },
            ProbeSpec::Command {
                argv: users(&["/usr/local/bin/admin-check", "--quiet"]),
            },
            ProbeSpec::Always,
            ProbeSpec::Never,
        ];

        for spec in specs {
            assert_eq!(probe_from_spec(&spec).describe(), spec.to_string());
        }
    }
}
