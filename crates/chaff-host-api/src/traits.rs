//! Host adapter traits

use async_trait::async_trait;
use chaff_api::Emission;
use std::time::Duration;
use thiserror::Error;

/// Errors from an emitter
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("Send timed out after {0:?}")]
    Timeout(Duration),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Send failed: {0}")]
    Failed(String),

    #[error("Unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EmitError {
    /// Short, stable label for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            EmitError::Timeout(_) => "timeout",
            EmitError::SpawnFailed(_) => "spawn_failed",
            EmitError::Failed(_) => "send_failed",
            EmitError::UnsupportedProtocol(_) => "unsupported_protocol",
            EmitError::Io(_) => "io",
        }
    }
}

pub type EmitResult<T> = Result<T, EmitError>;

/// Errors from a session probe
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Probe command failed: {0}")]
    CommandFailed(String),

    #[error("Unreadable probe output: {0}")]
    BadOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Timeout(_) => "timeout",
            ProbeError::CommandFailed(_) => "command_failed",
            ProbeError::BadOutput(_) => "bad_output",
            ProbeError::Io(_) => "io",
        }
    }
}

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Puts one emission on the wire
#[async_trait]
pub trait Emitter: Send + Sync {
    /// Send a single emission, giving up after `timeout`
    async fn send(&self, emission: &Emission, timeout: Duration) -> EmitResult<()>;

    /// Name for logs
    fn name(&self) -> &'static str;
}

/// Answers "is a privileged session currently active?"
#[async_trait]
pub trait SessionProbe: Send + Sync {
    async fn is_privileged_session_active(&self, timeout: Duration) -> ProbeResult<bool>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(EmitError::Timeout(Duration::from_secs(1)).kind(), "timeout");
        assert_eq!(EmitError::Failed("x".into()).kind(), "send_failed");
        assert_eq!(ProbeError::BadOutput("x".into()).kind(), "bad_output");
    }
}
