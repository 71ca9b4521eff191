//! Emitters that shell out to ping, nc and dig

use async_trait::async_trait;
use chaff_api::{Emission, NoiseCorpus, Payload, Protocol};
use chaff_host_api::{EmitError, EmitResult, Emitter};
use rand::seq::SliceRandom;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};

use crate::process::{run_command, ProcessError};

/// Longest pad pattern `ping -p` accepts
const PING_PATTERN_BYTES: usize = 16;

/// DNS label length limit
const MAX_LABEL_LEN: usize = 63;

/// A concrete command line plus what to feed on stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub stdin: Option<Vec<u8>>,
}

impl Invocation {
    fn new(argv: Vec<String>) -> Self {
        Self { argv, stdin: None }
    }

    fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

/// Sends emissions by running `ping`, `nc` and `dig`
pub struct SubprocessEmitter {
    corpus: NoiseCorpus,
}

impl SubprocessEmitter {
    pub fn new(corpus: NoiseCorpus) -> Self {
        Self { corpus }
    }

    /// Build the command line for one emission
    pub fn invocation(&self, emission: &Emission, timeout: Duration) -> EmitResult<Invocation> {
        let addr = emission.target.address.to_string();
        let wait = timeout.as_secs().max(1).to_string();

        let invocation = match emission.protocol {
            Protocol::Icmp => {
                let mut argv = vec!["ping".into(), "-c".into(), "1".into(), "-W".into(), wait];
                if let Some(text) = emission.payload.text() {
                    argv.push("-p".into());
                    argv.push(ping_pattern(text));
                }
                if emission.target.address.is_ipv6() {
                    argv.push("-6".into());
                }
                argv.push(addr);
                Invocation::new(argv)
            }
            Protocol::Udp => {
                let port = require_port(emission)?;
                Invocation::new(vec![
                    "nc".into(),
                    "-u".into(),
                    "-w".into(),
                    wait,
                    addr,
                    port.to_string(),
                ])
                .with_stdin(self.line_payload(&emission.payload))
            }
            Protocol::Tcp => {
                let port = require_port(emission)?;
                Invocation::new(vec!["nc".into(), "-w".into(), wait, addr, port.to_string()])
                    .with_stdin(self.line_payload(&emission.payload))
            }
            Protocol::Dns => {
                let port = require_port(emission)?;
                Invocation::new(vec![
                    "dig".into(),
                    format!("@{}", addr),
                    "-p".into(),
                    port.to_string(),
                    self.dns_name(&emission.payload),
                    "+short".into(),
                    format!("+timeout={}", wait),
                    "+tries=1".into(),
                ])
            }
            Protocol::Http => {
                let port = require_port(emission)?;
                Invocation::new(vec!["nc".into(), "-w".into(), wait, addr, port.to_string()])
                    .with_stdin(self.http_request(&emission.target.address, &emission.payload))
            }
        };

        Ok(invocation)
    }

    fn line_payload(&self, payload: &Payload) -> String {
        match payload.text() {
            Some(text) => format!("{}\n", text),
            None => format!("{}\n", pick(&self.corpus.words, "noise")),
        }
    }

    fn dns_name(&self, payload: &Payload) -> String {
        match payload.text() {
            Some(text) => flag_qname(text, &self.corpus.dns_zone),
            None => pick(&self.corpus.dns_domains, "example.com").to_string(),
        }
    }

    fn http_request(&self, address: &IpAddr, payload: &Payload) -> String {
        match payload.text() {
            Some(text) => format!(
                "GET / HTTP/1.0\r\nHost: {}\r\nCookie: session={}\r\n\r\n",
                address, text
            ),
            None => format!("{}\r\n\r\n", pick(&self.corpus.http_requests, "GET / HTTP/1.0")),
        }
    }
}

#[async_trait]
impl Emitter for SubprocessEmitter {
    async fn send(&self, emission: &Emission, timeout: Duration) -> EmitResult<()> {
        let invocation = self.invocation(emission, timeout)?;

        let output = run_command(&invocation.argv, invocation.stdin.as_deref(), timeout)
            .await
            .map_err(|e| match e {
                ProcessError::Timeout { timeout, .. } => EmitError::Timeout(timeout),
                ProcessError::Spawn { .. } | ProcessError::EmptyArgv => {
                    EmitError::SpawnFailed(e.to_string())
                }
                ProcessError::Wait(io) => EmitError::Io(io),
                ProcessError::Signal { .. } => EmitError::Failed(e.to_string()),
            })?;

        if output.success() {
            debug!(emission = %emission, program = invocation.program(), "Emission sent");
            return Ok(());
        }

        // ping exits 1 when no reply arrived
        if emission.protocol == Protocol::Icmp && output.code() == Some(1) {
            return Err(EmitError::Timeout(timeout));
        }

        Err(EmitError::Failed(output.failure_summary()))
    }

    fn name(&self) -> &'static str {
        "subprocess"
    }
}

/// Logs emissions instead of sending them
#[derive(Debug, Default)]
pub struct LoggingEmitter;

#[async_trait]
impl Emitter for LoggingEmitter {
    async fn send(&self, emission: &Emission, _timeout: Duration) -> EmitResult<()> {
        info!(
            target = %emission.target.address,
            port = ?emission.port,
            protocol = %emission.protocol,
            payload = %emission.payload.kind(),
            "Dry run: would send"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

fn require_port(emission: &Emission) -> EmitResult<u16> {
    emission.port.ok_or_else(|| {
        EmitError::Failed(format!("{} emission to {} has no port", emission.protocol, emission.target))
    })
}

fn pick<'a>(items: &'a [String], fallback: &'a str) -> &'a str {
    items
        .choose(&mut rand::thread_rng())
        .map(String::as_str)
        .unwrap_or(fallback)
}

/// Hex pad pattern for `ping -p`
fn ping_pattern(text: &str) -> String {
    text.bytes()
        .take(PING_PATTERN_BYTES)
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Hex-encode `text` into DNS labels under `zone`
fn flag_qname(text: &str, zone: &str) -> String {
    let hex: String = text.bytes().map(|b| format!("{:02x}", b)).collect();
    let mut labels: Vec<&str> = hex
        .as_bytes()
        .chunks(MAX_LABEL_LEN)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    let zone = zone.trim_matches('.');
    if !zone.is_empty() {
        labels.push(zone);
    }
    labels.join(".")
}
