//! Shared types for the chaffd domain

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// An addressable endpoint in the lab network
///
/// Built once from configuration and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub address: IpAddr,
    /// If set, every emission to this target uses this port
    pub fixed_port: Option<u16>,
}

impl Target {
    pub fn new(address: IpAddr) -> Self {
        Self {
            address,
            fixed_port: None,
        }
    }

    pub fn with_port(address: IpAddr, port: u16) -> Self {
        Self {
            address,
            fixed_port: Some(port),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fixed_port {
            Some(port) => write!(f, "{}:{}", self.address, port),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Transport used for one emission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Icmp,
    Udp,
    Tcp,
    Dns,
    Http,
}

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::Icmp,
        Protocol::Udp,
        Protocol::Tcp,
        Protocol::Dns,
        Protocol::Http,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Icmp => "icmp",
            Protocol::Udp => "udp",
            Protocol::Tcp => "tcp",
            Protocol::Dns => "dns",
            Protocol::Http => "http",
        }
    }

    /// ICMP has no notion of a port
    pub fn uses_port(&self) -> bool {
        !matches!(self, Protocol::Icmp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown protocol: {0}")]
pub struct UnknownProtocol(pub String);

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "icmp" | "ping" => Ok(Protocol::Icmp),
            "udp" => Ok(Protocol::Udp),
            "tcp" => Ok(Protocol::Tcp),
            "dns" => Ok(Protocol::Dns),
            "http" => Ok(Protocol::Http),
            other => Err(UnknownProtocol(other.to_string())),
        }
    }
}

/// What an emission carries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum Payload {
    /// Filler traffic; the emitter picks the bytes
    Noise,
    FakeFlag(String),
    RealFlag(String),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Noise => PayloadKind::Noise,
            Payload::FakeFlag(_) => PayloadKind::FakeFlag,
            Payload::RealFlag(_) => PayloadKind::RealFlag,
        }
    }

    /// Flag text, if this payload carries one
    pub fn text(&self) -> Option<&str> {
        match self {
            Payload::Noise => None,
            Payload::FakeFlag(text) | Payload::RealFlag(text) => Some(text),
        }
    }

    pub fn is_real_flag(&self) -> bool {
        matches!(self, Payload::RealFlag(_))
    }
}

/// Payload discriminant, safe to log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Noise,
    FakeFlag,
    RealFlag,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PayloadKind::Noise => "noise",
            PayloadKind::FakeFlag => "fake_flag",
            PayloadKind::RealFlag => "real_flag",
        })
    }
}

/// Filler material an emitter draws from when sending `Payload::Noise`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseCorpus {
    /// Short strings for raw UDP/TCP noise
    pub words: Vec<String>,
    /// Names queried by DNS noise
    pub dns_domains: Vec<String>,
    /// Request lines for HTTP noise, e.g. "GET /admin HTTP/1.0"
    pub http_requests: Vec<String>,
    /// Zone under which DNS-carried flags are encoded
    pub dns_zone: String,
}

impl Default for NoiseCorpus {
    fn default() -> Self {
        Self {
            words: vec!["noise".into(), "data".into(), "test".into(), "random".into()],
            dns_domains: vec![
                "example.com".into(),
                "google.com".into(),
                "test.local".into(),
                "noise.net".into(),
            ],
            http_requests: vec![
                "GET / HTTP/1.0".into(),
                "GET /admin HTTP/1.0".into(),
                "GET /login HTTP/1.0".into(),
                "POST /api HTTP/1.0".into(),
            ],
            dns_zone: "lab.internal".into(),
        }
    }
}
