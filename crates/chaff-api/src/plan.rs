//! Emission plans and their outcomes

use chaff_util::TickId;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Payload, PayloadKind, Protocol, Target};

/// One packet (or short exchange) to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emission {
    pub target: Target,
    pub protocol: Protocol,
    pub payload: Payload,
    /// None for protocols without ports (ICMP)
    pub port: Option<u16>,
}

impl Emission {
    pub fn new(target: Target, protocol: Protocol, payload: Payload, port: Option<u16>) -> Self {
        Self {
            target,
            protocol,
            payload,
            port,
        }
    }
}

impl fmt::Display for Emission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(
                f,
                "{} {}:{} ({})",
                self.protocol,
                self.target.address,
                port,
                self.payload.kind()
            ),
            None => write!(
                f,
                "{} {} ({})",
                self.protocol,
                self.target.address,
                self.payload.kind()
            ),
        }
    }
}

/// Emissions decided for a single tick
///
/// Produced fresh every tick and dropped once executed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmissionPlan {
    pub tick: TickId,
    pub emissions: Vec<Emission>,
}

impl EmissionPlan {
    pub fn empty(tick: TickId) -> Self {
        Self {
            tick,
            emissions: Vec::new(),
        }
    }

    pub fn new(tick: TickId, emissions: Vec<Emission>) -> Self {
        Self { tick, emissions }
    }

    pub fn is_empty(&self) -> bool {
        self.emissions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.emissions.len()
    }

    /// Count emissions carrying the given payload kind
    pub fn count_kind(&self, kind: PayloadKind) -> usize {
        self.emissions
            .iter()
            .filter(|e| e.payload.kind() == kind)
            .count()
    }
}

/// Result of one send attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Sent,
    Timeout,
    Error(String),
}

impl Outcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Outcome::Sent)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Sent => f.write_str("sent"),
            Outcome::Timeout => f.write_str("timeout"),
            Outcome::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Outcome attributed to the emission that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmissionReport {
    pub emission: Emission,
    pub outcome: Outcome,
}

/// Aggregate counts over a batch of reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeSummary {
    pub sent: usize,
    pub timeout: usize,
    pub error: usize,
}

impl OutcomeSummary {
    pub fn from_reports(reports: &[EmissionReport]) -> Self {
        let mut summary = Self::default();
        for report in reports {
            match report.outcome {
                Outcome::Sent => summary.sent += 1,
                Outcome::Timeout => summary.timeout += 1,
                Outcome::Error(_) => summary.error += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.sent + self.timeout + self.error
    }
}
