//! IPv4 target range parsing

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Upper bound on addresses enumerated from one range
pub const MAX_RANGE_SIZE: u64 = 65_536;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("range is empty")]
    Empty,

    #[error("invalid address '{0}'")]
    BadAddress(String),

    #[error("invalid prefix length '{0}'")]
    BadPrefix(String),

    #[error("invalid octet bound '{0}'")]
    BadOctet(String),

    #[error("range start {start} is after end {end}")]
    Inverted { start: Ipv4Addr, end: Ipv4Addr },

    #[error("range covers {size} addresses (max {max})")]
    TooLarge { size: u64, max: u64 },
}

/// Inclusive span of IPv4 addresses
///
/// Accepted syntaxes:
/// - `172.16.200.0/24` (network and broadcast excluded below /31)
/// - `172.16.200.1-253` (last-octet range)
/// - `10.0.0.5-10.0.1.20` (full range)
/// - `172.16.200.7` (single address)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetRange {
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl TargetRange {
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self, RangeError> {
        if u32::from(start) > u32::from(end) {
            return Err(RangeError::Inverted { start, end });
        }

        let range = Self { start, end };
        let size = range.len();
        if size > MAX_RANGE_SIZE {
            return Err(RangeError::TooLarge {
                size,
                max: MAX_RANGE_SIZE,
            });
        }

        Ok(range)
    }

    pub fn single(addr: Ipv4Addr) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }

    pub fn start(&self) -> Ipv4Addr {
        self.start
    }

    pub fn end(&self) -> Ipv4Addr {
        self.end
    }

    /// Number of addresses in the span
    pub fn len(&self) -> u64 {
        u64::from(u32::from(self.end)) - u64::from(u32::from(self.start)) + 1
    }

    /// A constructed range always holds at least one address
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Addresses in ascending order
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        (u32::from(self.start)..=u32::from(self.end)).map(Ipv4Addr::from)
    }

    fn parse_cidr(addr: &str, prefix: &str) -> Result<Self, RangeError> {
        let base: Ipv4Addr = addr
            .trim()
            .parse()
            .map_err(|_| RangeError::BadAddress(addr.trim().to_string()))?;
        let prefix: u32 = prefix
            .trim()
            .parse()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| RangeError::BadPrefix(prefix.trim().to_string()))?;

        let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
        let network = u32::from(base) & mask;
        let broadcast = network | !mask;

        let (first, last) = if prefix >= 31 {
            (network, broadcast)
        } else {
            (network + 1, broadcast - 1)
        };

        Self::new(Ipv4Addr::from(first), Ipv4Addr::from(last))
    }

    fn parse_span(start: &str, end: &str) -> Result<Self, RangeError> {
        let start_addr: Ipv4Addr = start
            .trim()
            .parse()
            .map_err(|_| RangeError::BadAddress(start.trim().to_string()))?;
        let end = end.trim();

        // "a.b.c.x-y": the end is only a last octet
        let end_addr = if end.contains('.') {
            end.parse()
                .map_err(|_| RangeError::BadAddress(end.to_string()))?
        } else {
            let octet: u8 = end
                .parse()
                .map_err(|_| RangeError::BadOctet(end.to_string()))?;
            let [a, b, c, _] = start_addr.octets();
            Ipv4Addr::new(a, b, c, octet)
        };

        Self::new(start_addr, end_addr)
    }
}

impl FromStr for TargetRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(RangeError::Empty);
        }

        if let Some((addr, prefix)) = s.split_once('/') {
            Self::parse_cidr(addr, prefix)
        } else if let Some((start, end)) = s.split_once('-') {
            Self::parse_span(start, end)
        } else {
            let addr: Ipv4Addr = s.parse().map_err(|_| RangeError::BadAddress(s.to_string()))?;
            Self::new(addr, addr)
        }
    }
}

impl fmt::Display for TargetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}
