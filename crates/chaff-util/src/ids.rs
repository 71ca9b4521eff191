//! Strongly-typed identifiers for chaffd

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier for one privileged-session observation window
///
/// A new one is minted every time the scheduler sees an Idle -> Active
/// transition, so log lines from the same session can be grouped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequence number of a scheduler tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TickId(u64);

impl TickId {
    pub fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for TickId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_uniqueness() {
        let s1 = SessionId::new();
        let s2 = SessionId::new();
        assert_ne!(s1, s2);
    }

    #[test]
    fn tick_id_advances() {
        let tick = TickId::default();
        assert_eq!(tick.get(), 0);
        assert_eq!(tick.next().get(), 1);
        assert_eq!(TickId::new(u64::MAX).next().get(), 0);
    }

    #[test]
    fn ids_serialize_deserialize() {
        let session_id = SessionId::new();
        let json = serde_json::to_string(&session_id).unwrap();
        let parsed: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(session_id, parsed);

        let tick = TickId::new(42);
        let json = serde_json::to_string(&tick).unwrap();
        assert_eq!(json, "42");
    }
}
