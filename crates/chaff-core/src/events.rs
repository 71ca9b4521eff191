//! Events emitted by the scheduler

use chaff_api::{Protocol, Target};
use chaff_util::SessionId;

/// Events emitted by the decoy scheduler
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// Privileged session began; the fake-flag cycle restarts
    SessionActivated { session_id: SessionId },

    /// Privileged session ended; the pending cycle is forfeited
    SessionEnded {
        session_id: Option<SessionId>,
        waves_forfeited: usize,
    },

    /// One fake flag was broadcast to every target
    WaveEmitted {
        session_id: Option<SessionId>,
        /// Zero-based index into the fake-flag list
        flag_index: usize,
        targets: usize,
    },

    /// The real flag went to a single target
    RealFlagEmitted {
        session_id: Option<SessionId>,
        target: Target,
        port: Option<u16>,
        protocol: Protocol,
    },

    /// Configuration was swapped and state reset
    PolicyReloaded { targets: usize, fake_flags: usize },
}
