//! Core scheduling for chaffd
//!
//! This crate is the heart of chaffd, containing:
//! - Target set enumeration
//! - Fail-closed sampling of the privileged-session signal
//! - The decoy scheduler (Idle -> Active, fake-flag waves, real flag)
//! - Bounded-concurrency execution of emission plans
//! - The background noise generator

mod events;
mod monitor;
mod noise;
mod scheduler;
mod sink;
mod targets;

#[cfg(test)]
mod test_logs;

pub use events::*;
pub use monitor::*;
pub use noise::*;
pub use scheduler::*;
pub use sink::*;
pub use targets::*;
