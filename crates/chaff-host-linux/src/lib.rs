//! Linux host adapter for chaffd
//!
//! Provides:
//! - Short-lived subprocesses in their own process group, killed on timeout
//! - An emitter that drives `ping`, `nc` and `dig`
//! - A dry-run emitter that only logs
//! - Session probes backed by `who` or an arbitrary command

mod emitter;
mod probe;
mod process;

pub use emitter::*;
pub use probe::*;
pub use process::*;
