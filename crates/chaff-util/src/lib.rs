//! Shared utilities for chaffd
//!
//! This crate provides:
//! - ID types (SessionId, TickId)
//! - Time utilities (monotonic time, wall-clock time, duration formatting)
//! - Default paths for the configuration file

mod ids;
mod paths;
mod time;

pub use ids::*;
pub use paths::*;
pub use time::*;
