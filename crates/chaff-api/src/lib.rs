//! Domain types for chaffd
//!
//! This crate defines the vocabulary shared by the scheduler, the sink and
//! the host adapters:
//! - Targets and protocols
//! - Payloads (noise, fake flag, real flag)
//! - Emission plans produced per tick
//! - Per-emission outcomes

mod plan;
mod types;

pub use plan::*;
pub use types::*;
