//! Host adapter trait interfaces for chaffd
//!
//! This crate defines the boundary between the scheduling core and the
//! outside world: something that can put a payload on the wire, and
//! something that can tell whether a privileged session is active.
//! It contains no platform code itself.

mod mock;
mod traits;

pub use mock::*;
pub use traits::*;
