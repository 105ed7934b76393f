//! Core value types shared across Cobalt Network node subsystems.
//!
//! These are the chain-level primitives other components exchange about
//! peers. The networking layer treats them as opaque payloads.

mod block;
pub use block::*;

mod status;
pub use status::*;
