//! Crate for configuring a node.
//!
//! Node-specific and network-wide configurations.

pub mod network;
pub use network::*;

mod error;
pub use error::*;
