//! Active peer set maintenance for a Cobalt Network full node.
//!
//! The peer manager keeps the node connected to a bounded, healthy set
//! of remote peers. Candidates surface through DHT discovery, get
//! dialed one per maintenance pass, and become active once the remote
//! peer is identified and a block-announce stream is open. Excess and
//! stale peers are evicted on the same periodic pass.
//!
//! The manager runs as a single task owning all peer state; other
//! components interact with it through [PeerManagerHandle].

mod book;
pub mod error;
mod handle;
mod manager;
mod metrics;
pub mod traits;
pub mod types;

pub use book::{ActivePeerData, PeerBook};
pub use error::{HostError, PeerManagerError, PeersResult, StreamError};
pub use handle::PeerManagerHandle;
pub use manager::{NetworkServices, PeerManager};
pub use metrics::PeerManagerMetrics;

#[cfg(test)]
mod tests;
