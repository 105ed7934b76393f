//! Types for managing peers.

use cn_config::BootstrapNode;
use libp2p::{Multiaddr, PeerId};

/// A peer's identity together with its known network addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// The peer's identity.
    pub id: PeerId,
    /// Addresses the peer is reachable on, in preference order.
    pub addresses: Vec<Multiaddr>,
}

impl PeerRecord {
    /// Create a new instance of Self.
    pub fn new(id: PeerId, addresses: Vec<Multiaddr>) -> Self {
        Self { id, addresses }
    }
}

impl From<BootstrapNode> for PeerRecord {
    fn from(node: BootstrapNode) -> Self {
        Self { id: node.peer_id, addresses: node.addresses }
    }
}

/// The transport host's judgement on whether a peer is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectedness {
    /// A connection to the peer is already open.
    Connected,
    /// No connection yet, but the peer has dialable addresses.
    CanConnect,
    /// The peer cannot be dialed (no routable addresses).
    CannotConnect,
}

/// How long the address book keeps addresses it learns about a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressTtl {
    /// Kept for the lifetime of the process (bootstrap peers).
    Permanent,
    /// Kept for an extended window after a successful connection.
    RecentlyConnected,
    /// Short-lived entries used while dialing a candidate.
    Transient,
}
