//! Capabilities the peer manager consumes from the rest of the node.
//!
//! The DHT, the transport host, the identify protocol, and the stream
//! engine are all owned elsewhere; the peer manager only sees these
//! seams. Event-producing capabilities hand out broadcast receivers:
//! dropping the receiver unsubscribes, so no capability ever holds a
//! reference back into the manager.

use crate::{
    error::{HostError, StreamError},
    types::{AddressTtl, Connectedness, PeerRecord},
};
use async_trait::async_trait;
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use std::sync::Arc;
use tokio::sync::broadcast;

/// The transport layer: address lookup, reachability checks, and
/// opening secured connections.
#[async_trait]
pub trait NetworkHost: Send + Sync {
    /// This node's own identity and listen addresses.
    fn own_peer(&self) -> PeerRecord;

    /// The peer's identity with every address currently known for it.
    /// The address list is empty for peers the host has never heard of.
    fn peer_record(&self, peer_id: &PeerId) -> PeerRecord;

    /// Whether the host believes it can reach the peer.
    fn connectedness(&self, record: &PeerRecord) -> Connectedness;

    /// Open a secured connection to the peer.
    ///
    /// Resolves to `Ok(Some(peer_id))` once the remote identity is
    /// confirmed, or `Ok(None)` when the transport connected but the
    /// identify exchange is still outstanding.
    async fn connect(&self, record: &PeerRecord) -> Result<Option<PeerId>, HostError>;
}

/// Storage for peer addresses with per-entry lifetimes.
pub trait AddressBook: Send + Sync {
    /// Insert or refresh addresses for a peer.
    fn upsert_addresses(&self, peer_id: &PeerId, addresses: &[Multiaddr], ttl: AddressTtl);

    /// All addresses currently stored for a peer.
    fn addresses_of(&self, peer_id: &PeerId) -> Vec<Multiaddr>;
}

/// The DHT-based discovery layer.
pub trait Discovery: Send + Sync {
    /// Add a peer to the routing table. Permanent entries survive
    /// routing table maintenance (used for bootstrap peers).
    fn add_peer(&self, record: PeerRecord, permanent: bool);

    /// Start processing incoming DHT messages and random walks.
    fn start(&self);

    /// Subscribe to peers newly observed by the DHT.
    fn subscribe(&self) -> broadcast::Receiver<PeerId>;
}

/// The identify sub-protocol: remote peers announce their identity
/// after connection setup.
pub trait IdentifyService: Send + Sync {
    /// Start answering and issuing identify requests.
    fn start(&self);

    /// Subscribe to identities received from remote peers.
    fn subscribe(&self) -> broadcast::Receiver<PeerId>;
}

/// Tracks the protocol streams multiplexed over each peer connection.
pub trait StreamEngine: Send + Sync {
    /// Whether a stream for the protocol is currently open to the peer.
    fn is_alive(&self, peer_id: &PeerId, protocol: &StreamProtocol) -> bool;

    /// Reserve a stream slot for the protocol on the peer's connection.
    /// Idempotent.
    fn add_slot(&self, peer_id: &PeerId, protocol: StreamProtocol);

    /// Drop every stream to the peer.
    fn del(&self, peer_id: &PeerId);
}

/// One application-level notification protocol (block announces,
/// gossip, transaction propagation).
#[async_trait]
pub trait NotificationProtocol: Send + Sync {
    /// The protocol's on-wire name.
    fn protocol(&self) -> StreamProtocol;

    /// Negotiate a new outbound stream for this protocol.
    async fn open_outgoing(&self, record: &PeerRecord) -> Result<(), StreamError>;
}

/// The set of notification protocols this node multiplexes.
pub trait ProtocolSet: Send + Sync {
    /// The block-announce protocol. Its stream liveness defines peer
    /// liveness for the peer manager.
    fn block_announce(&self) -> Arc<dyn NotificationProtocol>;

    /// The general gossip protocol.
    fn gossip(&self) -> Arc<dyn NotificationProtocol>;

    /// The transaction propagation protocol.
    fn propagate_transactions(&self) -> Arc<dyn NotificationProtocol>;

    /// The status update protocol.
    fn sup(&self) -> Arc<dyn NotificationProtocol>;
}

/// Registry of per-peer sync clients that must be told when a peer
/// disconnects.
pub trait SyncClientSet: Send + Sync {
    /// Drop the sync client for the peer, if any.
    fn remove(&self, peer_id: &PeerId);
}
