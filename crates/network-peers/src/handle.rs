//! Handle other node components use to reach the peer manager.

use crate::{error::PeersResult, types::PeerRecord};
use cn_types::{BlockInfo, ChainStatus};
use libp2p::PeerId;
use tokio::sync::{mpsc, oneshot};

/// Requests processed by the peer manager task.
pub(crate) enum PeerCommand {
    /// Report the number of active peers.
    ActivePeersCount { reply: oneshot::Sender<usize> },
    /// Run a visitor over every active peer id.
    ForEachPeer { visitor: Box<dyn FnMut(&PeerId) + Send> },
    /// Run a visitor for one peer, only if it is active.
    ForOnePeer { peer_id: PeerId, visitor: Box<dyn FnOnce(&PeerId) + Send> },
    /// Record a sign of life from a peer.
    KeepAlive { peer_id: PeerId },
    /// Record the chain state a peer announced.
    UpdateStatus { peer_id: PeerId, status: ChainStatus },
    /// Update only the best block of a peer's announced state.
    UpdateBestBlock { peer_id: PeerId, best_block: BlockInfo },
    /// Report the chain state a peer last announced.
    GetStatus { peer_id: PeerId, reply: oneshot::Sender<Option<ChainStatus>> },
    /// Store the record's addresses and dial the peer.
    Dial { record: PeerRecord },
    /// Reserve stream slots for the auxiliary protocols on a peer.
    ReserveStreams { peer_id: PeerId },
    /// Stop the peer manager task.
    Shutdown,
}

/// Cloneable handle to the peer manager task.
///
/// Every method resolves without touching the network; the manager
/// answers from its in-memory state.
#[derive(Clone)]
pub struct PeerManagerHandle {
    sender: mpsc::Sender<PeerCommand>,
}

impl PeerManagerHandle {
    pub(crate) fn new(sender: mpsc::Sender<PeerCommand>) -> Self {
        Self { sender }
    }

    /// The number of active peers.
    pub async fn active_peers_count(&self) -> PeersResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(PeerCommand::ActivePeersCount { reply }).await?;
        Ok(rx.await?)
    }

    /// Invoke the visitor once per active peer.
    pub async fn for_each_peer<F>(&self, visitor: F) -> PeersResult<()>
    where
        F: FnMut(&PeerId) + Send + 'static,
    {
        self.sender.send(PeerCommand::ForEachPeer { visitor: Box::new(visitor) }).await?;
        Ok(())
    }

    /// Invoke the visitor for the peer. Nothing happens when the peer
    /// is not active.
    pub async fn for_one_peer<F>(&self, peer_id: PeerId, visitor: F) -> PeersResult<()>
    where
        F: FnOnce(&PeerId) + Send + 'static,
    {
        self.sender.send(PeerCommand::ForOnePeer { peer_id, visitor: Box::new(visitor) }).await?;
        Ok(())
    }

    /// Record a sign of life from an active peer, deferring its
    /// eviction.
    pub async fn keep_alive(&self, peer_id: PeerId) -> PeersResult<()> {
        self.sender.send(PeerCommand::KeepAlive { peer_id }).await?;
        Ok(())
    }

    /// Record the chain state a peer announced.
    ///
    /// A status from a peer that is not active yet admits the peer to
    /// the active set: status announcements can overtake the identify
    /// exchange and are not thrown away.
    pub async fn update_status(&self, peer_id: PeerId, status: ChainStatus) -> PeersResult<()> {
        self.sender.send(PeerCommand::UpdateStatus { peer_id, status }).await?;
        Ok(())
    }

    /// Update only the best block of an active peer's announced state.
    pub async fn update_best_block(
        &self,
        peer_id: PeerId,
        best_block: BlockInfo,
    ) -> PeersResult<()> {
        self.sender.send(PeerCommand::UpdateBestBlock { peer_id, best_block }).await?;
        Ok(())
    }

    /// The chain state the peer last announced, if it is active.
    pub async fn get_status(&self, peer_id: PeerId) -> PeersResult<Option<ChainStatus>> {
        let (reply, rx) = oneshot::channel();
        self.sender.send(PeerCommand::GetStatus { peer_id, reply }).await?;
        Ok(rx.await?)
    }

    /// Store the record's addresses and dial the peer.
    pub async fn dial(&self, record: PeerRecord) -> PeersResult<()> {
        self.sender.send(PeerCommand::Dial { record }).await?;
        Ok(())
    }

    /// Reserve stream slots for the auxiliary protocols on a peer's
    /// connection.
    pub async fn reserve_streams(&self, peer_id: PeerId) -> PeersResult<()> {
        self.sender.send(PeerCommand::ReserveStreams { peer_id }).await?;
        Ok(())
    }

    /// Ask the peer manager task to stop.
    pub async fn shutdown(&self) -> PeersResult<()> {
        self.sender.send(PeerCommand::Shutdown).await?;
        Ok(())
    }
}
