//! In-memory indices of the peers this node knows about.
//!
//! A peer is tracked in at most one place at a time: the active set
//! (block-announce stream open), the connecting set (dial in flight),
//! or the candidate queue (discovered, awaiting a dial). The queue is
//! FIFO and mirrored by a hash set for O(1) membership checks; both
//! structures are kept in lockstep by every mutation.

use cn_types::{BlockInfo, ChainStatus};
use libp2p::PeerId;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::time::Instant;

/// Book-keeping for one active peer.
#[derive(Debug, Clone)]
pub struct ActivePeerData {
    /// Last moment the peer showed signs of life (identify, keepalive,
    /// status update).
    pub last_seen: Instant,
    /// The chain state the peer last announced, if any.
    pub status: Option<ChainStatus>,
}

/// The peer state store.
///
/// All operations are synchronous and non-blocking; the owning task
/// serializes access, so no internal locking is needed. The node's own
/// peer id is filtered out of every index.
pub struct PeerBook {
    /// This node's own identity; never tracked.
    local_peer: PeerId,
    /// Peers with an open block-announce stream.
    active: HashMap<PeerId, ActivePeerData>,
    /// Peers with a dial or stream-open attempt in flight.
    connecting: HashSet<PeerId>,
    /// Discovered peers awaiting a dial, oldest first.
    queue: VecDeque<PeerId>,
    /// Mirror of `queue` for O(1) membership checks.
    queue_set: HashSet<PeerId>,
}

impl PeerBook {
    /// Create an empty book for a node with the given identity.
    pub fn new(local_peer: PeerId) -> Self {
        Self {
            local_peer,
            active: HashMap::new(),
            connecting: HashSet::new(),
            queue: VecDeque::new(),
            queue_set: HashSet::new(),
        }
    }

    /// Append a discovered peer to the candidate queue.
    ///
    /// Returns false without touching the queue when the peer is this
    /// node itself or is already tracked anywhere in the book.
    pub fn enqueue(&mut self, peer_id: PeerId) -> bool {
        if peer_id == self.local_peer
            || self.active.contains_key(&peer_id)
            || self.connecting.contains(&peer_id)
            || !self.queue_set.insert(peer_id)
        {
            return false;
        }
        self.queue.push_back(peer_id);

        #[cfg(test)]
        self.check_invariant();

        true
    }

    /// Pop the oldest candidate and mark it as connecting.
    pub fn take_next_candidate(&mut self) -> Option<PeerId> {
        let peer_id = self.queue.pop_front()?;
        self.queue_set.remove(&peer_id);
        self.connecting.insert(peer_id);

        #[cfg(test)]
        self.check_invariant();

        Some(peer_id)
    }

    /// Mark a peer as connecting without going through the queue.
    ///
    /// Used for bootstrap peers. Returns false when the peer is this
    /// node, already active, or already connecting.
    pub fn insert_connecting(&mut self, peer_id: PeerId) -> bool {
        if peer_id == self.local_peer || self.active.contains_key(&peer_id) {
            return false;
        }
        self.remove_from_queue(&peer_id);
        let inserted = self.connecting.insert(peer_id);

        #[cfg(test)]
        self.check_invariant();

        inserted
    }

    /// Move a peer into the active set.
    ///
    /// Clears any connecting or queued entry for it. If the peer is
    /// already active only `last_seen` is refreshed; an announced
    /// status is never discarded by promotion.
    pub fn promote_to_active(&mut self, peer_id: PeerId, now: Instant) {
        if peer_id == self.local_peer {
            return;
        }
        self.connecting.remove(&peer_id);
        self.remove_from_queue(&peer_id);
        self.active
            .entry(peer_id)
            .and_modify(|data| data.last_seen = now)
            .or_insert(ActivePeerData { last_seen: now, status: None });

        #[cfg(test)]
        self.check_invariant();
    }

    /// Forget an in-flight attempt. The candidate is not re-enqueued.
    pub fn clear_connecting(&mut self, peer_id: &PeerId) {
        self.connecting.remove(peer_id);

        #[cfg(test)]
        self.check_invariant();
    }

    /// Refresh `last_seen` for an active peer. No-op otherwise.
    pub fn touch(&mut self, peer_id: &PeerId, now: Instant) {
        if let Some(data) = self.active.get_mut(peer_id) {
            data.last_seen = now;
        }
    }

    /// Record the chain state a peer announced.
    ///
    /// For an active peer this overwrites its status and refreshes
    /// `last_seen`. A status from a peer that is not active yet (the
    /// announcement can race the identify exchange) admits the peer
    /// directly: it is pulled out of the connecting set and the queue
    /// and inserted as active with the given status.
    pub fn update_status(&mut self, peer_id: PeerId, status: ChainStatus, now: Instant) {
        if peer_id == self.local_peer {
            return;
        }
        match self.active.get_mut(&peer_id) {
            Some(data) => {
                data.last_seen = now;
                data.status = Some(status);
            }
            None => {
                self.connecting.remove(&peer_id);
                self.remove_from_queue(&peer_id);
                self.active.insert(peer_id, ActivePeerData { last_seen: now, status: Some(status) });
            }
        }

        #[cfg(test)]
        self.check_invariant();
    }

    /// Update only the best-block part of an active peer's status.
    /// No-op for peers without an announced status or not active.
    pub fn update_best_block(&mut self, peer_id: &PeerId, best_block: BlockInfo, now: Instant) {
        if let Some(data) = self.active.get_mut(peer_id) {
            data.last_seen = now;
            if let Some(status) = data.status.as_mut() {
                status.best_block = best_block;
            }
        }
    }

    /// Drop a peer from the active set. Returns true if it was active.
    pub fn remove(&mut self, peer_id: &PeerId) -> bool {
        self.active.remove(peer_id).is_some()
    }

    /// The active peer that has been silent the longest. Ties are
    /// broken towards the lowest peer id so eviction is deterministic.
    pub fn oldest_active(&self) -> Option<(PeerId, Instant)> {
        self.active
            .iter()
            .min_by_key(|(peer_id, data)| (data.last_seen, **peer_id))
            .map(|(peer_id, data)| (*peer_id, data.last_seen))
    }

    /// The announced status of an active peer.
    pub fn status_of(&self, peer_id: &PeerId) -> Option<ChainStatus> {
        self.active.get(peer_id).and_then(|data| data.status.clone())
    }

    /// Number of active peers.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of in-flight connection attempts.
    pub fn connecting_count(&self) -> usize {
        self.connecting.len()
    }

    /// Number of queued candidates.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the peer is currently active.
    pub fn is_active(&self, peer_id: &PeerId) -> bool {
        self.active.contains_key(peer_id)
    }

    /// Whether a connection attempt to the peer is in flight.
    pub fn is_connecting(&self, peer_id: &PeerId) -> bool {
        self.connecting.contains(peer_id)
    }

    /// Whether the peer is waiting in the candidate queue.
    pub fn is_queued(&self, peer_id: &PeerId) -> bool {
        self.queue_set.contains(peer_id)
    }

    /// Iterate over the active peer ids.
    pub fn active_ids(&self) -> impl Iterator<Item = &PeerId> {
        self.active.keys()
    }

    fn remove_from_queue(&mut self, peer_id: &PeerId) {
        if self.queue_set.remove(peer_id) {
            let position = self
                .queue
                .iter()
                .position(|queued| queued == peer_id)
                .expect("queue and queue_set are kept in lockstep");
            self.queue.remove(position);
        }
    }

    #[cfg(test)]
    #[track_caller]
    fn check_invariant(&self) {
        assert_eq!(self.queue.len(), self.queue_set.len(), "queue and mirror set diverged");
        for peer_id in &self.queue {
            assert!(self.queue_set.contains(peer_id), "queued peer missing from mirror set");
        }
        for peer_id in &self.queue_set {
            assert!(
                !self.active.contains_key(peer_id) && !self.connecting.contains(peer_id),
                "queued peer tracked elsewhere"
            );
        }
        for peer_id in &self.connecting {
            assert!(!self.active.contains_key(peer_id), "connecting peer is also active");
        }
        assert!(
            !self.active.contains_key(&self.local_peer)
                && !self.connecting.contains(&self.local_peer)
                && !self.queue_set.contains(&self.local_peer),
            "own peer id crept into the book"
        );
    }
}
