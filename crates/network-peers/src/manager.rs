//! The peer manager task.
//!
//! One task owns the [PeerBook] and serializes every mutation: facade
//! commands, discovery and identify events, dial and stream-open
//! completions, and the periodic maintenance pass all funnel into the
//! same `select!` loop. Dials and stream negotiations run on spawned
//! tasks that report back over an internal channel; a completion
//! arriving after shutdown is dropped with the channel, so late
//! callbacks can never touch freed state.

use crate::{
    book::PeerBook,
    error::{HostError, PeerManagerError, PeersResult, StreamError},
    handle::{PeerCommand, PeerManagerHandle},
    metrics::{PeerManagerMetrics, EVICTION_DEAD, EVICTION_HARD_LIMIT, EVICTION_TTL},
    traits::{
        AddressBook, Discovery, IdentifyService, NetworkHost, ProtocolSet, StreamEngine,
        SyncClientSet,
    },
    types::{AddressTtl, Connectedness, PeerRecord},
};
use cn_config::{NetworkConfig, PeeringConfig};
use libp2p::{PeerId, StreamProtocol};
use std::sync::Arc;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{debug, error, info, warn};

/// Facade commands awaiting the manager.
const COMMAND_CHANNEL_CAPACITY: usize = 100;
/// Dial and stream-open completions awaiting the manager.
const COMPLETION_CHANNEL_CAPACITY: usize = 100;

/// Capabilities the peer manager consumes from the rest of the node.
pub struct NetworkServices {
    /// The transport layer.
    pub host: Arc<dyn NetworkHost>,
    /// Peer address storage.
    pub address_book: Arc<dyn AddressBook>,
    /// The DHT-based discovery layer.
    pub discovery: Arc<dyn Discovery>,
    /// The identify sub-protocol.
    pub identify: Arc<dyn IdentifyService>,
    /// Per-connection protocol stream tracking.
    pub stream_engine: Arc<dyn StreamEngine>,
    /// The notification protocols this node multiplexes.
    pub protocols: Arc<dyn ProtocolSet>,
    /// Sync clients to drop when a peer disconnects.
    pub sync_clients: Arc<dyn SyncClientSet>,
    /// Metrics sink.
    pub metrics: Arc<PeerManagerMetrics>,
}

/// Outcome of an I/O task spawned by the manager.
enum IoCompletion {
    /// A dial finished. `Ok(None)` means the transport connected but
    /// the remote identity is still unconfirmed.
    Dial { peer_id: PeerId, result: Result<Option<PeerId>, HostError> },
    /// A block-announce stream negotiation finished.
    StreamOpened { peer_id: PeerId, protocol: StreamProtocol, result: Result<(), StreamError> },
}

/// Maintains the node's set of active peers.
///
/// Candidates surface through DHT discovery and wait in a FIFO queue;
/// each maintenance pass dials at most one of them while the active set
/// is below `target_peer_amount`, and evicts dead, excess, or stale
/// peers. A candidate becomes active once the remote peer is identified
/// and a block-announce stream is open to it.
pub struct PeerManager {
    config: PeeringConfig,
    dev_mode: bool,
    bootstrap_nodes: Vec<PeerRecord>,
    local_peer: PeerId,
    book: PeerBook,
    host: Arc<dyn NetworkHost>,
    address_book: Arc<dyn AddressBook>,
    discovery: Arc<dyn Discovery>,
    identify: Arc<dyn IdentifyService>,
    stream_engine: Arc<dyn StreamEngine>,
    protocols: Arc<dyn ProtocolSet>,
    sync_clients: Arc<dyn SyncClientSet>,
    metrics: Arc<PeerManagerMetrics>,
    commands: mpsc::Receiver<PeerCommand>,
    completion_tx: mpsc::Sender<IoCompletion>,
    completion_rx: mpsc::Receiver<IoCompletion>,
}

impl PeerManager {
    /// Create a new instance of Self together with the handle other
    /// components use to reach it.
    pub fn new(config: NetworkConfig, services: NetworkServices) -> (Self, PeerManagerHandle) {
        let NetworkConfig { peering, dev_mode, bootstrap_nodes } = config;
        let (command_tx, commands) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_CHANNEL_CAPACITY);
        let local_peer = services.host.own_peer().id;

        let manager = Self {
            config: peering,
            dev_mode,
            bootstrap_nodes: bootstrap_nodes.into_iter().map(PeerRecord::from).collect(),
            local_peer,
            book: PeerBook::new(local_peer),
            host: services.host,
            address_book: services.address_book,
            discovery: services.discovery,
            identify: services.identify,
            stream_engine: services.stream_engine,
            protocols: services.protocols,
            sync_clients: services.sync_clients,
            metrics: services.metrics,
            commands,
            completion_tx,
            completion_rx,
        };

        (manager, PeerManagerHandle::new(command_tx))
    }

    /// Validate the configuration before the node starts networking.
    ///
    /// Outside dev mode a node cannot join the network without
    /// bootstrap peers, so an empty list fails startup.
    pub fn prepare(&self) -> PeersResult<()> {
        self.config.validate()?;
        if !self.dev_mode && self.bootstrap_nodes.is_empty() {
            error!(
                target: "peer-manager",
                "no bootstrap nodes configured; provide them via the chain spec or `--bootnodes`"
            );
            return Err(PeerManagerError::NoBootstrapNodes);
        }
        Ok(())
    }

    /// Run the peer manager until shutdown.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        if self.dev_mode && self.bootstrap_nodes.is_empty() {
            self.run_passive().await;
            return;
        }

        info!(target: "peer-manager", "peer manager started");

        // seed ourselves into peer routing
        self.discovery.add_peer(self.host.own_peer(), true);

        let mut discovered = self.discovery.subscribe();
        let mut identified = self.identify.subscribe();
        self.identify.start();

        // bootstrap nodes are the first peers the DHT knows about
        for record in self.bootstrap_nodes.clone() {
            self.discovery.add_peer(record, true);
        }
        self.discovery.start();

        self.align();
        let align_timer = time::sleep(self.config.aligning_period);
        tokio::pin!(align_timer);

        let mut discovery_open = true;
        let mut identify_open = true;

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(PeerCommand::Shutdown) | None => {
                        info!(target: "peer-manager", "peer manager shutting down");
                        break;
                    }
                    Some(command) => self.handle_command(command),
                },
                event = discovered.recv(), if discovery_open => match event {
                    Ok(peer_id) => self.on_peer_discovered(peer_id),
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!(target: "peer-manager", count, "lagged behind discovery events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!(target: "peer-manager", "discovery event stream closed");
                        discovery_open = false;
                    }
                },
                event = identified.recv(), if identify_open => match event {
                    Ok(peer_id) => self.on_peer_identified(peer_id),
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!(target: "peer-manager", count, "lagged behind identify events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!(target: "peer-manager", "identify event stream closed");
                        identify_open = false;
                    }
                },
                completion = self.completion_rx.recv() => {
                    // never None: the manager holds a sender itself
                    if let Some(completion) = completion {
                        self.handle_completion(completion);
                    }
                },
                _ = &mut align_timer => {
                    self.align();
                    align_timer.as_mut().reset(Instant::now() + self.config.aligning_period);
                }
            }
        }
    }

    /// Dev-mode fallback when no bootstrap nodes are configured: serve
    /// facade commands but never subscribe, maintain, or dial. The host
    /// still accepts incoming connections.
    async fn run_passive(&mut self) {
        warn!(
            target: "peer-manager",
            "peer manager started in passive mode because no bootstrap nodes are configured"
        );
        while let Some(command) = self.commands.recv().await {
            if matches!(command, PeerCommand::Shutdown) {
                info!(target: "peer-manager", "peer manager shutting down");
                break;
            }
            self.handle_command(command);
        }
    }

    fn handle_command(&mut self, command: PeerCommand) {
        match command {
            PeerCommand::ActivePeersCount { reply } => {
                let _ = reply.send(self.book.active_count());
            }
            PeerCommand::ForEachPeer { mut visitor } => {
                for peer_id in self.book.active_ids() {
                    visitor(peer_id);
                }
            }
            PeerCommand::ForOnePeer { peer_id, visitor } => {
                if self.book.is_active(&peer_id) {
                    visitor(&peer_id);
                }
            }
            PeerCommand::KeepAlive { peer_id } => {
                self.book.touch(&peer_id, Instant::now());
            }
            PeerCommand::UpdateStatus { peer_id, status } => {
                self.book.update_status(peer_id, status, Instant::now());
                self.sync_gauges();
            }
            PeerCommand::UpdateBestBlock { peer_id, best_block } => {
                self.book.update_best_block(&peer_id, best_block, Instant::now());
            }
            PeerCommand::GetStatus { peer_id, reply } => {
                let _ = reply.send(self.book.status_of(&peer_id));
            }
            PeerCommand::Dial { record } => self.dial_record(record),
            PeerCommand::ReserveStreams { peer_id } => self.reserve_streams(&peer_id),
            // intercepted by the run loops
            PeerCommand::Shutdown => {}
        }
    }

    /// One maintenance pass over the active set: drop dead peers,
    /// enforce the capacity limits, then dial at most one candidate if
    /// the set is under target.
    pub(crate) fn align(&mut self) {
        let PeeringConfig { target_peer_amount, soft_limit, hard_limit, peer_ttl, .. } =
            self.config;
        let now = Instant::now();

        // drop peers whose block-announce stream has gone away, so they
        // do not count against the limits below
        let block_announce = self.protocols.block_announce().protocol();
        let dead: Vec<PeerId> = self
            .book
            .active_ids()
            .filter(|peer_id| !self.stream_engine.is_alive(peer_id, &block_announce))
            .copied()
            .collect();
        for peer_id in dead {
            debug!(target: "peer-manager", %peer_id, "found dead peer");
            self.disconnect_from_peer(&peer_id);
            self.metrics.evictions.with_label_values(&[EVICTION_DEAD]).inc();
        }

        if self.book.active_count() > hard_limit {
            while self.book.active_count() > hard_limit {
                let Some((oldest, _)) = self.book.oldest_active() else { break };
                debug!(target: "peer-manager", peer_id = %oldest, "hard limit of active peers exceeded");
                self.disconnect_from_peer(&oldest);
                self.metrics.evictions.with_label_values(&[EVICTION_HARD_LIMIT]).inc();
            }
        } else if self.book.active_count() > soft_limit {
            // the soft limit is advisory: only peers silent past their
            // ttl are evicted here
            if let Some((oldest, last_seen)) = self.book.oldest_active() {
                if last_seen + peer_ttl < now {
                    debug!(target: "peer-manager", peer_id = %oldest, "found inactive peer");
                    self.disconnect_from_peer(&oldest);
                    self.metrics.evictions.with_label_values(&[EVICTION_TTL]).inc();
                } else {
                    debug!(target: "peer-manager", "no peer to disconnect at soft limit");
                    self.metrics.soft_limit_overruns.inc();
                }
            }
        }

        if self.book.active_count() < target_peer_amount {
            if let Some(candidate) = self.book.take_next_candidate() {
                // one outbound dial per pass keeps dial bursts bounded
                debug!(
                    target: "peer-manager",
                    peer_id = %candidate,
                    remaining = self.book.queue_len(),
                    "dialing next candidate"
                );
                self.connect_to_peer(candidate);
            } else if self.book.connecting_count() == 0 {
                debug!(target: "peer-manager", "connect queue is empty, reusing bootstrap nodes");
                for record in self.bootstrap_nodes.clone() {
                    if record.id != self.local_peer && self.book.insert_connecting(record.id) {
                        self.connect_to_peer(record.id);
                    }
                }
            } else {
                debug!(
                    target: "peer-manager",
                    connecting = self.book.connecting_count(),
                    "connect queue is empty, dials in flight"
                );
            }
        }

        self.sync_gauges();
    }

    /// A peer newly observed by the DHT becomes a dial candidate.
    pub(crate) fn on_peer_discovered(&mut self, peer_id: PeerId) {
        if self.book.enqueue(peer_id) {
            debug!(
                target: "peer-manager",
                %peer_id,
                queued = self.book.queue_len(),
                "new peer enqueued"
            );
            self.metrics.queued_candidates.set(self.book.queue_len() as i64);
        }
    }

    /// Store the record's addresses and dial the peer.
    fn dial_record(&mut self, record: PeerRecord) {
        self.address_book.upsert_addresses(&record.id, &record.addresses, AddressTtl::Transient);
        if self.book.insert_connecting(record.id) {
            self.connect_to_peer(record.id);
        }
        self.sync_gauges();
    }

    /// Dial a peer already marked as connecting. Abandoning the dial
    /// for any reason clears the connecting entry again.
    fn connect_to_peer(&mut self, peer_id: PeerId) {
        let record = self.host.peer_record(&peer_id);
        if record.addresses.is_empty() {
            debug!(target: "peer-manager", %peer_id, "no known addresses for peer");
            self.book.clear_connecting(&peer_id);
            return;
        }
        if self.host.connectedness(&record) == Connectedness::CannotConnect {
            debug!(target: "peer-manager", %peer_id, "peer is not reachable");
            self.book.clear_connecting(&peer_id);
            return;
        }

        debug!(target: "peer-manager", %peer_id, addresses = ?record.addresses, "dialing peer");
        let host = Arc::clone(&self.host);
        let completions = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = host.connect(&record).await;
            // the manager may be gone by now; the completion then goes
            // nowhere and no state is touched
            let _ = completions.send(IoCompletion::Dial { peer_id: record.id, result }).await;
        });
    }

    fn handle_completion(&mut self, completion: IoCompletion) {
        match completion {
            IoCompletion::Dial { peer_id, result } => self.on_dial_complete(peer_id, result),
            IoCompletion::StreamOpened { peer_id, protocol, result } => {
                self.on_stream_opened(peer_id, protocol, result)
            }
        }
        self.sync_gauges();
    }

    fn on_dial_complete(&mut self, peer_id: PeerId, result: Result<Option<PeerId>, HostError>) {
        self.book.clear_connecting(&peer_id);
        match result {
            Err(error) => {
                debug!(target: "peer-manager", %peer_id, %error, "connecting to peer failed");
                self.metrics.dial_failures.inc();
            }
            Ok(None) => {
                debug!(target: "peer-manager", %peer_id, "connected, but not identified yet");
            }
            Ok(Some(remote_peer_id)) if remote_peer_id == peer_id => {
                debug!(
                    target: "peer-manager",
                    %peer_id,
                    "perhaps already connected, processing immediately"
                );
                self.on_peer_identified(peer_id);
            }
            Ok(Some(remote_peer_id)) => {
                debug!(
                    target: "peer-manager",
                    expected = %peer_id,
                    actual = %remote_peer_id,
                    "connected to a different peer than dialed"
                );
            }
        }
    }

    /// The remote peer announced its identity over an established
    /// connection; open the block-announce stream and promote it.
    pub(crate) fn on_peer_identified(&mut self, peer_id: PeerId) {
        if peer_id == self.local_peer {
            return;
        }
        debug!(target: "peer-manager", %peer_id, "new connection with peer");

        let addresses = self.address_book.addresses_of(&peer_id);
        if addresses.is_empty() {
            debug!(target: "peer-manager", %peer_id, "no addresses provided for peer");
            self.book.clear_connecting(&peer_id);
            return;
        }
        let record = PeerRecord::new(peer_id, addresses);

        if self.book.active_count() >= self.config.hard_limit {
            // no capacity for another active peer
            self.book.clear_connecting(&peer_id);
        } else {
            let block_announce = self.protocols.block_announce();
            if !self.stream_engine.is_alive(&peer_id, &block_announce.protocol()) {
                let completions = self.completion_tx.clone();
                let stream_record = record.clone();
                tokio::spawn(async move {
                    let protocol = block_announce.protocol();
                    let result = block_announce.open_outgoing(&stream_record).await;
                    let _ = completions
                        .send(IoCompletion::StreamOpened {
                            peer_id: stream_record.id,
                            protocol,
                            result,
                        })
                        .await;
                });
            }
        }

        // keep the peer in the DHT routing table either way
        self.discovery.add_peer(record, false);
        self.sync_gauges();
    }

    fn on_stream_opened(
        &mut self,
        peer_id: PeerId,
        protocol: StreamProtocol,
        result: Result<(), StreamError>,
    ) {
        self.book.clear_connecting(&peer_id);
        match result {
            Err(error) => {
                warn!(
                    target: "peer-manager",
                    %peer_id,
                    ?protocol,
                    %error,
                    "unable to open stream with peer"
                );
                self.disconnect_from_peer(&peer_id);
            }
            Ok(()) => {
                self.book.promote_to_active(peer_id, Instant::now());
                debug!(
                    target: "peer-manager",
                    %peer_id,
                    remaining = self.book.queue_len(),
                    "peer promoted to active"
                );
            }
        }
    }

    /// Drop a peer from the active set and tear down everything that
    /// depends on it.
    fn disconnect_from_peer(&mut self, peer_id: &PeerId) {
        if self.book.remove(peer_id) {
            debug!(target: "peer-manager", %peer_id, "disconnecting from peer");
            self.stream_engine.del(peer_id);
            debug!(
                target: "peer-manager",
                remaining = self.book.active_count(),
                "active peers remained"
            );
        }
        self.sync_clients.remove(peer_id);
    }

    /// Reserve stream slots for the auxiliary protocols multiplexed
    /// over a peer's connection. Idempotent.
    fn reserve_streams(&self, peer_id: &PeerId) {
        self.stream_engine.add_slot(peer_id, self.protocols.gossip().protocol());
        self.stream_engine.add_slot(peer_id, self.protocols.propagate_transactions().protocol());
        self.stream_engine.add_slot(peer_id, self.protocols.sup().protocol());
    }

    fn sync_gauges(&self) {
        self.metrics.active_peers.set(self.book.active_count() as i64);
        self.metrics.connecting_peers.set(self.book.connecting_count() as i64);
        self.metrics.queued_candidates.set(self.book.queue_len() as i64);
    }
}

#[cfg(test)]
impl PeerManager {
    pub(crate) fn book(&self) -> &PeerBook {
        &self.book
    }

    pub(crate) fn book_mut(&mut self) -> &mut PeerBook {
        &mut self.book
    }

    /// Receive and apply the next dial or stream-open completion.
    /// Panics if every completion sender is gone.
    pub(crate) async fn process_next_completion(&mut self) {
        let completion =
            self.completion_rx.recv().await.expect("manager holds a completion sender");
        self.handle_completion(completion);
    }
}
