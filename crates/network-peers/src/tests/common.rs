//! Shared test doubles for the node capabilities the peer manager
//! consumes.
//!
//! All mocks share one [MockNet] core so the address book, host, DHT,
//! and stream engine observe a consistent little network, the same way
//! the real implementations share the host's repositories.

use crate::{
    error::{HostError, StreamError},
    traits::{
        AddressBook, Discovery, IdentifyService, NetworkHost, NotificationProtocol, ProtocolSet,
        StreamEngine, SyncClientSet,
    },
    types::{AddressTtl, Connectedness, PeerRecord},
    NetworkServices, PeerManager, PeerManagerHandle, PeerManagerMetrics,
};
use async_trait::async_trait;
use cn_config::{BootstrapNode, NetworkConfig, PeeringConfig};
use libp2p::{Multiaddr, PeerId, StreamProtocol};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::{broadcast, Notify};

pub(crate) fn block_announce_protocol() -> StreamProtocol {
    StreamProtocol::new("/cn/block-announces/1")
}

pub(crate) fn gossip_protocol() -> StreamProtocol {
    StreamProtocol::new("/cn/gossip/1")
}

pub(crate) fn transactions_protocol() -> StreamProtocol {
    StreamProtocol::new("/cn/transactions/1")
}

pub(crate) fn sup_protocol() -> StreamProtocol {
    StreamProtocol::new("/cn/sup/1")
}

pub(crate) fn create_test_multiaddr(id: u8) -> Multiaddr {
    format!("/ip4/127.0.0.{id}/tcp/30333").parse().expect("valid multiaddr")
}

/// Observable state of the mock network.
#[derive(Default)]
pub(crate) struct NetState {
    /// Addresses known per peer (host repository + address book).
    pub records: HashMap<PeerId, Vec<Multiaddr>>,
    /// Peers the host reports as unreachable.
    pub unreachable: HashSet<PeerId>,
    /// Scripted dial outcomes; peers without an entry connect and
    /// identify immediately.
    pub dial_results: HashMap<PeerId, Result<Option<PeerId>, HostError>>,
    /// Every dial the host performed, in order.
    pub dialed: Vec<PeerId>,
    /// Streams currently alive per (peer, protocol).
    pub live_streams: HashSet<(PeerId, StreamProtocol)>,
    /// Scripted stream negotiation failures.
    pub stream_failures: HashMap<PeerId, StreamError>,
    /// Every outbound stream negotiation attempted, in order.
    pub opened_streams: Vec<(PeerId, StreamProtocol)>,
    /// Stream slots reserved with the engine.
    pub slots: Vec<(PeerId, StreamProtocol)>,
    /// Peers whose streams were torn down.
    pub deleted_streams: Vec<PeerId>,
    /// Peers added to the DHT routing table, with the permanent flag.
    pub dht_peers: Vec<(PeerId, bool)>,
    /// Peers removed from the sync client registry.
    pub sync_removed: Vec<PeerId>,
    pub discovery_started: bool,
    pub identify_started: bool,
}

/// The shared mock network core.
pub(crate) struct MockNet {
    pub own: PeerRecord,
    pub state: Mutex<NetState>,
    pub discovery_tx: broadcast::Sender<PeerId>,
    pub identify_tx: broadcast::Sender<PeerId>,
    /// When set, dials block until the gate is notified.
    pub dial_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockNet {
    pub(crate) fn arc() -> Arc<Self> {
        let (discovery_tx, _) = broadcast::channel(32);
        let (identify_tx, _) = broadcast::channel(32);
        Arc::new(Self {
            own: PeerRecord::new(PeerId::random(), vec![create_test_multiaddr(1)]),
            state: Mutex::new(NetState::default()),
            discovery_tx,
            identify_tx,
            dial_gate: Mutex::new(None),
        })
    }

    /// Register a peer with one address, as if the host had learned it
    /// through the DHT.
    pub(crate) fn add_known_peer(&self, peer_id: PeerId, addr_id: u8) {
        self.state
            .lock()
            .expect("mock state lock")
            .records
            .insert(peer_id, vec![create_test_multiaddr(addr_id)]);
    }

    /// Mark the block-announce stream to the peer as alive.
    pub(crate) fn set_stream_alive(&self, peer_id: PeerId) {
        self.state
            .lock()
            .expect("mock state lock")
            .live_streams
            .insert((peer_id, block_announce_protocol()));
    }

    /// Make all dials block until the returned gate is notified.
    pub(crate) fn gate_dials(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.dial_gate.lock().expect("mock gate lock") = Some(gate.clone());
        gate
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&NetState) -> R) -> R {
        f(&self.state.lock().expect("mock state lock"))
    }

    pub(crate) fn with_state_mut<R>(&self, f: impl FnOnce(&mut NetState) -> R) -> R {
        f(&mut self.state.lock().expect("mock state lock"))
    }
}

pub(crate) struct MockHost {
    pub net: Arc<MockNet>,
}

#[async_trait]
impl NetworkHost for MockHost {
    fn own_peer(&self) -> PeerRecord {
        self.net.own.clone()
    }

    fn peer_record(&self, peer_id: &PeerId) -> PeerRecord {
        let addresses = self
            .net
            .with_state(|state| state.records.get(peer_id).cloned())
            .unwrap_or_default();
        PeerRecord::new(*peer_id, addresses)
    }

    fn connectedness(&self, record: &PeerRecord) -> Connectedness {
        if self.net.with_state(|state| state.unreachable.contains(&record.id)) {
            Connectedness::CannotConnect
        } else {
            Connectedness::CanConnect
        }
    }

    async fn connect(&self, record: &PeerRecord) -> Result<Option<PeerId>, HostError> {
        let gate = self.net.dial_gate.lock().expect("mock gate lock").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.net.with_state_mut(|state| {
            state.dialed.push(record.id);
            match state.dial_results.get(&record.id) {
                Some(result) => result.clone(),
                None => Ok(Some(record.id)),
            }
        })
    }
}

pub(crate) struct MockAddressBook {
    pub net: Arc<MockNet>,
}

impl AddressBook for MockAddressBook {
    fn upsert_addresses(&self, peer_id: &PeerId, addresses: &[Multiaddr], _ttl: AddressTtl) {
        self.net.with_state_mut(|state| {
            let known = state.records.entry(*peer_id).or_default();
            for address in addresses {
                if !known.contains(address) {
                    known.push(address.clone());
                }
            }
        });
    }

    fn addresses_of(&self, peer_id: &PeerId) -> Vec<Multiaddr> {
        self.net.with_state(|state| state.records.get(peer_id).cloned()).unwrap_or_default()
    }
}

pub(crate) struct MockDiscovery {
    pub net: Arc<MockNet>,
}

impl Discovery for MockDiscovery {
    fn add_peer(&self, record: PeerRecord, permanent: bool) {
        self.net.with_state_mut(|state| {
            state.dht_peers.push((record.id, permanent));
            // the routing table feeds the host's address repository
            let known = state.records.entry(record.id).or_default();
            for address in record.addresses {
                if !known.contains(&address) {
                    known.push(address);
                }
            }
        });
    }

    fn start(&self) {
        self.net.with_state_mut(|state| state.discovery_started = true);
    }

    fn subscribe(&self) -> broadcast::Receiver<PeerId> {
        self.net.discovery_tx.subscribe()
    }
}

pub(crate) struct MockIdentify {
    pub net: Arc<MockNet>,
}

impl IdentifyService for MockIdentify {
    fn start(&self) {
        self.net.with_state_mut(|state| state.identify_started = true);
    }

    fn subscribe(&self) -> broadcast::Receiver<PeerId> {
        self.net.identify_tx.subscribe()
    }
}

pub(crate) struct MockStreamEngine {
    pub net: Arc<MockNet>,
}

impl StreamEngine for MockStreamEngine {
    fn is_alive(&self, peer_id: &PeerId, protocol: &StreamProtocol) -> bool {
        self.net.with_state(|state| state.live_streams.contains(&(*peer_id, protocol.clone())))
    }

    fn add_slot(&self, peer_id: &PeerId, protocol: StreamProtocol) {
        self.net.with_state_mut(|state| state.slots.push((*peer_id, protocol)));
    }

    fn del(&self, peer_id: &PeerId) {
        self.net.with_state_mut(|state| {
            state.deleted_streams.push(*peer_id);
            state.live_streams.retain(|(stream_peer, _)| stream_peer != peer_id);
        });
    }
}

pub(crate) struct MockProtocol {
    pub name: StreamProtocol,
    pub net: Arc<MockNet>,
}

#[async_trait]
impl NotificationProtocol for MockProtocol {
    fn protocol(&self) -> StreamProtocol {
        self.name.clone()
    }

    async fn open_outgoing(&self, record: &PeerRecord) -> Result<(), StreamError> {
        self.net.with_state_mut(|state| {
            state.opened_streams.push((record.id, self.name.clone()));
            if let Some(error) = state.stream_failures.get(&record.id) {
                Err(error.clone())
            } else {
                state.live_streams.insert((record.id, self.name.clone()));
                Ok(())
            }
        })
    }
}

pub(crate) struct MockProtocols {
    pub net: Arc<MockNet>,
}

impl ProtocolSet for MockProtocols {
    fn block_announce(&self) -> Arc<dyn NotificationProtocol> {
        Arc::new(MockProtocol { name: block_announce_protocol(), net: self.net.clone() })
    }

    fn gossip(&self) -> Arc<dyn NotificationProtocol> {
        Arc::new(MockProtocol { name: gossip_protocol(), net: self.net.clone() })
    }

    fn propagate_transactions(&self) -> Arc<dyn NotificationProtocol> {
        Arc::new(MockProtocol { name: transactions_protocol(), net: self.net.clone() })
    }

    fn sup(&self) -> Arc<dyn NotificationProtocol> {
        Arc::new(MockProtocol { name: sup_protocol(), net: self.net.clone() })
    }
}

pub(crate) struct MockSyncClients {
    pub net: Arc<MockNet>,
}

impl SyncClientSet for MockSyncClients {
    fn remove(&self, peer_id: &PeerId) {
        self.net.with_state_mut(|state| state.sync_removed.push(*peer_id));
    }
}

/// A peer manager wired to mocks, plus everything a test needs to poke
/// at it.
pub(crate) struct TestNode {
    pub net: Arc<MockNet>,
    pub manager: PeerManager,
    pub handle: PeerManagerHandle,
    pub metrics: Arc<PeerManagerMetrics>,
}

pub(crate) fn peering_config(target: usize, soft: usize, hard: usize) -> PeeringConfig {
    PeeringConfig {
        target_peer_amount: target,
        soft_limit: soft,
        hard_limit: hard,
        peer_ttl: Duration::from_secs(10),
        aligning_period: Duration::from_secs(5),
    }
}

pub(crate) fn create_test_node(config: NetworkConfig) -> TestNode {
    create_test_node_with(MockNet::arc(), config)
}

pub(crate) fn create_test_node_with(net: Arc<MockNet>, config: NetworkConfig) -> TestNode {
    let metrics = Arc::new(PeerManagerMetrics::default());
    let services = NetworkServices {
        host: Arc::new(MockHost { net: net.clone() }),
        address_book: Arc::new(MockAddressBook { net: net.clone() }),
        discovery: Arc::new(MockDiscovery { net: net.clone() }),
        identify: Arc::new(MockIdentify { net: net.clone() }),
        stream_engine: Arc::new(MockStreamEngine { net: net.clone() }),
        protocols: Arc::new(MockProtocols { net: net.clone() }),
        sync_clients: Arc::new(MockSyncClients { net: net.clone() }),
        metrics: metrics.clone(),
    };
    let (manager, handle) = PeerManager::new(config, services);
    TestNode { net, manager, handle, metrics }
}

pub(crate) fn bootstrap_node(peer_id: PeerId, addr_id: u8) -> BootstrapNode {
    BootstrapNode { peer_id, addresses: vec![create_test_multiaddr(addr_id)] }
}
