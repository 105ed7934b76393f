//! Metrics for peer set maintenance.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

/// Reason label values for the eviction counter.
pub(crate) const EVICTION_DEAD: &str = "dead_stream";
pub(crate) const EVICTION_HARD_LIMIT: &str = "hard_limit";
pub(crate) const EVICTION_TTL: &str = "ttl";

/// Gauges and counters published by the peer manager.
#[derive(Debug, Clone)]
pub struct PeerManagerMetrics {
    /// Peers with an open block-announce stream.
    pub active_peers: IntGauge,
    /// Peers with a dial or stream-open attempt in flight.
    pub connecting_peers: IntGauge,
    /// Discovered peers awaiting a dial.
    pub queued_candidates: IntGauge,
    /// Peers evicted from the active set, by reason.
    pub evictions: IntCounterVec,
    /// Outbound dials that did not produce a connection.
    pub dial_failures: IntCounter,
    /// Maintenance passes that found the active set above the soft
    /// limit but evicted nothing because every peer was fresh.
    pub soft_limit_overruns: IntCounter,
}

impl PeerManagerMetrics {
    /// Create a new instance of Self, registering every series with the
    /// given registry.
    pub fn new(registry: &Registry) -> Self {
        let active_peers = IntGauge::new("peer_manager_active_peers", "Number of active peers")
            .expect("metric can be created");
        let connecting_peers = IntGauge::new(
            "peer_manager_connecting_peers",
            "Number of in-flight connection attempts",
        )
        .expect("metric can be created");
        let queued_candidates = IntGauge::new(
            "peer_manager_queued_candidates",
            "Number of discovered peers awaiting a dial",
        )
        .expect("metric can be created");
        let evictions = IntCounterVec::new(
            Opts::new("peer_manager_evictions_total", "Peers evicted from the active set"),
            &["reason"],
        )
        .expect("metric can be created");
        let dial_failures = IntCounter::new(
            "peer_manager_dial_failures_total",
            "Outbound dials that did not produce a connection",
        )
        .expect("metric can be created");
        let soft_limit_overruns = IntCounter::new(
            "peer_manager_soft_limit_overruns_total",
            "Maintenance passes above the soft limit with no evictable peer",
        )
        .expect("metric can be created");

        for collector in [
            Box::new(active_peers.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(connecting_peers.clone()),
            Box::new(queued_candidates.clone()),
            Box::new(evictions.clone()),
            Box::new(dial_failures.clone()),
            Box::new(soft_limit_overruns.clone()),
        ] {
            registry.register(collector).expect("metric registered once");
        }

        Self {
            active_peers,
            connecting_peers,
            queued_candidates,
            evictions,
            dial_failures,
            soft_limit_overruns,
        }
    }
}

impl Default for PeerManagerMetrics {
    fn default() -> Self {
        Self::new(&Registry::new())
    }
}
