//! Configuration for network variables.

use crate::ConfigError;
use libp2p::{Multiaddr, PeerId};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use std::time::Duration;

/// The container for all network configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Limits and timing for active peer set maintenance.
    pub peering: PeeringConfig,
    /// Run without the production safety checks.
    ///
    /// In dev mode the node may start without bootstrap nodes; it then
    /// only accepts incoming connections and never dials out.
    pub dev_mode: bool,
    /// Well-known peers used to join the network.
    pub bootstrap_nodes: Vec<BootstrapNode>,
}

/// Limits and timing for maintaining the active peer set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PeeringConfig {
    /// Desired number of active peers. Maintenance dials new candidates
    /// while the active set is below this count.
    pub target_peer_amount: usize,
    /// Advisory upper bound. Above it, the oldest silent peer becomes
    /// eligible for eviction once `peer_ttl` has elapsed.
    pub soft_limit: usize,
    /// Mandatory upper bound on the active set.
    pub hard_limit: usize,
    /// Maximum silence tolerated before an active peer can be evicted
    /// under soft-limit pressure.
    #[serde(with = "humantime_serde")]
    pub peer_ttl: Duration,
    /// Delay between peer set maintenance passes.
    #[serde(with = "humantime_serde")]
    pub aligning_period: Duration,
}

impl Default for PeeringConfig {
    fn default() -> Self {
        Self {
            target_peer_amount: 4,
            soft_limit: 8,
            hard_limit: 10,
            peer_ttl: Duration::from_secs(10 * 60),
            aligning_period: Duration::from_secs(5),
        }
    }
}

impl PeeringConfig {
    /// Check the internal consistency of the limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_peer_amount > self.soft_limit || self.soft_limit > self.hard_limit {
            return Err(ConfigError::PeerLimitsOutOfOrder {
                target: self.target_peer_amount,
                soft: self.soft_limit,
                hard: self.hard_limit,
            });
        }
        if self.peer_ttl.is_zero() {
            return Err(ConfigError::ZeroDuration("peer_ttl"));
        }
        if self.aligning_period.is_zero() {
            return Err(ConfigError::ZeroDuration("aligning_period"));
        }
        Ok(())
    }
}

/// A well-known peer used to join the network.
///
/// `PeerId` and `Multiaddr` are serialized through their text forms so
/// bootstrap lists stay human-editable in the node config file.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapNode {
    /// The peer's identity.
    #[serde_as(as = "DisplayFromStr")]
    pub peer_id: PeerId,
    /// Addresses the peer listens on.
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub addresses: Vec<Multiaddr>,
}
