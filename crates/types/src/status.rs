//! Chain state a peer announces about itself.

use crate::{BlockHash, BlockInfo};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Node roles advertised during the status handshake.
///
/// Stored as a bitmask so future roles extend the wire format without
/// breaking older peers.
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles(u8);

impl Roles {
    /// Full node: keeps the complete chain state.
    pub const FULL: Roles = Roles(0b0000_0001);
    /// Light client: tracks headers only.
    pub const LIGHT: Roles = Roles(0b0000_0010);
    /// Authority: participates in block production.
    pub const AUTHORITY: Roles = Roles(0b0000_0100);

    /// Create roles from a raw bitmask.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The raw bitmask.
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Returns true if all roles in `other` are present.
    pub const fn contains(&self, other: Roles) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Roles {
    type Output = Roles;

    fn bitor(self, rhs: Roles) -> Roles {
        Roles(self.0 | rhs.0)
    }
}

impl fmt::Debug for Roles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Roles({:#010b})", self.0)
    }
}

/// The last chain state a peer announced during the status handshake.
///
/// Networking components carry this value around without interpreting
/// it; only sync logic looks inside.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatus {
    /// Protocol version the peer speaks.
    pub version: u32,
    /// Oldest protocol version the peer still accepts.
    pub min_supported_version: u32,
    /// Roles the peer advertises.
    pub roles: Roles,
    /// The peer's best (highest) known block.
    pub best_block: BlockInfo,
    /// Hash of the genesis block, identifying the network.
    pub genesis_hash: BlockHash,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_roles_bitmask() {
        let roles = Roles::FULL | Roles::AUTHORITY;
        assert!(roles.contains(Roles::FULL));
        assert!(roles.contains(Roles::AUTHORITY));
        assert!(!roles.contains(Roles::LIGHT));
        assert_eq!(roles.bits(), 0b0000_0101);
    }

    #[test]
    fn test_status_serde_round_trip() {
        let status = ChainStatus {
            version: 6,
            min_supported_version: 3,
            roles: Roles::FULL,
            best_block: BlockInfo::new(42, BlockHash::new([7u8; 32])),
            genesis_hash: BlockHash::new([1u8; 32]),
        };
        let encoded = serde_yaml::to_string(&status).expect("status serializes");
        let decoded: ChainStatus = serde_yaml::from_str(&encoded).expect("status deserializes");
        assert_eq!(status, decoded);
    }
}
