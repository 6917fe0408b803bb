//! Base types, capacities and errors
//!
//! Pool capacities are compile-time constants: every table in the controller
//! is a fixed-size arena and allocation failure is an ordinary outcome.

use core::fmt;

// ============================================================================
// Capacity Constants
// ============================================================================

/// Maximum nodes tracked by the registry, controller included
pub const MAX_NODES: usize = 32;

/// Maximum link observations
pub const MAX_LINKS: usize = 64;

/// Maximum forwarding-tree edges (a full tree plus one round of replacements)
pub const MAX_EDGES: usize = 2 * MAX_NODES;

/// Maximum config-route source records
pub const MAX_ROUTE_SOURCES: usize = MAX_NODES;

/// Maximum (destination, via) pairs per source record
pub const MAX_PAIRS_PER_SOURCE: usize = 10;

/// Maximum outstanding sequence numbers awaiting acknowledgment
pub const PENDING_ACK_SLOTS: usize = 8;

/// Dense index capacity for cost matrices
pub const MAX_VERTICES: usize = MAX_NODES;

// ============================================================================
// Timing Defaults (milliseconds)
// ============================================================================

/// Node lifetime without a fresh report (15 min)
pub const NODE_TIMEOUT_MS: TimeMs = 15 * 60 * 1000;

/// Link observation lifetime without a fresh report (15 min)
pub const LINK_TIMEOUT_MS: TimeMs = 15 * 60 * 1000;

/// Minimum gap between rounds triggered by topology changes
pub const MIN_ROUND_INTERVAL_MS: TimeMs = 10 * 1000;

/// Unsolicited recomputation period (12 min)
pub const REFRESH_INTERVAL_MS: TimeMs = 12 * 60 * 1000;

/// Per-attempt acknowledgment timeout
pub const ACK_TIMEOUT_MS: TimeMs = 7 * 1000;

/// Transmission attempts per target before it is abandoned for the round
pub const MAX_ATTEMPTS: u8 = 8;

/// Residual energy below which a node is considered dead
pub const ENERGY_THRESHOLD: Energy = 150;

// ============================================================================
// Basic Types
// ============================================================================

/// Timestamp in milliseconds
pub type TimeMs = u64;

/// Hop distance from the controller
pub type Rank = u8;

/// Rank of the controller
pub const RANK_CONTROLLER: Rank = 0;

/// Rank of a node with no known path
pub const RANK_UNREACHABLE: Rank = 0xFF;

/// Residual energy estimate reported by a node
pub type Energy = i16;

/// Signed link quality (RSSI, dBm)
pub type LinkQuality = i16;

/// Two-byte link-layer address, printed as `hi.lo`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(transparent))]
pub struct LinkAddr(pub u16);

impl LinkAddr {
    /// Build from the two address bytes
    pub const fn new(hi: u8, lo: u8) -> Self {
        Self(((hi as u16) << 8) | lo as u16)
    }

    /// Big-endian wire bytes
    pub const fn to_be_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// Parse from big-endian wire bytes
    pub const fn from_be_bytes(bytes: [u8; 2]) -> Self {
        Self(u16::from_be_bytes(bytes))
    }
}

impl From<u16> for LinkAddr {
    fn from(raw: u16) -> Self {
        Self(raw)
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [hi, lo] = self.to_be_bytes();
        write!(f, "{}.{}", hi, lo)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Result type for controller operations
pub type Result<T> = core::result::Result<T, Error>;

/// Bounded pool that ran out of slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Node registry
    Nodes,
    /// Link observation table
    Links,
    /// Forwarding-tree edges
    Edges,
    /// Config-route source records
    RouteSources,
    /// Controller forwarding table
    Forwarding,
    /// Reported table checksums
    Checksums,
}

/// Error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid argument provided
    InvalidArg,
    /// Pool has no free slot
    PoolFull(PoolKind),
    /// Live node count exceeds the dense index capacity
    CapacityExceeded {
        /// Nodes that needed an index
        live: usize,
        /// Configured capacity
        capacity: usize,
    },
    /// Item not found
    NotFound,
    /// Source and destination are disconnected in the edge set
    NoRoute,
    /// Per-source pair list is full
    RouteListFull,
    /// Packet too short or inconsistent
    Malformed,
    /// Packet checksum did not verify
    ChecksumMismatch,
    /// Acknowledgment for a sequence number not awaiting one
    StaleAck,
    /// HAL failure
    HalFailure,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArg => write!(f, "invalid argument"),
            Error::PoolFull(pool) => write!(f, "{:?} pool full", pool),
            Error::CapacityExceeded { live, capacity } => {
                write!(f, "{} live nodes exceed index capacity {}", live, capacity)
            }
            Error::NotFound => write!(f, "not found"),
            Error::NoRoute => write!(f, "no route"),
            Error::RouteListFull => write!(f, "route list full"),
            Error::Malformed => write!(f, "malformed packet"),
            Error::ChecksumMismatch => write!(f, "checksum mismatch"),
            Error::StaleAck => write!(f, "stale acknowledgment"),
            Error::HalFailure => write!(f, "HAL failure"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_addr_bytes() {
        let addr = LinkAddr::new(1, 2);
        assert_eq!(addr.0, 0x0102);
        assert_eq!(addr.to_be_bytes(), [1, 2]);
        assert_eq!(LinkAddr::from_be_bytes([1, 2]), addr);
    }

    #[cfg(feature = "std")]
    #[test]
    fn test_link_addr_display() {
        assert_eq!(LinkAddr::new(3, 0).to_string(), "3.0");
        assert_eq!(
            Error::CapacityExceeded { live: 5, capacity: 4 }.to_string(),
            "5 live nodes exceed index capacity 4"
        );
    }

    #[test]
    fn test_capacities() {
        assert!(MAX_EDGES >= MAX_NODES - 1);
        assert!(PENDING_ACK_SLOTS >= MAX_ATTEMPTS as usize);
    }
}
