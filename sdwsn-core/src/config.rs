//! Controller configuration
//!
//! All timing parameters and runtime limits. Pool sizes are compile-time
//! constants in [`crate::types`]; `max_nodes` may only narrow them.

use crate::types::*;

/// Cost function used to build the forwarding tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "std", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "std", serde(rename_all = "kebab-case"))]
pub enum ResolverKind {
    /// Dijkstra over negated RSSI
    #[default]
    ShortestPath,
    /// Rank-layered path maximizing the bottleneck residual energy
    MaxResidualEnergy,
}

/// Controller configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "std", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "std", serde(default))]
pub struct ControllerConfig {
    /// Controller link address
    pub controller: LinkAddr,
    /// Node lifetime without a report
    pub node_timeout_ms: TimeMs,
    /// Link observation lifetime without a report
    pub link_timeout_ms: TimeMs,
    /// Nodes reporting less energy are considered dead
    pub energy_threshold: Energy,
    /// Minimum gap between rounds
    pub min_round_interval_ms: TimeMs,
    /// Unsolicited recomputation period
    pub refresh_interval_ms: TimeMs,
    /// Per-attempt acknowledgment timeout
    pub ack_timeout_ms: TimeMs,
    /// Transmission attempts per target and round
    pub max_attempts: u8,
    /// Dense index capacity (clamped to `MAX_VERTICES`)
    pub max_nodes: usize,
    /// Tree-building strategy
    pub resolver: ResolverKind,
    /// Only transmit to nodes whose reported table checksum disagrees
    pub differential: bool,
    /// Lower bound for the slotframe size announced to the scheduler
    pub min_slotframe_size: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller: LinkAddr::new(1, 0),
            node_timeout_ms: NODE_TIMEOUT_MS,
            link_timeout_ms: LINK_TIMEOUT_MS,
            energy_threshold: ENERGY_THRESHOLD,
            min_round_interval_ms: MIN_ROUND_INTERVAL_MS,
            refresh_interval_ms: REFRESH_INTERVAL_MS,
            ack_timeout_ms: ACK_TIMEOUT_MS,
            max_attempts: MAX_ATTEMPTS,
            max_nodes: MAX_VERTICES,
            resolver: ResolverKind::ShortestPath,
            differential: false,
            min_slotframe_size: 7,
        }
    }
}

impl ControllerConfig {
    /// Dense index capacity after clamping
    pub fn vertex_capacity(&self) -> usize {
        self.max_nodes.clamp(1, MAX_VERTICES)
    }

    /// Attempts per target after clamping to the pending-ack pool
    pub fn attempt_limit(&self) -> u8 {
        self.max_attempts.clamp(1, PENDING_ACK_SLOTS as u8)
    }

    /// Parse from JSON, missing fields take their defaults
    #[cfg(feature = "std")]
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}
