//! # SD-WSN Controller Core
//!
//! Centralized control plane for a software-defined wireless sensor
//! network. Nodes advertise their neighbors, energy and rank; the
//! controller builds a forwarding tree rooted at itself, derives per-node
//! routing tables and pushes them out hop by hop with acknowledgments.
//!
//! ## Pipeline
//!
//! ```text
//! advertisements ─► NodeRegistry ─┐
//!                   LinkTable ────┼─► NodeIndex ─► CostResolver ─► EdgeSet
//!                                 │                                  │
//!                                 │         PathResolver (DFS) ◄─────┘
//!                                 │                │
//!                                 └──► ConfigRoutes / ForwardingTable
//!                                                  │
//!                                           Dissemination ─► Hal::send
//! ```
//!
//! ### Cost resolvers
//!
//! - [`ShortestPath`]: Dijkstra with link weight `-RSSI`
//! - [`MaxResidualEnergyPath`]: each node picks the rank-1 neighbor whose
//!   path to the controller has the largest minimum residual energy
//!
//! ### Dissemination
//!
//! Config batches go out shallowest node first. Each target gets up to
//! `max_attempts` transmissions, each with a fresh sequence number. In
//! differential mode a node whose reported table checksum already matches
//! is skipped.
//!
//! ## Quick Start
//!
//! ```ignore
//! use sdwsn_core::prelude::*;
//!
//! let mut ctrl = Controller::new(radio, None);
//! ctrl.report_link(LinkAddr::new(1, 0), LinkAddr::new(2, 0), -42)?;
//! ctrl.report_node_energy(LinkAddr::new(2, 0), 800, 1)?;
//!
//! loop {
//!     ctrl.tick();
//!     if let Some(frame) = radio_rx() {
//!         ctrl.on_packet(&frame).ok();
//!     }
//! }
//! ```
//!
//! ## Memory
//!
//! Every table is a fixed-capacity pool (`heapless`), so the core runs
//! without an allocator when built with `default-features = false`.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(missing_docs)]

// Core modules
pub mod types;
pub mod pool;
pub mod config;
pub mod hal;
pub mod registry;
pub mod links;
pub mod index;
pub mod edges;
pub mod resolver;
pub mod shortest_path;
pub mod max_energy;
pub mod dfs;
pub mod routes;
pub mod wire;
pub mod pending;
pub mod dissemination;
pub mod controller;

// Re-exports for convenience
pub use types::*;
pub use config::{ControllerConfig, ResolverKind};
pub use hal::Hal;
#[cfg(feature = "std")]
pub use hal::{MockHal, ScheduleEvent, SentPacket};
pub use registry::{Node, NodeRegistry, NodeReport, RegistryConfig, ReportOutcome, Sweep};
pub use links::{LinkObservation, LinkTable};
pub use index::{CostMatrix, NodeIndex, CONTROLLER_INDEX};
pub use edges::{Edge, EdgeSet};
pub use resolver::{CostResolver, Predecessors, ResolveOutcome, Resolver, RoundSnapshot};
pub use shortest_path::ShortestPath;
pub use max_energy::MaxResidualEnergyPath;
pub use dfs::PathResolver;
pub use routes::{ConfigRoute, ConfigRoutes, ForwardingTable, RoutePair};
pub use wire::{NcPacket, PacketType, RouteEntry};
pub use pending::PendingAcks;
pub use dissemination::{Dissemination, DisseminationConfig, DisseminationState, DisseminationStats, StepOutcome};
pub use controller::{Controller, ControllerStats, ControllerStatus, Phase, RoundTrigger};

/// Prelude - commonly used items
pub mod prelude {
    pub use crate::types::*;
    pub use crate::config::{ControllerConfig, ResolverKind};
    pub use crate::controller::{Controller, Phase};
    pub use crate::hal::Hal;
    pub use crate::registry::NodeReport;
    pub use crate::wire::NcPacket;
}

// ============================================================================
// Version
// ============================================================================

/// Major version
pub const VERSION_MAJOR: u32 = 0;
/// Minor version
pub const VERSION_MINOR: u32 = 1;
/// Patch version
pub const VERSION_PATCH: u32 = 0;
/// Version string
pub const VERSION_STRING: &str = "0.1.0";

/// Get version as packed integer (major << 16 | minor << 8 | patch)
pub const fn version() -> u32 {
    (VERSION_MAJOR << 16) | (VERSION_MINOR << 8) | VERSION_PATCH
}
