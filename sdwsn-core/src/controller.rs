//! Controller
//!
//! Owns every table and drives a computation round one step per
//! [`Controller::tick`]:
//!
//! 1. `Resolve`: compact the index, run the cost resolver, finalize edges
//! 2. `Uplink`: one node per tick, routes from the node to the controller
//! 3. `Downlink`: one node per tick, routes from the controller to the node
//! 4. `Disseminate`: one protocol transition per tick
//!
//! The computing flag covers steps 1 to 3. While it is set, node and link
//! expiry is deferred so the graph stays consistent for the build.
//!
//! A round starts when the network changed and the minimum interval since
//! the previous round has passed, or when the refresh interval has passed.
//! A refresh that leaves the edge set untouched ends after `Resolve` unless
//! differential mode is on.

use crate::config::ControllerConfig;
use crate::dfs::PathResolver;
use crate::dissemination::{Dissemination, DisseminationConfig, StepOutcome};
use crate::edges::EdgeSet;
use crate::hal::Hal;
use crate::index::{CostMatrix, NodeIndex};
use crate::links::LinkTable;
use crate::registry::{NodeRegistry, NodeReport, RegistryConfig};
use crate::resolver::{CostResolver, Resolver, RoundSnapshot};
use crate::routes::{ConfigRoutes, ForwardingTable};
use crate::types::*;
use crate::wire::{NcPacket, PacketType};
use heapless::Vec;
use tracing::{debug, info, warn};

// ============================================================================
// Round State
// ============================================================================

/// Where the controller is within a round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Waiting for a trigger
    #[default]
    Idle,
    /// Next tick builds the index and runs the resolver
    Resolve,
    /// Building uplink routes, `cursor` into the round's node list
    Uplink {
        /// Next node to process
        cursor: usize,
    },
    /// Building downlink routes
    Downlink {
        /// Next node to process
        cursor: usize,
    },
    /// Delivering config batches
    Disseminate,
}

/// Why a round started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundTrigger {
    /// Nodes, links or edges changed
    TopologyChanged,
    /// Refresh interval elapsed
    Refresh,
}

/// Controller counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerStats {
    /// Rounds begun
    pub rounds_started: u32,
    /// Rounds that finished dissemination
    pub rounds_completed: u32,
    /// Refresh rounds that found nothing to do
    pub rounds_converged: u32,
    /// Rounds aborted by the index capacity
    pub rounds_aborted: u32,
    /// Edges added by resolvers
    pub edges_added: u32,
    /// Route insertions rejected by the aggregator
    pub routes_rejected: u32,
    /// Path queries with no answer
    pub no_route: u32,
    /// Nodes soft-deleted by sweeps
    pub nodes_soft_deleted: u32,
    /// Nodes removed by sweeps
    pub nodes_removed: u32,
    /// Inbound packets failing decode or checksum
    pub corrupt_packets: u32,
}

/// Controller status summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerStatus {
    /// Round phase
    pub phase: Phase,
    /// Computing flag
    pub computing: bool,
    /// Live nodes, controller included
    pub live_nodes: usize,
    /// Link observations
    pub links: usize,
    /// Edge set size
    pub edges: usize,
    /// Config-route pairs
    pub routes: usize,
    /// Ticks processed
    pub ticks_total: u32,
}

// ============================================================================
// Controller
// ============================================================================

/// SD-WSN controller
pub struct Controller<H: Hal> {
    config: ControllerConfig,
    hal: H,

    registry: NodeRegistry,
    links: LinkTable,
    edges: EdgeSet,
    routes: ConfigRoutes,
    forwarding: ForwardingTable,
    paths: PathResolver,
    resolver: Resolver,
    dissemination: Dissemination,

    phase: Phase,
    computing: bool,
    network_modified: bool,
    trigger: RoundTrigger,
    round_nodes: Vec<LinkAddr, MAX_VERTICES>,
    last_round_at: Option<TimeMs>,
    last_live_count: Option<u16>,
    slotframe_seq: u16,

    stats: ControllerStats,
    ticks_total: u32,
}

impl<H: Hal> Controller<H> {
    /// Create a controller
    pub fn new(hal: H, config: Option<ControllerConfig>) -> Self {
        let config = config.unwrap_or_default();
        let controller = config.controller;
        Self {
            registry: NodeRegistry::new(controller, Some(RegistryConfig::from(&config))),
            links: LinkTable::new(config.link_timeout_ms),
            edges: EdgeSet::new(),
            routes: ConfigRoutes::new(controller),
            forwarding: ForwardingTable::new(),
            paths: PathResolver::new(),
            resolver: Resolver::from_kind(config.resolver),
            dissemination: Dissemination::new(Some(DisseminationConfig::from(&config))),
            phase: Phase::Idle,
            computing: false,
            network_modified: false,
            trigger: RoundTrigger::TopologyChanged,
            round_nodes: Vec::new(),
            last_round_at: None,
            last_live_count: None,
            slotframe_seq: 0,
            stats: ControllerStats::default(),
            ticks_total: 0,
            config,
            hal,
        }
    }

    // ========================================================================
    // Topology Input
    // ========================================================================

    /// A neighbor advertisement reported a link
    pub fn report_link(&mut self, source: LinkAddr, dest: LinkAddr, quality: LinkQuality) -> Result<()> {
        let now = self.hal.time_ms();
        let created = self.links.report(source, dest, quality, now)?;
        if created {
            for addr in [source, dest] {
                if addr == self.config.controller {
                    continue;
                }
                if let Err(e) = self.registry.ensure_placeholder(addr, now) {
                    warn!("Controller: cannot track {}: {}", addr, e);
                }
            }
            self.network_modified = true;
        }
        Ok(())
    }

    /// A neighbor advertisement reported energy and rank
    pub fn report_node_energy(&mut self, addr: LinkAddr, energy: Energy, rank: Rank) -> Result<()> {
        self.report_node(addr, NodeReport::new(energy, rank))
    }

    /// A neighbor advertisement with neighbor counts
    pub fn report_node(&mut self, addr: LinkAddr, report: NodeReport) -> Result<()> {
        let now = self.hal.time_ms();
        let outcome = self.registry.report(addr, report, now)?;
        if outcome.rank_changed.is_some() {
            self.hal.on_rank_changed(addr, report.rank);
        }
        if outcome.topology_changed() {
            self.network_modified = true;
        }
        Ok(())
    }

    /// A node reported the checksum of its installed routing table
    pub fn report_table_checksum(&mut self, addr: LinkAddr, checksum: u16) -> Result<()> {
        self.routes.record_checksum(addr, checksum)
    }

    /// Inbound packet addressed to the controller
    ///
    /// Acks for sequence numbers not pending are ignored.
    pub fn on_packet(&mut self, bytes: &[u8]) -> Result<()> {
        let packet = NcPacket::decode(bytes).map_err(|e| {
            debug!("Controller: dropped packet: {}", e);
            self.stats.corrupt_packets += 1;
            e
        })?;
        match packet.kind {
            PacketType::ConfigAck => match self.dissemination.on_ack(packet.acknowledged_seq()) {
                Err(Error::StaleAck) => Ok(()),
                other => other,
            },
            PacketType::Config => Err(Error::InvalidArg),
        }
    }

    // ========================================================================
    // Main Loop
    // ========================================================================

    /// Advance housekeeping and the current round by one step
    pub fn tick(&mut self) -> Phase {
        let now = self.hal.time_ms();
        self.ticks_total = self.ticks_total.wrapping_add(1);

        // 1. Node expiry (deferred while computing)
        self.sweep_nodes(now);

        // 2. Link expiry (deferred while computing)
        if !self.computing && self.links.periodic(now) > 0 {
            self.network_modified = true;
        }

        // 3. Round progress
        match self.phase {
            Phase::Idle => {
                if let Some(trigger) = self.round_due(now) {
                    self.begin_round(trigger, now);
                }
            }
            Phase::Resolve => self.resolve_step(),
            Phase::Uplink { cursor } => match self.round_nodes.get(cursor).copied() {
                Some(node) => {
                    self.build_uplink(node);
                    self.phase = Phase::Uplink { cursor: cursor + 1 };
                }
                None => self.phase = Phase::Downlink { cursor: 0 },
            },
            Phase::Downlink { cursor } => match self.round_nodes.get(cursor).copied() {
                Some(node) => {
                    self.build_downlink(node);
                    self.phase = Phase::Downlink { cursor: cursor + 1 };
                }
                None => self.end_build(),
            },
            Phase::Disseminate => {
                let outcome = self
                    .dissemination
                    .step(&mut self.routes, &self.forwarding, &self.hal, now);
                if outcome == StepOutcome::Finished {
                    self.stats.rounds_completed += 1;
                    self.phase = Phase::Idle;
                    info!("Controller: round {} complete", self.stats.rounds_started);
                }
            }
        }
        self.phase
    }

    fn sweep_nodes(&mut self, now: TimeMs) {
        let sweep = self.registry.periodic(now, self.computing);
        for &addr in &sweep.soft_deleted {
            self.edges.remove_addr(addr);
            self.routes.remove_dest(addr);
            self.stats.nodes_soft_deleted += 1;
        }
        for &addr in &sweep.removed {
            self.edges.remove_addr(addr);
            self.links.remove_addr(addr);
            self.routes.remove_source(addr);
            self.routes.remove_dest(addr);
            self.forwarding.remove(addr);
            self.stats.nodes_removed += 1;
        }
        if !sweep.is_empty() {
            self.network_modified = true;
        }
    }

    fn round_due(&self, now: TimeMs) -> Option<RoundTrigger> {
        let Some(last) = self.last_round_at else {
            return self.network_modified.then_some(RoundTrigger::TopologyChanged);
        };
        let elapsed = now.saturating_sub(last);
        if self.network_modified && elapsed >= self.config.min_round_interval_ms {
            Some(RoundTrigger::TopologyChanged)
        } else if elapsed >= self.config.refresh_interval_ms {
            Some(RoundTrigger::Refresh)
        } else {
            None
        }
    }

    fn begin_round(&mut self, trigger: RoundTrigger, now: TimeMs) {
        self.stats.rounds_started += 1;
        self.last_round_at = Some(now);
        self.trigger = trigger;
        self.network_modified = false;
        self.computing = true;
        self.phase = Phase::Resolve;
        info!("Controller: round {} started ({:?})", self.stats.rounds_started, trigger);
    }

    fn resolve_step(&mut self) {
        let index = match NodeIndex::build(&self.registry, self.config.vertex_capacity()) {
            Ok(index) => index,
            Err(e) => {
                warn!("Controller: round aborted: {}", e);
                self.stats.rounds_aborted += 1;
                // Retry after the minimum interval
                self.network_modified = true;
                self.computing = false;
                self.phase = Phase::Idle;
                return;
            }
        };

        let costs = CostMatrix::from_links(&index, &self.links);
        let snapshot = RoundSnapshot {
            index: &index,
            costs: &costs,
            registry: &self.registry,
            links: &self.links,
        };
        let outcome = self.resolver.resolve(&snapshot, &mut self.edges, &self.hal);
        self.stats.edges_added += outcome.edges_added as u32;

        if self.trigger == RoundTrigger::Refresh && !outcome.changed() && !self.config.differential {
            debug!("Controller: tree unchanged, nothing to disseminate");
            self.stats.rounds_converged += 1;
            self.computing = false;
            self.phase = Phase::Idle;
            return;
        }

        self.round_nodes.clear();
        for &addr in index.as_slice().iter().skip(1) {
            // Same capacity as the index
            let _ = self.round_nodes.push(addr);
        }

        if self.config.differential {
            self.routes.clear_current();
        } else {
            self.routes.flush();
        }
        self.forwarding.clear();
        self.phase = Phase::Uplink { cursor: 0 };
    }

    fn install(&mut self, source: LinkAddr, dest: LinkAddr, via: LinkAddr) {
        if dest == via && dest != self.config.controller {
            return;
        }
        if let Err(e) = self.routes.add_route(source, dest, via) {
            warn!("Controller: route {} -> {} via {} rejected: {}", source, dest, via, e);
            self.stats.routes_rejected += 1;
        }
    }

    fn build_uplink(&mut self, node: LinkAddr) {
        let controller = self.config.controller;
        let mut current = node;
        for _ in 0..=self.round_nodes.len() {
            let Some(next) = self.paths.resolve(&self.edges, current, controller) else {
                debug!("Controller: no uplink from {}", current);
                self.stats.no_route += 1;
                return;
            };
            self.install(current, controller, next);
            if next == controller {
                return;
            }
            current = next;
        }
    }

    fn build_downlink(&mut self, node: LinkAddr) {
        let controller = self.config.controller;
        let mut current = controller;
        let mut depth: u8 = 0;
        for _ in 0..=self.round_nodes.len() {
            let Some(next) = self.paths.resolve(&self.edges, current, node) else {
                debug!("Controller: no downlink to {}", node);
                self.stats.no_route += 1;
                return;
            };
            if current == controller {
                if let Err(e) = self.forwarding.insert(node, next) {
                    warn!("Controller: no forwarding slot for {}: {}", node, e);
                }
            } else {
                self.install(current, node, next);
            }
            depth = depth.saturating_add(1);
            if next == node {
                if self.routes.set_depth(node, depth).is_err() {
                    debug!("Controller: {} has no routes to order", node);
                }
                return;
            }
            current = next;
        }
    }

    fn end_build(&mut self) {
        self.computing = false;

        let live = (self.round_nodes.len() + 1) as u16;
        if self.last_live_count != Some(live) {
            self.last_live_count = Some(live);
            self.slotframe_seq = self.slotframe_seq.wrapping_add(1);
            let size = live.max(self.config.min_slotframe_size);
            self.hal.on_slotframe_size_changed(size, self.slotframe_seq);
        }

        info!(
            "Controller: built {} routes for {} nodes",
            self.routes.num_routes(),
            self.round_nodes.len()
        );
        self.routes.clear_acked();
        self.dissemination.start();
        self.phase = Phase::Disseminate;
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Next hop from `source` toward `dest` over the current edge set
    pub fn resolve_path(&mut self, source: LinkAddr, dest: LinkAddr) -> Option<LinkAddr> {
        self.paths.resolve(&self.edges, source, dest)
    }

    /// Status summary
    pub fn status(&self) -> ControllerStatus {
        ControllerStatus {
            phase: self.phase,
            computing: self.computing,
            live_nodes: self.registry.live_count(),
            links: self.links.len(),
            edges: self.edges.len(),
            routes: self.routes.num_routes(),
            ticks_total: self.ticks_total,
        }
    }

    /// Round phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True while the topology build holds the graph
    pub fn is_computing(&self) -> bool {
        self.computing
    }

    /// True if a change is waiting for the next round
    pub fn is_network_modified(&self) -> bool {
        self.network_modified
    }

    /// Counters
    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    /// Configuration
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// HAL
    pub fn hal(&self) -> &H {
        &self.hal
    }

    /// Node registry
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Link observations
    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Forwarding-tree edges
    pub fn edges(&self) -> &EdgeSet {
        &self.edges
    }

    /// Config routes
    pub fn routes(&self) -> &ConfigRoutes {
        &self.routes
    }

    /// Controller's own first hops
    pub fn forwarding(&self) -> &ForwardingTable {
        &self.forwarding
    }

    /// Dissemination state machine
    pub fn dissemination(&self) -> &Dissemination {
        &self.dissemination
    }
}
