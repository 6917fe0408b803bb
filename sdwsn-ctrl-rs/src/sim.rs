//! Simulated sensor mesh
//!
//! Every node keeps its own routing table, computes its rank by BFS over
//! the live links, advertises neighbors, energy and table checksum to the
//! controller, and answers configuration packets with acks. Frames travel
//! hop by hop using the installed tables; each hop may be lost.

use crate::radio::SimClock;
use crate::scenario::Scenario;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sdwsn_core::routes::reported_checksum;
use sdwsn_core::wire::PacketType;
use sdwsn_core::{Energy, LinkAddr, LinkQuality, NcPacket, NodeReport, Rank, TimeMs, RANK_UNREACHABLE};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info};

/// Controller to mesh
#[derive(Debug, Clone)]
pub struct Downlink {
    /// Final destination
    pub dest: LinkAddr,
    /// First hop chosen by the controller
    pub next_hop: LinkAddr,
    /// Encoded packet
    pub data: Vec<u8>,
}

/// Neighbor advertisement as received by the controller
#[derive(Debug, Clone)]
pub struct Advertisement {
    /// Advertising node
    pub addr: LinkAddr,
    /// Energy, rank and neighbor counts
    pub report: NodeReport,
    /// Neighbors heard, with RSSI
    pub neighbors: Vec<(LinkAddr, LinkQuality)>,
    /// Checksum of the installed table, once configured
    pub checksum: Option<u16>,
}

/// Mesh to controller
#[derive(Debug, Clone)]
pub enum Uplink {
    /// Periodic neighbor advertisement
    Advert(Advertisement),
    /// Raw packet addressed to the controller
    Frame(Vec<u8>),
}

/// Delivery counters
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshStats {
    /// Configuration packets installed
    pub installed: u32,
    /// Frames lost on a hop
    pub lost: u32,
    /// Frames with no way forward
    pub unroutable: u32,
}

#[derive(Debug, Clone)]
struct SimNode {
    addr: LinkAddr,
    energy: f64,
    drain_per_s: f64,
    rank: Rank,
    /// Installed (dest, via) pairs
    table: Vec<(LinkAddr, LinkAddr)>,
    configured: bool,
}

impl SimNode {
    fn is_alive(&self) -> bool {
        self.energy > 0.0
    }

    fn route(&self, dest: LinkAddr) -> Option<LinkAddr> {
        self.table.iter().find(|(d, _)| *d == dest).map(|&(_, via)| via)
    }
}

#[derive(Debug, Clone, Copy)]
struct SimLink {
    a: LinkAddr,
    b: LinkAddr,
    rssi: LinkQuality,
}

/// Simulated network below the controller
pub struct Mesh {
    controller: LinkAddr,
    nodes: Vec<SimNode>,
    links: Vec<SimLink>,
    loss_probability: f64,
    advertise_interval_ms: TimeMs,
    clock: SimClock,
    rng: SmallRng,
    last_drain: TimeMs,
    last_advert: Option<TimeMs>,
    stats: MeshStats,
}

impl Mesh {
    /// Build from a scenario
    pub fn new(scenario: &Scenario, clock: SimClock, seed: u64) -> Self {
        let nodes = scenario
            .nodes
            .iter()
            .map(|spec| SimNode {
                addr: spec.addr,
                energy: spec.energy,
                drain_per_s: spec.drain_per_s,
                rank: RANK_UNREACHABLE,
                table: Vec::new(),
                configured: false,
            })
            .collect();
        let links = scenario
            .links
            .iter()
            .map(|l| SimLink {
                a: l.a,
                b: l.b,
                rssi: l.rssi,
            })
            .collect();
        let mut mesh = Self {
            controller: scenario.controller.controller,
            nodes,
            links,
            loss_probability: scenario.loss_probability,
            advertise_interval_ms: scenario.advertise_interval_ms,
            last_drain: clock.now(),
            clock,
            rng: SmallRng::seed_from_u64(seed),
            last_advert: None,
            stats: MeshStats::default(),
        };
        mesh.compute_ranks();
        mesh
    }

    /// Delivery counters
    pub fn stats(&self) -> MeshStats {
        self.stats
    }

    fn node(&self, addr: LinkAddr) -> Option<&SimNode> {
        self.nodes.iter().find(|n| n.addr == addr)
    }

    fn node_mut(&mut self, addr: LinkAddr) -> Option<&mut SimNode> {
        self.nodes.iter_mut().find(|n| n.addr == addr)
    }

    fn is_up(&self, addr: LinkAddr) -> bool {
        addr == self.controller || self.node(addr).map_or(false, SimNode::is_alive)
    }

    /// Live neighbors of `addr` with RSSI
    fn neighbors(&self, addr: LinkAddr) -> Vec<(LinkAddr, LinkQuality)> {
        self.links
            .iter()
            .filter_map(|l| {
                let other = if l.a == addr {
                    l.b
                } else if l.b == addr {
                    l.a
                } else {
                    return None;
                };
                self.is_up(other).then_some((other, l.rssi))
            })
            .collect()
    }

    fn rank_of(&self, addr: LinkAddr) -> Rank {
        if addr == self.controller {
            return 0;
        }
        self.node(addr).map_or(RANK_UNREACHABLE, |n| n.rank)
    }

    /// Hop count from the controller over live links
    pub fn compute_ranks(&mut self) {
        for node in &mut self.nodes {
            node.rank = RANK_UNREACHABLE;
        }
        let mut queue = VecDeque::from([(self.controller, 0u8)]);
        while let Some((addr, rank)) = queue.pop_front() {
            for (neighbor, _) in self.neighbors(addr) {
                let next = rank.saturating_add(1);
                if let Some(node) = self.node_mut(neighbor) {
                    if node.rank == RANK_UNREACHABLE {
                        node.rank = next;
                        queue.push_back((neighbor, next));
                    }
                }
            }
        }
    }

    /// Periodic work: energy drain, ranks and due advertisements
    pub fn on_tick(&mut self) -> Vec<Uplink> {
        let now = self.clock.now();
        let elapsed_s = now.saturating_sub(self.last_drain) as f64 / 1_000.0;
        self.last_drain = now;
        for node in &mut self.nodes {
            let was_alive = node.is_alive();
            node.energy = (node.energy - node.drain_per_s * elapsed_s).max(0.0);
            if was_alive && !node.is_alive() {
                info!("Mesh: node {} ran out of energy", node.addr);
            }
        }
        self.compute_ranks();

        let due = self
            .last_advert
            .map_or(true, |last| now.saturating_sub(last) >= self.advertise_interval_ms);
        if !due {
            return Vec::new();
        }
        self.last_advert = Some(now);
        self.advertise()
    }

    /// One advertisement per reachable node, subject to loss
    pub fn advertise(&mut self) -> Vec<Uplink> {
        let mut out = Vec::new();
        for i in 0..self.nodes.len() {
            let node = &self.nodes[i];
            if !node.is_alive() || node.rank == RANK_UNREACHABLE {
                continue;
            }
            let addr = node.addr;
            let rank = node.rank;
            let energy = node.energy.min(Energy::MAX as f64) as Energy;
            let checksum = node
                .configured
                .then(|| reported_checksum(node.table.iter().copied()));

            let neighbors = self.neighbors(addr);
            let count = |wanted: Rank| {
                neighbors
                    .iter()
                    .filter(|(n, _)| self.rank_of(*n) == wanted)
                    .count()
                    .min(u8::MAX as usize) as u8
            };
            let report = NodeReport {
                energy,
                rank,
                prev_ranks: count(rank.saturating_sub(1)),
                next_ranks: count(rank.saturating_add(1)),
                total_neighbors: neighbors.len().min(u8::MAX as usize) as u8,
            };

            // Multi-hop delivery of the advertisement itself
            if !self.survives(rank as usize) {
                continue;
            }
            out.push(Uplink::Advert(Advertisement {
                addr,
                report,
                neighbors,
                checksum,
            }));
        }
        out
    }

    /// True if a frame crosses `hops` hops without loss
    fn survives(&mut self, hops: usize) -> bool {
        for _ in 0..hops {
            if self.rng.gen_bool(self.loss_probability) {
                self.stats.lost += 1;
                return false;
            }
        }
        true
    }

    /// Next hop from `at` toward `dest` using the node's table
    fn forward(&self, at: LinkAddr, dest: LinkAddr) -> Option<LinkAddr> {
        let neighbors = self.neighbors(at);
        if neighbors.iter().any(|(n, _)| *n == dest) {
            return Some(dest);
        }
        let via = self.node(at)?.route(dest)?;
        neighbors.iter().any(|(n, _)| *n == via).then_some(via)
    }

    /// Carry a controller packet to its target; returns the ack, if any
    pub fn deliver(&mut self, frame: Downlink) -> Option<Uplink> {
        if !self.neighbors(self.controller).iter().any(|(n, _)| *n == frame.next_hop) {
            debug!("Mesh: {} is not a controller neighbor", frame.next_hop);
            self.stats.unroutable += 1;
            return None;
        }

        let mut at = frame.next_hop;
        let mut hops = 1;
        while at != frame.dest {
            if hops > self.nodes.len() {
                self.stats.unroutable += 1;
                return None;
            }
            let Some(next) = self.forward(at, frame.dest) else {
                debug!("Mesh: {} has no route to {}", at, frame.dest);
                self.stats.unroutable += 1;
                return None;
            };
            at = next;
            hops += 1;
        }
        if !self.survives(hops) {
            return None;
        }

        let packet = match NcPacket::decode(&frame.data) {
            Ok(packet) if packet.kind == PacketType::Config => packet,
            Ok(_) | Err(_) => {
                debug!("Mesh: {} dropped an unusable frame", frame.dest);
                return None;
            }
        };
        let node = self.node_mut(frame.dest)?;
        node.table = packet.entries.iter().map(|e| (e.dest, e.via)).collect();
        node.configured = true;
        self.stats.installed += 1;
        debug!("Mesh: {} installed {} routes (seq {})", frame.dest, packet.entries.len(), packet.seq);

        // The ack climbs back along the node's uplink route
        let mut at = frame.dest;
        let mut hops = 0;
        while at != self.controller {
            if hops > self.nodes.len() {
                return None;
            }
            at = self.forward(at, self.controller)?;
            hops += 1;
        }
        if !self.survives(hops) {
            return None;
        }
        Some(Uplink::Frame(NcPacket::ack_for(packet.seq).encode().to_vec()))
    }
}

/// Mesh task: advertisements on every tick, frames as they arrive
pub async fn run(
    mut mesh: Mesh,
    mut downlink: mpsc::UnboundedReceiver<Downlink>,
    uplink: mpsc::UnboundedSender<Uplink>,
    tick: Duration,
) -> MeshStats {
    let mut ticker = interval(tick);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for msg in mesh.on_tick() {
                    if uplink.send(msg).is_err() {
                        return mesh.stats();
                    }
                }
            }
            frame = downlink.recv() => {
                let Some(frame) = frame else {
                    return mesh.stats();
                };
                if let Some(reply) = mesh.deliver(frame) {
                    if uplink.send(reply).is_err() {
                        return mesh.stats();
                    }
                }
            }
        }
    }
}
