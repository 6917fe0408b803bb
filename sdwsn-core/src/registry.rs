//! Node Registry
//!
//! Bounded table of per-node state fed by neighbor advertisements. The
//! controller is inserted as a synthetic node (rank 0, unlimited energy)
//! and never expires.
//!
//! Removal is two-stage. A node whose energy drops below the threshold or
//! whose timer expires is soft-deleted (not alive, rank unreachable) and its
//! timer restarts; if it stays silent until that timer expires too it is
//! removed. Sweeps are skipped while a computation round holds the graph.

use crate::config::ControllerConfig;
use crate::pool::{Handle, Pool};
use crate::types::*;
use heapless::Vec;
use tracing::{debug, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Registry configuration
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Lifetime without a report
    pub node_timeout_ms: TimeMs,
    /// Nodes reporting less are considered dead
    pub energy_threshold: Energy,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            node_timeout_ms: NODE_TIMEOUT_MS,
            energy_threshold: ENERGY_THRESHOLD,
        }
    }
}

impl From<&ControllerConfig> for RegistryConfig {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            node_timeout_ms: config.node_timeout_ms,
            energy_threshold: config.energy_threshold,
        }
    }
}

// ============================================================================
// Node
// ============================================================================

/// Per-node state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    /// Link address
    pub addr: LinkAddr,
    /// Residual energy estimate
    pub energy: Energy,
    /// Hop distance from the controller
    pub rank: Rank,
    /// Neighbors at rank - 1
    pub prev_ranks: u8,
    /// Neighbors at rank + 1
    pub next_ranks: u8,
    /// Total neighbors
    pub total_neighbors: u8,
    /// Reported and not yet soft-deleted
    pub alive: bool,
    /// Expiry deadline
    pub expires_at: TimeMs,
    /// Synthetic controller entry
    pub is_controller: bool,
}

impl Node {
    fn placeholder(addr: LinkAddr, expires_at: TimeMs) -> Self {
        Self {
            addr,
            energy: 0,
            rank: RANK_UNREACHABLE,
            prev_ranks: 0,
            next_ranks: 0,
            total_neighbors: 0,
            alive: false,
            expires_at,
            is_controller: false,
        }
    }

    /// Eligible for a dense index: alive with energy left
    pub fn is_live(&self) -> bool {
        self.alive && self.energy > 0
    }
}

/// Fields carried by one node advertisement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeReport {
    /// Residual energy
    pub energy: Energy,
    /// Reported rank
    pub rank: Rank,
    /// Neighbors at rank - 1
    pub prev_ranks: u8,
    /// Neighbors at rank + 1
    pub next_ranks: u8,
    /// Total neighbors
    pub total_neighbors: u8,
}

impl NodeReport {
    /// Report with only energy and rank
    pub fn new(energy: Energy, rank: Rank) -> Self {
        Self {
            energy,
            rank,
            ..Default::default()
        }
    }
}

/// What a report changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportOutcome {
    /// Node was not known before
    pub created: bool,
    /// Node went from not alive to alive
    pub revived: bool,
    /// Previous rank, if it differs from the reported one
    pub rank_changed: Option<Rank>,
}

impl ReportOutcome {
    /// True if the change affects tree construction
    pub fn topology_changed(&self) -> bool {
        self.created || self.revived || self.rank_changed.is_some()
    }
}

/// Nodes touched by one periodic sweep
#[derive(Debug, Clone, Default)]
pub struct Sweep {
    /// Soft-deleted this sweep
    pub soft_deleted: Vec<LinkAddr, MAX_NODES>,
    /// Removed this sweep
    pub removed: Vec<LinkAddr, MAX_NODES>,
}

impl Sweep {
    /// True if nothing changed
    pub fn is_empty(&self) -> bool {
        self.soft_deleted.is_empty() && self.removed.is_empty()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Node Registry
pub struct NodeRegistry {
    config: RegistryConfig,
    controller: LinkAddr,
    nodes: Pool<Node, MAX_NODES>,
}

impl NodeRegistry {
    /// Create a registry holding only the controller
    pub fn new(controller: LinkAddr, config: Option<RegistryConfig>) -> Self {
        let mut nodes = Pool::new();
        // Empty pool always has room
        let _ = nodes.insert_back(Node {
            addr: controller,
            energy: Energy::MAX,
            rank: RANK_CONTROLLER,
            prev_ranks: 0,
            next_ranks: 0,
            total_neighbors: 0,
            alive: true,
            expires_at: TimeMs::MAX,
            is_controller: true,
        });
        Self {
            config: config.unwrap_or_default(),
            controller,
            nodes,
        }
    }

    /// Controller address
    pub fn controller(&self) -> LinkAddr {
        self.controller
    }

    fn handle_of(&self, addr: LinkAddr) -> Option<Handle> {
        self.nodes.find(|n| n.addr == addr)
    }

    /// Look up by address
    pub fn lookup(&self, addr: LinkAddr) -> Option<&Node> {
        self.nodes.get(self.handle_of(addr)?)
    }

    /// True if the address is tracked
    pub fn contains(&self, addr: LinkAddr) -> bool {
        self.handle_of(addr).is_some()
    }

    /// Apply an advertisement, creating the node if needed
    pub fn report(&mut self, addr: LinkAddr, report: NodeReport, now: TimeMs) -> Result<ReportOutcome> {
        if addr == self.controller {
            return Ok(ReportOutcome {
                created: false,
                revived: false,
                rank_changed: None,
            });
        }

        let expires_at = now.saturating_add(self.config.node_timeout_ms);
        let (handle, created) = match self.handle_of(addr) {
            Some(handle) => (handle, false),
            None => {
                let handle = self
                    .nodes
                    .insert_back(Node::placeholder(addr, expires_at))
                    .ok_or_else(|| {
                        warn!("Registry: no slot for node {}", addr);
                        Error::PoolFull(PoolKind::Nodes)
                    })?;
                (handle, true)
            }
        };

        let node = self.nodes.get_mut(handle).ok_or(Error::NotFound)?;
        let revived = !created && !node.alive;
        let rank_changed = (node.rank != report.rank && !created).then_some(node.rank);

        node.energy = report.energy;
        node.rank = report.rank;
        node.prev_ranks = report.prev_ranks;
        node.next_ranks = report.next_ranks;
        node.total_neighbors = report.total_neighbors;
        node.alive = true;
        node.expires_at = expires_at;

        if created {
            info!("Registry: node {} joined (rank {}, energy {})", addr, report.rank, report.energy);
        } else if revived {
            info!("Registry: node {} is back (rank {})", addr, report.rank);
        } else {
            debug!("Registry: node {} refreshed (energy {})", addr, report.energy);
        }

        Ok(ReportOutcome {
            created,
            revived,
            rank_changed,
        })
    }

    /// Track an address seen only in a link report
    ///
    /// Returns true if a placeholder was created.
    pub fn ensure_placeholder(&mut self, addr: LinkAddr, now: TimeMs) -> Result<bool> {
        if self.contains(addr) {
            return Ok(false);
        }
        let expires_at = now.saturating_add(self.config.node_timeout_ms);
        self.nodes
            .insert_back(Node::placeholder(addr, expires_at))
            .ok_or(Error::PoolFull(PoolKind::Nodes))?;
        debug!("Registry: placeholder for {}", addr);
        Ok(true)
    }

    /// Mark a node dead and restart its timer
    pub fn soft_delete(&mut self, addr: LinkAddr, now: TimeMs) -> bool {
        let timeout = self.config.node_timeout_ms;
        let Some(handle) = self.handle_of(addr) else {
            return false;
        };
        match self.nodes.get_mut(handle) {
            Some(node) if !node.is_controller => {
                node.alive = false;
                node.rank = RANK_UNREACHABLE;
                node.expires_at = now.saturating_add(timeout);
                true
            }
            _ => false,
        }
    }

    /// Drop a node
    pub fn remove(&mut self, addr: LinkAddr) -> Option<Node> {
        if addr == self.controller {
            return None;
        }
        let handle = self.handle_of(addr)?;
        self.nodes.remove(handle)
    }

    /// Energy and timer sweep
    ///
    /// Does nothing while `computing` is set. The caller removes edges
    /// touching every node reported in the returned [`Sweep`].
    pub fn periodic(&mut self, now: TimeMs, computing: bool) -> Sweep {
        let mut sweep = Sweep::default();
        if computing {
            return sweep;
        }

        for handle in self.nodes.handles() {
            let Some(node) = self.nodes.get(handle).copied() else {
                continue;
            };
            if node.is_controller {
                continue;
            }

            if node.alive && node.energy < self.config.energy_threshold {
                info!("Registry: node {} below energy threshold ({})", node.addr, node.energy);
                self.soft_delete(node.addr, now);
                let _ = sweep.soft_deleted.push(node.addr);
            } else if now >= node.expires_at {
                if node.alive {
                    info!("Registry: node {} timed out", node.addr);
                    self.soft_delete(node.addr, now);
                    let _ = sweep.soft_deleted.push(node.addr);
                } else {
                    info!("Registry: node {} removed", node.addr);
                    self.nodes.remove(handle);
                    let _ = sweep.removed.push(node.addr);
                }
            }
        }
        sweep
    }

    /// Iterate in traversal order, controller first
    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.values()
    }

    /// Tracked entries, placeholders included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Never true: the controller is always present
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Live nodes, controller included
    pub fn live_count(&self) -> usize {
        self.iter().filter(|n| n.is_live()).count()
    }

    /// Highest rank among live nodes
    pub fn max_rank(&self) -> Rank {
        self.iter()
            .filter(|n| n.is_live())
            .map(|n| n.rank)
            .filter(|&r| r != RANK_UNREACHABLE)
            .max()
            .unwrap_or(RANK_CONTROLLER)
    }

    /// Sum of residual energy over live nodes, controller excluded
    pub fn total_energy(&self) -> i32 {
        self.iter()
            .filter(|n| n.is_live() && !n.is_controller)
            .map(|n| n.energy as i32)
            .sum()
    }

    /// Mean residual energy over live nodes, controller excluded
    pub fn energy_average(&self) -> Option<Energy> {
        let count = self.iter().filter(|n| n.is_live() && !n.is_controller).count();
        if count == 0 {
            return None;
        }
        Some((self.total_energy() / count as i32) as Energy)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const CTRL: LinkAddr = LinkAddr::new(1, 0);
    const A: LinkAddr = LinkAddr::new(2, 0);
    const B: LinkAddr = LinkAddr::new(3, 0);

    fn registry() -> NodeRegistry {
        NodeRegistry::new(
            CTRL,
            Some(RegistryConfig {
                node_timeout_ms: 1_000,
                energy_threshold: 150,
            }),
        )
    }

    #[test]
    fn test_controller_always_present() {
        let reg = registry();
        let ctrl = reg.lookup(CTRL).unwrap();
        assert!(ctrl.is_controller);
        assert_eq!(ctrl.rank, RANK_CONTROLLER);
        assert_eq!(reg.live_count(), 1);
    }

    #[test]
    fn test_report_creates_and_updates() {
        let mut reg = registry();
        let outcome = reg.report(A, NodeReport::new(500, 1), 0).unwrap();
        assert!(outcome.created);
        assert!(outcome.topology_changed());

        let outcome = reg.report(A, NodeReport::new(400, 2), 10).unwrap();
        assert!(!outcome.created);
        assert_eq!(outcome.rank_changed, Some(1));
        let node = reg.lookup(A).unwrap();
        assert_eq!(node.energy, 400);
        assert_eq!(node.expires_at, 1_010);
    }

    #[test]
    fn test_controller_report_ignored() {
        let mut reg = registry();
        let outcome = reg.report(CTRL, NodeReport::new(5, 3), 0).unwrap();
        assert!(!outcome.topology_changed());
        assert_eq!(reg.lookup(CTRL).unwrap().rank, RANK_CONTROLLER);
    }

    #[test]
    fn test_placeholder_not_live() {
        let mut reg = registry();
        assert!(reg.ensure_placeholder(A, 0).unwrap());
        assert!(!reg.ensure_placeholder(A, 0).unwrap());
        let node = reg.lookup(A).unwrap();
        assert!(!node.is_live());
        assert_eq!(node.rank, RANK_UNREACHABLE);
        assert_eq!(reg.live_count(), 1);
    }

    #[test]
    fn test_low_energy_soft_delete() {
        let mut reg = registry();
        reg.report(A, NodeReport::new(100, 1), 0).unwrap();
        let sweep = reg.periodic(10, false);
        assert_eq!(sweep.soft_deleted.as_slice(), &[A]);
        let node = reg.lookup(A).unwrap();
        assert!(!node.alive);
        assert_eq!(node.rank, RANK_UNREACHABLE);
    }

    #[test]
    fn test_two_stage_expiry() {
        let mut reg = registry();
        reg.report(A, NodeReport::new(500, 1), 0).unwrap();

        let sweep = reg.periodic(1_000, false);
        assert_eq!(sweep.soft_deleted.as_slice(), &[A]);
        assert!(reg.contains(A));

        assert!(reg.periodic(1_500, false).is_empty());

        let sweep = reg.periodic(2_000, false);
        assert_eq!(sweep.removed.as_slice(), &[A]);
        assert!(!reg.contains(A));
    }

    #[test]
    fn test_sweep_deferred_while_computing() {
        let mut reg = registry();
        reg.report(A, NodeReport::new(500, 1), 0).unwrap();
        assert!(reg.periodic(5_000, true).is_empty());
        assert!(reg.lookup(A).unwrap().alive);
        assert_eq!(reg.periodic(5_000, false).soft_deleted.len(), 1);
    }

    #[test]
    fn test_revive_after_soft_delete() {
        let mut reg = registry();
        reg.report(A, NodeReport::new(500, 1), 0).unwrap();
        reg.periodic(1_000, false);
        let outcome = reg.report(A, NodeReport::new(500, 1), 1_100).unwrap();
        assert!(outcome.revived);
        assert!(reg.lookup(A).unwrap().is_live());
    }

    #[test]
    fn test_energy_stats() {
        let mut reg = registry();
        reg.report(A, NodeReport::new(400, 1), 0).unwrap();
        reg.report(B, NodeReport::new(600, 2), 0).unwrap();
        assert_eq!(reg.total_energy(), 1_000);
        assert_eq!(reg.energy_average(), Some(500));
        assert_eq!(reg.max_rank(), 2);
        assert_eq!(reg.live_count(), 3);
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut reg = registry();
        for i in 0..(MAX_NODES - 1) {
            reg.report(LinkAddr(100 + i as u16), NodeReport::new(500, 1), 0).unwrap();
        }
        assert_eq!(
            reg.report(LinkAddr(999), NodeReport::new(500, 1), 0),
            Err(Error::PoolFull(PoolKind::Nodes))
        );
    }
}
