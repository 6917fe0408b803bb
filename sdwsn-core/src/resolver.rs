//! Cost resolvers
//!
//! A resolver turns one round's snapshot (dense index, cost matrix, node
//! registry) into a predecessor per index. The shared [`CostResolver::resolve`]
//! then installs the predecessor edges and finalizes the set:
//!
//! 1. add `(node, predecessor)` for every reachable non-controller node
//! 2. drop edges no longer backed by a link observation or an indexed node
//! 3. evict least recently confirmed edges while more than `N - 1` remain
//!
//! Strategies are chosen at runtime through [`Resolver`].

use crate::config::ResolverKind;
use crate::edges::EdgeSet;
use crate::hal::Hal;
use crate::index::{CostMatrix, NodeIndex, CONTROLLER_INDEX};
use crate::links::LinkTable;
use crate::max_energy::MaxResidualEnergyPath;
use crate::registry::NodeRegistry;
use crate::shortest_path::ShortestPath;
use crate::types::*;
use tracing::{debug, warn};

/// Predecessor index per dense index, `None` for the controller and
/// unreachable nodes
pub type Predecessors = [Option<usize>; MAX_VERTICES];

/// Read-only view of one computation round
pub struct RoundSnapshot<'a> {
    /// Dense index for this round
    pub index: &'a NodeIndex,
    /// Link qualities over `index`
    pub costs: &'a CostMatrix,
    /// Node state (rank, energy)
    pub registry: &'a NodeRegistry,
    /// Link observations backing the edges
    pub links: &'a LinkTable,
}

impl RoundSnapshot<'_> {
    /// Node count including the controller
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Rank of an index; the controller is rank 0
    pub fn rank(&self, i: usize) -> Rank {
        if i == CONTROLLER_INDEX {
            return RANK_CONTROLLER;
        }
        self.index
            .addr_of(i)
            .and_then(|addr| self.registry.lookup(addr))
            .map_or(RANK_UNREACHABLE, |n| n.rank)
    }

    /// Residual energy of an index; the controller is unlimited
    pub fn energy(&self, i: usize) -> Energy {
        if i == CONTROLLER_INDEX {
            return Energy::MAX;
        }
        self.index
            .addr_of(i)
            .and_then(|addr| self.registry.lookup(addr))
            .map_or(0, |n| n.energy)
    }

    /// May serve as a relaxation pivot
    pub fn is_eligible(&self, i: usize) -> bool {
        i == CONTROLLER_INDEX
            || self
                .index
                .addr_of(i)
                .and_then(|addr| self.registry.lookup(addr))
                .map_or(false, |n| n.is_live())
    }
}

/// What one resolve pass did to the edge set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolveOutcome {
    /// Edges newly added
    pub edges_added: usize,
    /// Edges the pool had no room for
    pub edges_rejected: usize,
    /// Edges dropped for lack of a backing observation or index
    pub edges_pruned: usize,
    /// Edges evicted by the `N - 1` cap
    pub edges_evicted: usize,
    /// Non-controller nodes with no predecessor
    pub unreachable: usize,
}

impl ResolveOutcome {
    /// No new edges: the tree was already in place
    pub fn converged(&self) -> bool {
        self.edges_added == 0
    }

    /// Any membership change
    pub fn changed(&self) -> bool {
        self.edges_added + self.edges_pruned + self.edges_evicted > 0
    }
}

/// Tree-building strategy
pub trait CostResolver {
    /// Strategy name for logs
    fn name(&self) -> &'static str;

    /// Predecessor of every reachable index, rooted at the controller
    fn predecessors(&self, snapshot: &RoundSnapshot<'_>) -> Predecessors;

    /// Install predecessor edges and finalize the edge set
    fn resolve<H: Hal>(&self, snapshot: &RoundSnapshot<'_>, edges: &mut EdgeSet, hal: &H) -> ResolveOutcome {
        let preds = self.predecessors(snapshot);
        let mut outcome = install(snapshot, &preds, edges, hal);
        let (pruned, evicted) = finalize(snapshot, edges);
        outcome.edges_pruned = pruned;
        outcome.edges_evicted = evicted;
        debug!(
            "Resolver: {} added {} pruned {} evicted {} unreachable {}",
            self.name(),
            outcome.edges_added,
            pruned,
            evicted,
            outcome.unreachable
        );
        outcome
    }
}

fn install<H: Hal>(
    snapshot: &RoundSnapshot<'_>,
    preds: &Predecessors,
    edges: &mut EdgeSet,
    hal: &H,
) -> ResolveOutcome {
    let mut outcome = ResolveOutcome::default();
    for (i, pred) in preds.iter().enumerate().take(snapshot.len()).skip(1) {
        let Some(p) = *pred else {
            outcome.unreachable += 1;
            continue;
        };
        let (Some(a), Some(b)) = (snapshot.index.addr_of(i), snapshot.index.addr_of(p)) else {
            continue;
        };
        match edges.add(a, b) {
            Ok(true) => {
                outcome.edges_added += 1;
                hal.on_edge_added(a, b);
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Resolver: edge {} - {} rejected: {}", a, b, e);
                outcome.edges_rejected += 1;
            }
        }
    }
    outcome
}

/// Prune unsupported edges then cap the set at `N - 1`
///
/// Returns `(pruned, evicted)`.
pub fn finalize(snapshot: &RoundSnapshot<'_>, edges: &mut EdgeSet) -> (usize, usize) {
    let pruned = edges.prune_unsupported(snapshot.links) + edges.prune_unindexed(snapshot.index);
    let evicted = edges.cap_to(snapshot.len().saturating_sub(1));
    (pruned, evicted)
}

// ============================================================================
// Runtime Selection
// ============================================================================

/// Strategy selected by configuration
#[derive(Debug, Clone, Copy)]
pub enum Resolver {
    /// Negated-RSSI Dijkstra
    ShortestPath(ShortestPath),
    /// Rank-layered bottleneck energy
    MaxResidualEnergy(MaxResidualEnergyPath),
}

impl Resolver {
    /// Build from a configuration value
    pub fn from_kind(kind: ResolverKind) -> Self {
        match kind {
            ResolverKind::ShortestPath => Resolver::ShortestPath(ShortestPath),
            ResolverKind::MaxResidualEnergy => Resolver::MaxResidualEnergy(MaxResidualEnergyPath),
        }
    }
}

impl CostResolver for Resolver {
    fn name(&self) -> &'static str {
        match self {
            Resolver::ShortestPath(r) => r.name(),
            Resolver::MaxResidualEnergy(r) => r.name(),
        }
    }

    fn predecessors(&self, snapshot: &RoundSnapshot<'_>) -> Predecessors {
        match self {
            Resolver::ShortestPath(r) => r.predecessors(snapshot),
            Resolver::MaxResidualEnergy(r) => r.predecessors(snapshot),
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::hal::{MockHal, ScheduleEvent};
    use crate::registry::NodeReport;

    const CTRL: LinkAddr = LinkAddr::new(1, 0);
    const A: LinkAddr = LinkAddr::new(2, 0);
    const B: LinkAddr = LinkAddr::new(3, 0);

    /// Resolver that always picks the controller
    struct Star;

    impl CostResolver for Star {
        fn name(&self) -> &'static str {
            "star"
        }

        fn predecessors(&self, snapshot: &RoundSnapshot<'_>) -> Predecessors {
            let mut preds = [None; MAX_VERTICES];
            for (i, pred) in preds.iter_mut().enumerate().take(snapshot.len()).skip(1) {
                if snapshot.costs.link(CONTROLLER_INDEX, i).is_some() {
                    *pred = Some(CONTROLLER_INDEX);
                }
            }
            preds
        }
    }

    fn setup() -> (NodeRegistry, LinkTable) {
        let mut registry = NodeRegistry::new(CTRL, None);
        registry.report(A, NodeReport::new(500, 1), 0).unwrap();
        registry.report(B, NodeReport::new(500, 1), 0).unwrap();
        let mut links = LinkTable::new(1_000);
        links.report(CTRL, A, -50, 0).unwrap();
        links.report(CTRL, B, -60, 0).unwrap();
        (registry, links)
    }

    #[test]
    fn test_install_fires_callback() {
        let (registry, links) = setup();
        let index = NodeIndex::build(&registry, MAX_VERTICES).unwrap();
        let costs = CostMatrix::from_links(&index, &links);
        let snapshot = RoundSnapshot {
            index: &index,
            costs: &costs,
            registry: &registry,
            links: &links,
        };
        let hal = MockHal::default();
        let mut edges = EdgeSet::new();

        let outcome = Star.resolve(&snapshot, &mut edges, &hal);
        assert_eq!(outcome.edges_added, 2);
        assert!(!outcome.converged());
        assert_eq!(hal.events()[0], ScheduleEvent::EdgeAdded(A, CTRL));

        let outcome = Star.resolve(&snapshot, &mut edges, &hal);
        assert!(outcome.converged());
        assert!(!outcome.changed());
    }

    #[test]
    fn test_finalize_prunes_and_caps() {
        let (registry, links) = setup();
        let index = NodeIndex::build(&registry, MAX_VERTICES).unwrap();
        let costs = CostMatrix::from_links(&index, &links);
        let snapshot = RoundSnapshot {
            index: &index,
            costs: &costs,
            registry: &registry,
            links: &links,
        };
        let mut edges = EdgeSet::new();
        // No observation backs A - B
        edges.add(A, B).unwrap();
        edges.add(CTRL, A).unwrap();
        edges.add(CTRL, B).unwrap();
        assert_eq!(finalize(&snapshot, &mut edges), (1, 0));
        assert_eq!(edges.len(), 2);
    }

    #[test]
    fn test_snapshot_accessors() {
        let (registry, links) = setup();
        let index = NodeIndex::build(&registry, MAX_VERTICES).unwrap();
        let costs = CostMatrix::from_links(&index, &links);
        let snapshot = RoundSnapshot {
            index: &index,
            costs: &costs,
            registry: &registry,
            links: &links,
        };
        assert_eq!(snapshot.rank(0), RANK_CONTROLLER);
        assert_eq!(snapshot.rank(1), 1);
        assert_eq!(snapshot.energy(0), Energy::MAX);
        assert!(snapshot.is_eligible(2));
    }
}
