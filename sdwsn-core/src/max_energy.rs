//! Rank-constrained maximum residual energy path
//!
//! Grows the tree layer by layer, rank 1 first. A node may only adopt a
//! predecessor exactly one rank closer to the controller that is linked to
//! it and already reached. Among those it picks the one whose path has the
//! highest bottleneck energy (the minimum residual energy along the path);
//! ties go to the lowest index. The node's own bottleneck is then the
//! smaller of that value and its own energy.
//!
//! Nodes whose reported rank leaves no linked predecessor in the layer above
//! stay unreachable for the round.

use crate::index::CONTROLLER_INDEX;
use crate::resolver::{CostResolver, Predecessors, RoundSnapshot};
use crate::types::*;

/// Bottleneck energy per index, `None` if unreachable
pub type Bottlenecks = [Option<i32>; MAX_VERTICES];

/// Rank-layered bottleneck-energy resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct MaxResidualEnergyPath;

impl MaxResidualEnergyPath {
    /// Bottlenecks and predecessors from the controller
    pub fn energy_paths(&self, snapshot: &RoundSnapshot<'_>) -> (Bottlenecks, Predecessors) {
        let n = snapshot.len();
        let mut best: Bottlenecks = [None; MAX_VERTICES];
        let mut pred: Predecessors = [None; MAX_VERTICES];
        if n == 0 {
            return (best, pred);
        }
        best[CONTROLLER_INDEX] = Some(i32::MAX);

        let max_rank = snapshot.registry.max_rank();
        for rank in 1..=max_rank {
            for v in 1..n {
                if snapshot.rank(v) != rank || !snapshot.is_eligible(v) {
                    continue;
                }

                let mut chosen: Option<(usize, i32)> = None;
                for u in 0..n {
                    if snapshot.rank(u) != rank - 1 || snapshot.costs.link(u, v).is_none() {
                        continue;
                    }
                    let Some(bottleneck) = best[u] else {
                        continue;
                    };
                    if chosen.map_or(true, |(_, b)| bottleneck > b) {
                        chosen = Some((u, bottleneck));
                    }
                }

                if let Some((u, bottleneck)) = chosen {
                    pred[v] = Some(u);
                    best[v] = Some(bottleneck.min(snapshot.energy(v) as i32));
                }
            }
        }
        (best, pred)
    }
}

impl CostResolver for MaxResidualEnergyPath {
    fn name(&self) -> &'static str {
        "max-residual-energy"
    }

    fn predecessors(&self, snapshot: &RoundSnapshot<'_>) -> Predecessors {
        self.energy_paths(snapshot).1
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::edges::EdgeSet;
    use crate::hal::MockHal;
    use crate::index::{CostMatrix, NodeIndex};
    use crate::links::LinkTable;
    use crate::registry::{NodeRegistry, NodeReport};

    const CTRL: LinkAddr = LinkAddr::new(1, 0);
    const A: LinkAddr = LinkAddr::new(2, 0);
    const B: LinkAddr = LinkAddr::new(3, 0);
    const C: LinkAddr = LinkAddr::new(4, 0);
    const D: LinkAddr = LinkAddr::new(5, 0);

    fn solve(
        nodes: &[(LinkAddr, Energy, Rank)],
        links: &[(LinkAddr, LinkAddr)],
    ) -> (Bottlenecks, Predecessors, NodeIndex, EdgeSet) {
        let mut registry = NodeRegistry::new(CTRL, None);
        for &(addr, energy, rank) in nodes {
            registry.report(addr, NodeReport::new(energy, rank), 0).unwrap();
        }
        let mut table = LinkTable::new(10_000);
        for &(x, y) in links {
            table.report(x, y, -60, 0).unwrap();
        }
        let index = NodeIndex::build(&registry, MAX_VERTICES).unwrap();
        let costs = CostMatrix::from_links(&index, &table);
        let snapshot = RoundSnapshot {
            index: &index,
            costs: &costs,
            registry: &registry,
            links: &table,
        };
        let (best, pred) = MaxResidualEnergyPath.energy_paths(&snapshot);
        let mut edges = EdgeSet::new();
        MaxResidualEnergyPath.resolve(&snapshot, &mut edges, &MockHal::default());
        (best, pred, index, edges)
    }

    #[test]
    fn test_prefers_energetic_parent() {
        // C can go through A (300) or B (900)
        let (best, pred, index, edges) = solve(
            &[(A, 300, 1), (B, 900, 1), (C, 800, 2)],
            &[(CTRL, A), (CTRL, B), (A, C), (B, C)],
        );
        let c = index.index_of(C).unwrap();
        assert_eq!(pred[c], index.index_of(B));
        assert_eq!(best[c], Some(800));
        assert!(edges.contains(B, C));
        assert!(!edges.contains(A, C));
    }

    #[test]
    fn test_bottleneck_propagates() {
        // D via C via A: min(300, 800, 700) = 300
        let (best, _, index, _) = solve(
            &[(A, 300, 1), (C, 800, 2), (D, 700, 3)],
            &[(CTRL, A), (A, C), (C, D)],
        );
        assert_eq!(best[index.index_of(D).unwrap()], Some(300));
    }

    #[test]
    fn test_rank_constraint() {
        // B claims rank 2 but only links to the controller
        let (_, pred, index, edges) = solve(&[(A, 500, 1), (B, 500, 2)], &[(CTRL, A), (CTRL, B)]);
        assert_eq!(pred[index.index_of(B).unwrap()], None);
        assert!(!edges.contains(CTRL, B));
    }

    #[test]
    fn test_tie_goes_to_lowest_index() {
        let (_, pred, index, _) = solve(
            &[(A, 500, 1), (B, 500, 1), (C, 400, 2)],
            &[(CTRL, A), (CTRL, B), (A, C), (B, C)],
        );
        assert_eq!(pred[index.index_of(C).unwrap()], index.index_of(A));
    }
}
