//! Property tests for the cost resolvers and the edge set
//!
//! Tree invariants after a resolve pass on random meshes:
//! - Size bound: at most `N - 1` edges for `N` indexed nodes
//! - Liveness: no edge touches a node that is not live
//! - Backing: every edge has a link observation
//! - Rooted: every node on an edge reaches the controller
//! - Convergence: a second pass on unchanged input adds nothing

use proptest::prelude::*;
use sdwsn_core::*;
use std::collections::VecDeque;

const CTRL: LinkAddr = LinkAddr::new(1, 0);

// ============================================================================
// Strategies
// ============================================================================

/// Vertex `n` is the controller, `0..n` are sensor nodes
fn vertex(i: usize, n: usize) -> LinkAddr {
    if i == n {
        CTRL
    } else {
        LinkAddr::new(i as u8 + 2, 0)
    }
}

/// Node energies (some below the threshold) and links with RSSI
fn arb_mesh() -> impl Strategy<Value = (Vec<Energy>, Vec<(usize, usize, LinkQuality)>)> {
    (2usize..12).prop_flat_map(|n| {
        (
            proptest::collection::vec(50i16..1000, n),
            proptest::collection::vec((0..=n, 0..=n, -95i16..-20), 1..(3 * n)),
        )
    })
}

fn arb_resolver() -> impl Strategy<Value = ResolverKind> {
    prop_oneof![
        Just(ResolverKind::ShortestPath),
        Just(ResolverKind::MaxResidualEnergy),
    ]
}

// ============================================================================
// Helpers
// ============================================================================

/// BFS hop count from the controller over all links
fn ranks(n: usize, links: &[(usize, usize, LinkQuality)]) -> Vec<Rank> {
    let mut rank = vec![RANK_UNREACHABLE; n + 1];
    rank[n] = RANK_CONTROLLER;
    let mut queue = VecDeque::from([n]);
    while let Some(v) = queue.pop_front() {
        for &(x, y, _) in links {
            let other = if x == v {
                y
            } else if y == v {
                x
            } else {
                continue;
            };
            if rank[other] == RANK_UNREACHABLE {
                rank[other] = rank[v] + 1;
                queue.push_back(other);
            }
        }
    }
    rank
}

fn build(energies: &[Energy], raw: &[(usize, usize, LinkQuality)]) -> (NodeRegistry, LinkTable) {
    let n = energies.len();
    let mut links = LinkTable::new(LINK_TIMEOUT_MS);
    for &(x, y, q) in raw {
        if x != y {
            links.report(vertex(x, n), vertex(y, n), q, 0).unwrap();
        }
    }
    let rank = ranks(n, raw);
    let mut registry = NodeRegistry::new(CTRL, None);
    for (i, &energy) in energies.iter().enumerate() {
        registry
            .report(vertex(i, n), NodeReport::new(energy, rank[i]), 0)
            .unwrap();
    }
    // Soft-delete nodes under the energy threshold
    registry.periodic(0, false);
    (registry, links)
}

fn resolve(
    kind: ResolverKind,
    registry: &NodeRegistry,
    links: &LinkTable,
    edges: &mut EdgeSet,
) -> (NodeIndex, ResolveOutcome) {
    let index = NodeIndex::build(registry, MAX_VERTICES).unwrap();
    let outcome = {
        let costs = CostMatrix::from_links(&index, links);
        let snapshot = RoundSnapshot {
            index: &index,
            costs: &costs,
            registry,
            links,
        };
        Resolver::from_kind(kind).resolve(&snapshot, edges, &MockHal::default())
    };
    (index, outcome)
}

// ============================================================================
// Tree Property Tests
// ============================================================================

proptest! {
    /// CORE INVARIANT: never more than N - 1 edges
    #[test]
    fn edge_count_bounded((energies, raw) in arb_mesh(), kind in arb_resolver()) {
        let (registry, links) = build(&energies, &raw);
        let mut edges = EdgeSet::new();
        let (index, _) = resolve(kind, &registry, &links, &mut edges);
        prop_assert!(
            edges.len() <= index.len() - 1,
            "{} edges for {} indexed nodes",
            edges.len(), index.len()
        );
    }

    /// Edges only join live, indexed nodes over observed links
    #[test]
    fn edges_join_live_linked_nodes((energies, raw) in arb_mesh(), kind in arb_resolver()) {
        let (registry, links) = build(&energies, &raw);
        let mut edges = EdgeSet::new();
        let (index, _) = resolve(kind, &registry, &links, &mut edges);

        for edge in edges.iter() {
            prop_assert!(index.contains(edge.a) && index.contains(edge.b));
            prop_assert!(links.contains(edge.a, edge.b));
        }
        for node in registry.iter().filter(|n| !n.is_live()) {
            prop_assert!(edges.iter().all(|e| !e.touches(node.addr)), "dead {} has an edge", node.addr);
        }
    }

    /// Every node on the tree has a path to the controller
    #[test]
    fn tree_is_rooted((energies, raw) in arb_mesh(), kind in arb_resolver()) {
        let (registry, links) = build(&energies, &raw);
        let mut edges = EdgeSet::new();
        resolve(kind, &registry, &links, &mut edges);

        let mut paths = PathResolver::new();
        let members: Vec<LinkAddr> = edges.iter().flat_map(|e| [e.a, e.b]).collect();
        for addr in members.into_iter().filter(|&a| a != CTRL) {
            prop_assert!(paths.resolve(&edges, addr, CTRL).is_some(), "{} is cut off", addr);
        }
    }

    /// Resolving the same snapshot twice adds nothing the second time
    #[test]
    fn second_pass_converges((energies, raw) in arb_mesh(), kind in arb_resolver()) {
        let (registry, links) = build(&energies, &raw);
        let mut edges = EdgeSet::new();
        resolve(kind, &registry, &links, &mut edges);
        let before = edges.len();

        let (_, outcome) = resolve(kind, &registry, &links, &mut edges);
        prop_assert!(outcome.converged());
        prop_assert_eq!(edges.len(), before);
    }
}

// ============================================================================
// Edge Set Property Tests
// ============================================================================

proptest! {
    /// The cap evicts from the least-recently-used end
    #[test]
    fn cap_keeps_most_recent(count in 2usize..20, max in 1usize..10) {
        let mut edges = EdgeSet::new();
        for i in 0..count {
            edges.add(LinkAddr(i as u16), LinkAddr(1000 + i as u16)).unwrap();
        }
        edges.cap_to(max);
        prop_assert_eq!(edges.len(), count.min(max));
        // Newest edges sit at the front
        for i in count.saturating_sub(max)..count {
            prop_assert!(edges.contains(LinkAddr(i as u16), LinkAddr(1000 + i as u16)));
        }
    }

    /// Self-edges are rejected
    #[test]
    fn no_self_edges(raw in any::<u16>()) {
        let mut edges = EdgeSet::new();
        prop_assert_eq!(edges.add(LinkAddr(raw), LinkAddr(raw)), Err(Error::InvalidArg));
        prop_assert!(edges.is_empty());
    }
}
