//! Edge Set
//!
//! Undirected forwarding-tree edges chosen by a cost resolver. An edge is a
//! decision, a [`LinkObservation`](crate::links::LinkObservation) is the
//! measurement backing it. New and re-confirmed edges move to the front, so
//! the back is always the least recently confirmed edge.

use crate::index::NodeIndex;
use crate::links::LinkTable;
use crate::pool::{Handle, Pool};
use crate::types::*;
use tracing::{debug, warn};

/// Forwarding-tree edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    /// First endpoint
    pub a: LinkAddr,
    /// Second endpoint
    pub b: LinkAddr,
}

impl Edge {
    /// True if this edge joins `x` and `y` in either direction
    pub fn joins(&self, x: LinkAddr, y: LinkAddr) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }

    /// True if either endpoint is `addr`
    pub fn touches(&self, addr: LinkAddr) -> bool {
        self.a == addr || self.b == addr
    }

    /// Endpoint opposite `addr`, if `addr` is one of them
    pub fn other(&self, addr: LinkAddr) -> Option<LinkAddr> {
        if self.a == addr {
            Some(self.b)
        } else if self.b == addr {
            Some(self.a)
        } else {
            None
        }
    }
}

/// Edge Set
pub struct EdgeSet {
    edges: Pool<Edge, MAX_EDGES>,
}

impl EdgeSet {
    /// Create an empty set
    pub const fn new() -> Self {
        Self { edges: Pool::new() }
    }

    fn handle_of(&self, a: LinkAddr, b: LinkAddr) -> Option<Handle> {
        self.edges.find(|e| e.joins(a, b))
    }

    /// Add an edge at the front. Returns true if it was not present.
    ///
    /// An existing edge is moved to the front instead.
    pub fn add(&mut self, a: LinkAddr, b: LinkAddr) -> Result<bool> {
        if a == b {
            return Err(Error::InvalidArg);
        }
        if let Some(handle) = self.handle_of(a, b) {
            self.edges.promote(handle);
            return Ok(false);
        }
        self.edges.insert_front(Edge { a, b }).ok_or_else(|| {
            warn!("Edges: no slot for {} - {}", a, b);
            Error::PoolFull(PoolKind::Edges)
        })?;
        debug!("Edges: added {} - {}", a, b);
        Ok(true)
    }

    /// Find an edge, moving it to the front
    pub fn lookup(&mut self, a: LinkAddr, b: LinkAddr) -> Option<&Edge> {
        let handle = self.handle_of(a, b)?;
        self.edges.promote(handle);
        self.edges.get(handle)
    }

    /// Membership check without reordering
    pub fn contains(&self, a: LinkAddr, b: LinkAddr) -> bool {
        self.handle_of(a, b).is_some()
    }

    /// Remove one edge
    pub fn remove(&mut self, a: LinkAddr, b: LinkAddr) -> bool {
        match self.handle_of(a, b) {
            Some(handle) => self.edges.remove(handle).is_some(),
            None => false,
        }
    }

    /// Remove every edge touching `addr`
    pub fn remove_addr(&mut self, addr: LinkAddr) -> usize {
        let removed = self.edges.retain(|e| !e.touches(addr));
        if removed > 0 {
            debug!("Edges: dropped {} touching {}", removed, addr);
        }
        removed
    }

    /// Remove edges with no backing link observation
    pub fn prune_unsupported(&mut self, links: &LinkTable) -> usize {
        self.edges.retain(|e| links.contains(e.a, e.b))
    }

    /// Remove edges touching a node outside the index
    pub fn prune_unindexed(&mut self, index: &NodeIndex) -> usize {
        self.edges.retain(|e| index.contains(e.a) && index.contains(e.b))
    }

    /// Evict least recently confirmed edges until at most `max` remain
    pub fn cap_to(&mut self, max: usize) -> usize {
        let mut evicted = 0;
        while self.edges.len() > max {
            let Some(handle) = self.edges.back() else {
                break;
            };
            if let Some(edge) = self.edges.remove(handle) {
                debug!("Edges: evicted {} - {}", edge.a, edge.b);
            }
            evicted += 1;
        }
        evicted
    }

    /// Neighbors of `addr` in the tree, front to back
    pub fn neighbors(&self, addr: LinkAddr) -> impl Iterator<Item = LinkAddr> + '_ {
        self.edges.values().filter_map(move |e| e.other(addr))
    }

    /// Iterate front to back
    pub fn iter(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values()
    }

    /// Number of edges
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// True if empty
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Remove every edge
    pub fn clear(&mut self) {
        self.edges.clear();
    }
}

impl Default for EdgeSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: LinkAddr = LinkAddr::new(1, 0);
    const B: LinkAddr = LinkAddr::new(2, 0);
    const C: LinkAddr = LinkAddr::new(3, 0);
    const D: LinkAddr = LinkAddr::new(4, 0);

    #[test]
    fn test_add_once() {
        let mut edges = EdgeSet::new();
        assert!(edges.add(A, B).unwrap());
        assert!(!edges.add(B, A).unwrap());
        assert_eq!(edges.len(), 1);
        assert_eq!(edges.add(A, A), Err(Error::InvalidArg));
    }

    #[test]
    fn test_cap_evicts_least_recent() {
        let mut edges = EdgeSet::new();
        edges.add(A, B).unwrap();
        edges.add(B, C).unwrap();
        edges.add(C, D).unwrap();
        // Re-confirm the oldest
        edges.add(A, B).unwrap();
        assert_eq!(edges.cap_to(2), 1);
        assert!(edges.contains(A, B));
        assert!(edges.contains(C, D));
        assert!(!edges.contains(B, C));
    }

    #[test]
    fn test_lookup_promotes() {
        let mut edges = EdgeSet::new();
        edges.add(A, B).unwrap();
        edges.add(B, C).unwrap();
        edges.lookup(B, A).unwrap();
        edges.cap_to(1);
        assert!(edges.contains(A, B));
    }

    #[test]
    fn test_remove_addr() {
        let mut edges = EdgeSet::new();
        edges.add(A, B).unwrap();
        edges.add(B, C).unwrap();
        edges.add(C, D).unwrap();
        assert_eq!(edges.remove_addr(B), 2);
        assert_eq!(edges.neighbors(C).collect::<heapless::Vec<_, 4>>().as_slice(), &[D]);
    }

    #[test]
    fn test_prune_unsupported() {
        let mut links = LinkTable::new(1_000);
        links.report(A, B, -50, 0).unwrap();
        let mut edges = EdgeSet::new();
        edges.add(A, B).unwrap();
        edges.add(B, C).unwrap();
        assert_eq!(edges.prune_unsupported(&links), 1);
        assert!(edges.contains(B, A));
    }

    #[test]
    fn test_pool_full() {
        let mut edges = EdgeSet::new();
        for i in 0..MAX_EDGES as u16 {
            edges.add(LinkAddr(1000 + i), LinkAddr(2000 + i)).unwrap();
        }
        assert_eq!(edges.add(A, B), Err(Error::PoolFull(PoolKind::Edges)));
    }
}
