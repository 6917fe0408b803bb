//! Node Index Compactor
//!
//! Maps the sparse set of live addresses to a dense range for the
//! matrix-based resolvers. Index 0 is always the controller; the remaining
//! indices follow registry traversal order. Rebuilt at the start of every
//! round and never kept past it.

use crate::links::LinkTable;
use crate::registry::NodeRegistry;
use crate::types::*;
use heapless::Vec;
use tracing::warn;

/// Dense index of the controller
pub const CONTROLLER_INDEX: usize = 0;

/// Round-scoped address to dense index mapping
#[derive(Debug, Clone)]
pub struct NodeIndex {
    addrs: Vec<LinkAddr, MAX_VERTICES>,
}

impl NodeIndex {
    /// Index the controller and every live node
    ///
    /// Fails if the live count (controller included) exceeds `capacity`.
    pub fn build(registry: &NodeRegistry, capacity: usize) -> Result<Self> {
        let capacity = capacity.min(MAX_VERTICES);
        let live = 1 + registry
            .iter()
            .filter(|n| !n.is_controller && n.is_live())
            .count();
        if live > capacity {
            warn!("Index: {} live nodes, capacity {}", live, capacity);
            return Err(Error::CapacityExceeded { live, capacity });
        }

        let mut addrs = Vec::new();
        addrs
            .push(registry.controller())
            .map_err(|_| Error::CapacityExceeded { live, capacity })?;
        for node in registry.iter().filter(|n| !n.is_controller && n.is_live()) {
            addrs
                .push(node.addr)
                .map_err(|_| Error::CapacityExceeded { live, capacity })?;
        }
        Ok(Self { addrs })
    }

    /// Dense index of an address
    pub fn index_of(&self, addr: LinkAddr) -> Option<usize> {
        self.addrs.iter().position(|&a| a == addr)
    }

    /// Address at a dense index
    pub fn addr_of(&self, index: usize) -> Option<LinkAddr> {
        self.addrs.get(index).copied()
    }

    /// True if the address has an index
    pub fn contains(&self, addr: LinkAddr) -> bool {
        self.index_of(addr).is_some()
    }

    /// Number of indexed nodes, controller included
    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    /// Never true once built
    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// Addresses in index order
    pub fn as_slice(&self) -> &[LinkAddr] {
        &self.addrs
    }
}

// ============================================================================
// Cost Matrix
// ============================================================================

/// Symmetric link-quality matrix over a [`NodeIndex`]
pub struct CostMatrix {
    n: usize,
    cells: [[Option<LinkQuality>; MAX_VERTICES]; MAX_VERTICES],
}

impl CostMatrix {
    /// Fill from link observations whose endpoints are both indexed
    pub fn from_links(index: &NodeIndex, links: &LinkTable) -> Self {
        let mut cells = [[None; MAX_VERTICES]; MAX_VERTICES];
        for link in links.iter() {
            if let (Some(i), Some(j)) = (index.index_of(link.a), index.index_of(link.b)) {
                cells[i][j] = Some(link.quality);
                cells[j][i] = Some(link.quality);
            }
        }
        Self { n: index.len(), cells }
    }

    /// Dimension
    pub fn len(&self) -> usize {
        self.n
    }

    /// True if no vertices
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Raw quality between two indices
    pub fn link(&self, i: usize, j: usize) -> Option<LinkQuality> {
        if i >= self.n || j >= self.n {
            return None;
        }
        self.cells[i][j]
    }

    /// Non-negative path weight: negated RSSI, at least 1
    pub fn weight(&self, i: usize, j: usize) -> Option<u32> {
        self.link(i, j).map(|q| (-(q as i32)).max(1) as u32)
    }
}
