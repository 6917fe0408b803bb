//! Path Resolver
//!
//! Depth-first search over the Edge Set. Each query builds a throwaway
//! child/sibling tree rooted at the source: expanding a node scans the edge
//! set for edges touching it and attaches every endpoint not yet in the tree
//! as a child. The search descends into children in attachment order and
//! stops at the destination, returning the root's child on that branch.
//!
//! Queries only read the edge set, so repeating a query against an unchanged
//! set gives the same answer.

use crate::edges::EdgeSet;
use crate::types::*;
use heapless::Vec;
use tracing::warn;

const TREE_CAPACITY: usize = MAX_EDGES + 1;

#[derive(Debug, Clone, Copy)]
struct DfsTreeNode {
    addr: LinkAddr,
    child: Option<u8>,
    sibling: Option<u8>,
    visited: bool,
}

impl DfsTreeNode {
    fn new(addr: LinkAddr) -> Self {
        Self {
            addr,
            child: None,
            sibling: None,
            visited: false,
        }
    }
}

/// Next-hop lookup over the forwarding tree
#[derive(Default)]
pub struct PathResolver {
    tree: Vec<DfsTreeNode, TREE_CAPACITY>,
}

impl PathResolver {
    /// Create a resolver with an empty scratch tree
    pub fn new() -> Self {
        Self { tree: Vec::new() }
    }

    /// First hop from `source` toward `dest`
    ///
    /// `None` if they are disconnected in `edges` or equal.
    pub fn resolve(&mut self, edges: &EdgeSet, source: LinkAddr, dest: LinkAddr) -> Option<LinkAddr> {
        if source == dest {
            return None;
        }
        self.tree.clear();
        self.tree.push(DfsTreeNode::new(source)).ok()?;

        let root = 0;
        self.tree[root].visited = true;
        self.attach_children(edges, root);

        let mut child = self.tree[root].child;
        while let Some(c) = child {
            let c = c as usize;
            let node = self.tree[c];
            if node.addr == dest || (!node.visited && self.search(edges, c, dest)) {
                return Some(node.addr);
            }
            child = self.tree[c].sibling;
        }
        None
    }

    fn search(&mut self, edges: &EdgeSet, at: usize, dest: LinkAddr) -> bool {
        self.tree[at].visited = true;
        self.attach_children(edges, at);

        let mut child = self.tree[at].child;
        while let Some(c) = child {
            let c = c as usize;
            let node = self.tree[c];
            if node.addr == dest {
                return true;
            }
            if !node.visited && self.search(edges, c, dest) {
                return true;
            }
            child = self.tree[c].sibling;
        }
        false
    }

    fn in_tree(&self, addr: LinkAddr) -> bool {
        self.tree.iter().any(|n| n.addr == addr)
    }

    fn attach_children(&mut self, edges: &EdgeSet, at: usize) {
        let addr = self.tree[at].addr;
        let mut last: Option<usize> = None;

        for neighbor in edges.neighbors(addr) {
            if self.in_tree(neighbor) {
                continue;
            }
            let slot = self.tree.len();
            if self.tree.push(DfsTreeNode::new(neighbor)).is_err() {
                warn!("Paths: search tree full at {}", addr);
                return;
            }
            match last {
                Some(prev) => self.tree[prev].sibling = Some(slot as u8),
                None => self.tree[at].child = Some(slot as u8),
            }
            last = Some(slot);
        }
    }
}
