//! Negated-RSSI shortest path
//!
//! Single-source Dijkstra from the controller where the weight of a link is
//! its negated RSSI, so stronger links are cheaper. Pivot selection uses a
//! strict comparison and scans in index order: among equal distances the
//! lowest index wins. Unreachable and dead nodes never become pivots; the
//! controller always may.

use crate::index::CONTROLLER_INDEX;
use crate::resolver::{CostResolver, Predecessors, RoundSnapshot};
use crate::types::*;

/// Distance to each index, `u32::MAX` if unreachable
pub type Distances = [u32; MAX_VERTICES];

/// Negated-RSSI Dijkstra resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct ShortestPath;

impl ShortestPath {
    /// Distances and predecessors from the controller
    pub fn shortest_paths(&self, snapshot: &RoundSnapshot<'_>) -> (Distances, Predecessors) {
        let n = snapshot.len();
        let mut dist = [u32::MAX; MAX_VERTICES];
        let mut pred: Predecessors = [None; MAX_VERTICES];
        let mut settled = [false; MAX_VERTICES];

        if n == 0 {
            return (dist, pred);
        }
        dist[CONTROLLER_INDEX] = 0;

        for _ in 0..n {
            let mut pivot = None;
            let mut best = u32::MAX;
            for v in 0..n {
                if !settled[v] && dist[v] < best && snapshot.is_eligible(v) {
                    best = dist[v];
                    pivot = Some(v);
                }
            }
            let Some(u) = pivot else {
                break;
            };
            settled[u] = true;

            for v in 0..n {
                if settled[v] {
                    continue;
                }
                if let Some(w) = snapshot.costs.weight(u, v) {
                    let alt = dist[u].saturating_add(w);
                    if alt < dist[v] {
                        dist[v] = alt;
                        pred[v] = Some(u);
                    }
                }
            }
        }
        (dist, pred)
    }
}

impl CostResolver for ShortestPath {
    fn name(&self) -> &'static str {
        "shortest-path"
    }

    fn predecessors(&self, snapshot: &RoundSnapshot<'_>) -> Predecessors {
        self.shortest_paths(snapshot).1
    }
}
