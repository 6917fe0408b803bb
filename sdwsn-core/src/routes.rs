//! Config Route Aggregator
//!
//! Per-source batches of `(destination, via)` pairs, built from path
//! queries and handed to dissemination one source at a time. Pairs replace
//! by destination. Each source has a network depth (hops from the
//! controller) so sources closer to the controller are configured first.
//!
//! In differential mode every pair carries a "current this round" flag and
//! the aggregator remembers the table checksum each node last reported,
//! kept apart from the records so a report never creates one. The
//! checksum is the ones'-complement sum over big-endian `(dest, via)` words;
//! a node reports the complement of its own sum, so a table that matches
//! folds with the report to `0xFFFF`.

use crate::pool::{Handle, Pool};
use crate::types::*;
use crate::wire::{checksum_fold, ones_complement_add, RouteEntry};
use heapless::{LinearMap, Vec};
use tracing::{debug, warn};

/// Depth of a source never reached by a downlink path
pub const DEPTH_UNKNOWN: u8 = u8::MAX;

/// One forwarding instruction for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePair {
    /// Destination
    pub dest: LinkAddr,
    /// Next hop
    pub via: LinkAddr,
    /// Set by this round's build
    pub current: bool,
}

/// Per-source route record
#[derive(Debug, Clone)]
pub struct ConfigRoute {
    /// Node the pairs are installed on
    pub source: LinkAddr,
    pairs: Vec<RoutePair, MAX_PAIRS_PER_SOURCE>,
    /// Hops from the controller
    pub depth: u8,
    /// Disseminated (or given up on) this round
    pub acked: bool,
}

impl ConfigRoute {
    fn new(source: LinkAddr) -> Self {
        Self {
            source,
            pairs: Vec::new(),
            depth: DEPTH_UNKNOWN,
            acked: false,
        }
    }

    /// Pairs in insertion order
    pub fn pairs(&self) -> &[RoutePair] {
        &self.pairs
    }

    /// Pairs as wire entries
    pub fn entries(&self) -> impl Iterator<Item = RouteEntry> + '_ {
        self.pairs.iter().map(|p| RouteEntry {
            via: p.via,
            dest: p.dest,
        })
    }

    /// Ones'-complement sum over the pairs
    pub fn table_checksum(&self) -> u16 {
        table_sum(self.pairs.iter().map(|p| (p.dest, p.via)))
    }

    /// True if `reported` confirms the local pairs
    pub fn checksum_matches(&self, reported: u16) -> bool {
        ones_complement_add(self.table_checksum(), reported) == 0xFFFF
    }
}

/// Ones'-complement sum over `(dest, via)` tuples
pub fn table_sum<I>(pairs: I) -> u16
where
    I: IntoIterator<Item = (LinkAddr, LinkAddr)>,
{
    pairs.into_iter().fold(0, |sum, (dest, via)| {
        let [d0, d1] = dest.to_be_bytes();
        let [v0, v1] = via.to_be_bytes();
        checksum_fold(sum, &[d0, d1, v0, v1])
    })
}

/// Checksum a node reports for its installed table
pub fn reported_checksum<I>(pairs: I) -> u16
where
    I: IntoIterator<Item = (LinkAddr, LinkAddr)>,
{
    !table_sum(pairs)
}

// ============================================================================
// Aggregator
// ============================================================================

/// Config Route Aggregator
pub struct ConfigRoutes {
    controller: LinkAddr,
    records: Pool<ConfigRoute, MAX_ROUTE_SOURCES>,
    reported: LinearMap<LinkAddr, u16, MAX_NODES>,
}

impl ConfigRoutes {
    /// Create an empty aggregator
    pub fn new(controller: LinkAddr) -> Self {
        Self {
            controller,
            records: Pool::new(),
            reported: LinearMap::new(),
        }
    }

    fn handle_of(&self, source: LinkAddr) -> Option<Handle> {
        self.records.find(|r| r.source == source)
    }

    fn get_or_create(&mut self, source: LinkAddr) -> Result<Handle> {
        if let Some(handle) = self.handle_of(source) {
            return Ok(handle);
        }
        self.records.insert_back(ConfigRoute::new(source)).ok_or_else(|| {
            warn!("Routes: no record slot for {}", source);
            Error::PoolFull(PoolKind::RouteSources)
        })
    }

    /// Insert or replace the pair for `dest` under `source`
    ///
    /// A destination equal to its via is implicit (a direct neighbor) and
    /// rejected, except for routes toward the controller.
    pub fn add_route(&mut self, source: LinkAddr, dest: LinkAddr, via: LinkAddr) -> Result<()> {
        if source == dest || (dest == via && dest != self.controller) {
            return Err(Error::InvalidArg);
        }

        if let Some(handle) = self.handle_of(source) {
            let record = self.records.get_mut(handle).ok_or(Error::NotFound)?;
            if let Some(pair) = record.pairs.iter_mut().find(|p| p.dest == dest) {
                pair.via = via;
                pair.current = true;
                return Ok(());
            }
            if record.pairs.is_full() {
                warn!("Routes: {} has no room for {} via {}", source, dest, via);
                return Err(Error::RouteListFull);
            }
        }

        let handle = self.get_or_create(source)?;
        let record = self.records.get_mut(handle).ok_or(Error::NotFound)?;
        record
            .pairs
            .push(RoutePair {
                dest,
                via,
                current: true,
            })
            .map_err(|_| Error::RouteListFull)?;
        debug!("Routes: {} -> {} via {}", source, dest, via);
        Ok(())
    }

    /// Source with the lowest depth not yet acknowledged this round
    ///
    /// Sources with no pairs are skipped. Ties go to the earliest record.
    pub fn select_next_undisseminated(&self) -> Option<LinkAddr> {
        let mut chosen: Option<&ConfigRoute> = None;
        for record in self.records.values() {
            if record.acked || record.pairs.is_empty() {
                continue;
            }
            if chosen.map_or(true, |c| record.depth < c.depth) {
                chosen = Some(record);
            }
        }
        chosen.map(|r| r.source)
    }

    /// Drop pairs not confirmed this round; the record goes when empty
    ///
    /// Returns the number of pairs dropped.
    pub fn mark_stale_removed(&mut self, source: LinkAddr) -> usize {
        let Some(handle) = self.handle_of(source) else {
            return 0;
        };
        let Some(record) = self.records.get_mut(handle) else {
            return 0;
        };
        let before = record.pairs.len();
        record.pairs.retain(|p| p.current);
        let dropped = before - record.pairs.len();
        if record.pairs.is_empty() {
            self.records.remove(handle);
            debug!("Routes: record for {} emptied", source);
        }
        dropped
    }

    /// Start a differential round: nothing is current
    pub fn clear_current(&mut self) {
        for handle in self.records.handles() {
            if let Some(record) = self.records.get_mut(handle) {
                for pair in record.pairs.iter_mut() {
                    pair.current = false;
                }
            }
        }
    }

    /// Start dissemination: nothing is acknowledged
    pub fn clear_acked(&mut self) {
        for handle in self.records.handles() {
            if let Some(record) = self.records.get_mut(handle) {
                record.acked = false;
            }
        }
    }

    /// Done with a source for this round
    pub fn mark_acked(&mut self, source: LinkAddr) -> bool {
        match self.handle_of(source).and_then(|h| self.records.get_mut(h)) {
            Some(record) => {
                record.acked = true;
                true
            }
            None => false,
        }
    }

    /// Set the network depth of a source
    pub fn set_depth(&mut self, source: LinkAddr, depth: u8) -> Result<()> {
        let handle = self.handle_of(source).ok_or(Error::NotFound)?;
        let record = self.records.get_mut(handle).ok_or(Error::NotFound)?;
        record.depth = depth;
        Ok(())
    }

    /// Remember the table checksum a node reported
    pub fn record_checksum(&mut self, source: LinkAddr, checksum: u16) -> Result<()> {
        self.reported
            .insert(source, checksum)
            .map(|_| ())
            .map_err(|_| {
                warn!("Routes: no checksum slot for {}", source);
                Error::PoolFull(PoolKind::Checksums)
            })
    }

    /// Last table checksum `source` reported
    pub fn reported_checksum(&self, source: LinkAddr) -> Option<u16> {
        self.reported.get(&source).copied()
    }

    /// Local checksum for a source
    pub fn table_checksum(&self, source: LinkAddr) -> Option<u16> {
        self.get(source).map(ConfigRoute::table_checksum)
    }

    /// True if the node's report confirms the local pairs
    pub fn checksum_matches(&self, source: LinkAddr) -> bool {
        match (self.get(source), self.reported_checksum(source)) {
            (Some(record), Some(reported)) => record.checksum_matches(reported),
            _ => false,
        }
    }

    /// Drop every pair toward `dest`, and records left empty
    pub fn remove_dest(&mut self, dest: LinkAddr) -> usize {
        let mut removed = 0;
        for handle in self.records.handles() {
            let Some(record) = self.records.get_mut(handle) else {
                continue;
            };
            let before = record.pairs.len();
            record.pairs.retain(|p| p.dest != dest);
            removed += before - record.pairs.len();
            if record.pairs.is_empty() {
                self.records.remove(handle);
            }
        }
        removed
    }

    /// Drop a source record and its reported checksum
    pub fn remove_source(&mut self, source: LinkAddr) -> bool {
        self.reported.remove(&source);
        match self.handle_of(source) {
            Some(handle) => self.records.remove(handle).is_some(),
            None => false,
        }
    }

    /// Drop every record; reported checksums stay
    pub fn flush(&mut self) {
        self.records.clear();
    }

    /// Record for a source
    pub fn get(&self, source: LinkAddr) -> Option<&ConfigRoute> {
        self.records.get(self.handle_of(source)?)
    }

    /// Pairs for a source
    pub fn pairs(&self, source: LinkAddr) -> Option<&[RoutePair]> {
        self.get(source).map(ConfigRoute::pairs)
    }

    /// Iterate records
    pub fn iter(&self) -> impl Iterator<Item = &ConfigRoute> + '_ {
        self.records.values()
    }

    /// Number of source records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total pairs across records
    pub fn num_routes(&self) -> usize {
        self.records.values().map(|r| r.pairs.len()).sum()
    }
}

// ============================================================================
// Controller Forwarding Table
// ============================================================================

/// The controller's own first hop toward each node
#[derive(Default)]
pub struct ForwardingTable {
    hops: LinearMap<LinkAddr, LinkAddr, MAX_NODES>,
}

impl ForwardingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            hops: LinearMap::new(),
        }
    }

    /// Set the first hop toward `dest`
    pub fn insert(&mut self, dest: LinkAddr, via: LinkAddr) -> Result<()> {
        self.hops
            .insert(dest, via)
            .map(|_| ())
            .map_err(|_| Error::PoolFull(PoolKind::Forwarding))
    }

    /// First hop toward `dest`
    pub fn next_hop(&self, dest: LinkAddr) -> Option<LinkAddr> {
        self.hops.get(&dest).copied()
    }

    /// Forget `dest`
    pub fn remove(&mut self, dest: LinkAddr) -> Option<LinkAddr> {
        self.hops.remove(&dest)
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.hops.clear();
    }

    /// Entry count
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// True if empty
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Iterate `(dest, via)`
    pub fn iter(&self) -> impl Iterator<Item = (LinkAddr, LinkAddr)> + '_ {
        self.hops.iter().map(|(&d, &v)| (d, v))
    }
}
