//! Link Observation Table
//!
//! Raw pairwise link measurements reported by advertisements. Each entry is
//! an unordered pair with a signed quality and its own expiry timer,
//! independent of the nodes it names. Lookups move the hit to the front.

use crate::pool::{Handle, Pool};
use crate::types::*;
use tracing::{debug, warn};

/// One measured link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkObservation {
    /// First endpoint
    pub a: LinkAddr,
    /// Second endpoint
    pub b: LinkAddr,
    /// Signed quality (RSSI)
    pub quality: LinkQuality,
    /// Expiry deadline
    pub expires_at: TimeMs,
}

impl LinkObservation {
    /// True if this link joins `x` and `y` in either direction
    pub fn joins(&self, x: LinkAddr, y: LinkAddr) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }

    /// True if either endpoint is `addr`
    pub fn touches(&self, addr: LinkAddr) -> bool {
        self.a == addr || self.b == addr
    }
}

/// Link Observation Table
pub struct LinkTable {
    timeout_ms: TimeMs,
    links: Pool<LinkObservation, MAX_LINKS>,
}

impl LinkTable {
    /// Create an empty table
    pub fn new(timeout_ms: TimeMs) -> Self {
        Self {
            timeout_ms,
            links: Pool::new(),
        }
    }

    fn handle_of(&self, a: LinkAddr, b: LinkAddr) -> Option<Handle> {
        self.links.find(|l| l.joins(a, b))
    }

    /// Record a measurement. Returns true if the pair was not known.
    pub fn report(&mut self, a: LinkAddr, b: LinkAddr, quality: LinkQuality, now: TimeMs) -> Result<bool> {
        if a == b {
            return Err(Error::InvalidArg);
        }
        let expires_at = now.saturating_add(self.timeout_ms);

        if let Some(handle) = self.handle_of(a, b) {
            self.links.promote(handle);
            if let Some(link) = self.links.get_mut(handle) {
                link.quality = quality;
                link.expires_at = expires_at;
            }
            return Ok(false);
        }

        self.links
            .insert_back(LinkObservation {
                a,
                b,
                quality,
                expires_at,
            })
            .ok_or_else(|| {
                warn!("Links: no slot for {} <-> {}", a, b);
                Error::PoolFull(PoolKind::Links)
            })?;
        debug!("Links: new {} <-> {} ({} dBm)", a, b, quality);
        Ok(true)
    }

    /// Find the observation for an unordered pair, moving it to the front
    pub fn lookup(&mut self, a: LinkAddr, b: LinkAddr) -> Option<&LinkObservation> {
        let handle = self.handle_of(a, b)?;
        self.links.promote(handle);
        self.links.get(handle)
    }

    /// Non-reordering membership check
    pub fn contains(&self, a: LinkAddr, b: LinkAddr) -> bool {
        self.handle_of(a, b).is_some()
    }

    /// Quality of a pair without reordering
    pub fn quality(&self, a: LinkAddr, b: LinkAddr) -> Option<LinkQuality> {
        self.links.get(self.handle_of(a, b)?).map(|l| l.quality)
    }

    /// Drop expired observations. Returns the number removed.
    pub fn periodic(&mut self, now: TimeMs) -> usize {
        let removed = self.links.retain(|l| now < l.expires_at);
        if removed > 0 {
            debug!("Links: expired {}", removed);
        }
        removed
    }

    /// Drop every observation touching `addr`
    pub fn remove_addr(&mut self, addr: LinkAddr) -> usize {
        self.links.retain(|l| !l.touches(addr))
    }

    /// Iterate front to back
    pub fn iter(&self) -> impl Iterator<Item = &LinkObservation> + '_ {
        self.links.values()
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// True if empty
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
