//! Controller-side radio for the simulated mesh

use crate::sim::Downlink;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use sdwsn_core::{Error, Hal, LinkAddr, Rank, Result, TimeMs};
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Simulated clock shared with the mesh task
#[derive(Debug, Clone, Default)]
pub struct SimClock(Arc<AtomicU64>);

impl SimClock {
    /// Current simulated time
    pub fn now(&self) -> TimeMs {
        self.0.load(Ordering::Relaxed)
    }

    /// Move the clock forward
    pub fn advance(&self, ms: TimeMs) -> TimeMs {
        self.0.fetch_add(ms, Ordering::Relaxed) + ms
    }
}

/// [`Hal`] backed by a channel into the mesh task
pub struct SimRadio {
    clock: SimClock,
    downlink: mpsc::UnboundedSender<Downlink>,
    rng: RefCell<SmallRng>,
}

impl SimRadio {
    /// Create a radio feeding `downlink`
    pub fn new(clock: SimClock, downlink: mpsc::UnboundedSender<Downlink>, seed: u64) -> Self {
        Self {
            clock,
            downlink,
            rng: RefCell::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

impl Hal for SimRadio {
    fn time_ms(&self) -> TimeMs {
        self.clock.now()
    }

    fn send(&self, dest: LinkAddr, next_hop: LinkAddr, data: &[u8]) -> Result<()> {
        debug!("Radio: {} bytes for {} via {}", data.len(), dest, next_hop);
        self.downlink
            .send(Downlink {
                dest,
                next_hop,
                data: data.to_vec(),
            })
            .map_err(|_| Error::HalFailure)
    }

    fn random_u16(&self) -> u16 {
        self.rng.borrow_mut().gen()
    }

    fn on_edge_added(&self, a: LinkAddr, b: LinkAddr) {
        debug!("Schedule: cell for {} <-> {}", a, b);
    }

    fn on_rank_changed(&self, addr: LinkAddr, rank: Rank) {
        info!("Schedule: {} moved to rank {}", addr, rank);
    }

    fn on_slotframe_size_changed(&self, size: u16, seq: u16) {
        info!("Schedule: slotframe size {} (seq {})", size, seq);
    }

    fn platform_name(&self) -> &'static str {
        "sim"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_reaches_mesh() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let radio = SimRadio::new(SimClock::default(), tx, 1);
        radio.send(LinkAddr(3), LinkAddr(2), &[1, 2, 3]).unwrap();
        let frame = rx.try_recv().unwrap();
        assert_eq!(frame.dest, LinkAddr(3));
        assert_eq!(frame.next_hop, LinkAddr(2));
        assert_eq!(frame.data, vec![1, 2, 3]);
    }

    #[test]
    fn test_send_after_mesh_exit() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let radio = SimRadio::new(SimClock::default(), tx, 1);
        assert_eq!(radio.send(LinkAddr(3), LinkAddr(2), &[0]), Err(Error::HalFailure));
    }

    #[test]
    fn test_clock_shared() {
        let clock = SimClock::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let radio = SimRadio::new(clock.clone(), tx, 1);
        clock.advance(1_500);
        assert_eq!(radio.time_ms(), 1_500);
    }
}
