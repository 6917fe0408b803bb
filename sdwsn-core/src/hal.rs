//! Hardware Abstraction Layer
//!
//! The controller reaches the outside world only through [`Hal`]:
//! - monotonic time
//! - unicast transmission toward a next hop
//! - random numbers for sequence stamping
//! - schedule events for the TSCH scheduler (default no-ops)
//!
//! # Implementing a HAL
//!
//! ```ignore
//! struct RadioHal;
//!
//! impl Hal for RadioHal {
//!     fn time_ms(&self) -> TimeMs {
//!         // Read RTIMER
//!     }
//!
//!     fn send(&self, dest: LinkAddr, next_hop: LinkAddr, data: &[u8]) -> Result<()> {
//!         // Queue on the MAC
//!     }
//!
//!     fn random_u16(&self) -> u16 {
//!         // Hardware RNG
//!     }
//! }
//! ```

use crate::types::*;

// ============================================================================
// HAL Trait
// ============================================================================

/// Platform interface used by the controller
pub trait Hal {
    /// Current time in milliseconds
    ///
    /// Must be monotonically increasing.
    fn time_ms(&self) -> TimeMs;

    /// Hand a packet for `dest` to the radio, first hop `next_hop`
    fn send(&self, dest: LinkAddr, next_hop: LinkAddr, data: &[u8]) -> Result<()>;

    /// Uniform random 16-bit value
    fn random_u16(&self) -> u16;

    /// A forwarding-tree edge was added
    fn on_edge_added(&self, _a: LinkAddr, _b: LinkAddr) {}

    /// A node reported a new rank
    fn on_rank_changed(&self, _addr: LinkAddr, _rank: Rank) {}

    /// The scheduler should resize its slotframe
    fn on_slotframe_size_changed(&self, _size: u16, _seq: u16) {}

    /// Get platform name
    fn platform_name(&self) -> &'static str {
        "unknown"
    }
}

// ============================================================================
// Mock HAL (for testing and simulation)
// ============================================================================

#[cfg(feature = "std")]
pub use mock::{MockHal, ScheduleEvent, SentPacket};

#[cfg(feature = "std")]
mod mock {
    use super::*;
    use core::cell::{Cell, RefCell};
    use core::sync::atomic::{AtomicU64, Ordering};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Packet captured by [`MockHal::send`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentPacket {
        /// Final destination
        pub dest: LinkAddr,
        /// Next hop the packet was handed to
        pub next_hop: LinkAddr,
        /// Raw bytes
        pub data: Vec<u8>,
        /// Send time
        pub at: TimeMs,
    }

    /// Schedule callback captured by the mock
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum ScheduleEvent {
        /// `on_edge_added`
        EdgeAdded(LinkAddr, LinkAddr),
        /// `on_rank_changed`
        RankChanged(LinkAddr, Rank),
        /// `on_slotframe_size_changed`
        SlotframeSize(u16, u16),
    }

    /// Recording HAL with a manual clock and a seeded RNG
    pub struct MockHal {
        time: AtomicU64,
        rng: RefCell<SmallRng>,
        scripted: RefCell<VecDeque<u16>>,
        sent: RefCell<Vec<SentPacket>>,
        events: RefCell<Vec<ScheduleEvent>>,
        fail_send: Cell<bool>,
    }

    impl MockHal {
        /// Create with a fixed seed
        pub fn new(seed: u64) -> Self {
            Self {
                time: AtomicU64::new(0),
                rng: RefCell::new(SmallRng::seed_from_u64(seed)),
                scripted: RefCell::new(VecDeque::new()),
                sent: RefCell::new(Vec::new()),
                events: RefCell::new(Vec::new()),
                fail_send: Cell::new(false),
            }
        }

        /// Advance time
        pub fn advance(&self, ms: TimeMs) {
            self.time.fetch_add(ms, Ordering::SeqCst);
        }

        /// Set absolute time
        pub fn set_time(&self, ms: TimeMs) {
            self.time.store(ms, Ordering::SeqCst);
        }

        /// Queue values returned by `random_u16` before the RNG is used
        pub fn script_random(&self, values: &[u16]) {
            self.scripted.borrow_mut().extend(values.iter().copied());
        }

        /// Make every `send` fail
        pub fn set_send_failure(&self, fail: bool) {
            self.fail_send.set(fail);
        }

        /// Packets sent so far
        pub fn sent(&self) -> Vec<SentPacket> {
            self.sent.borrow().clone()
        }

        /// Drain sent packets
        pub fn take_sent(&self) -> Vec<SentPacket> {
            core::mem::take(&mut *self.sent.borrow_mut())
        }

        /// Schedule events so far
        pub fn events(&self) -> Vec<ScheduleEvent> {
            self.events.borrow().clone()
        }

        /// Drain schedule events
        pub fn take_events(&self) -> Vec<ScheduleEvent> {
            core::mem::take(&mut *self.events.borrow_mut())
        }
    }

    impl Default for MockHal {
        fn default() -> Self {
            Self::new(0)
        }
    }

    impl Hal for MockHal {
        fn time_ms(&self) -> TimeMs {
            self.time.load(Ordering::SeqCst)
        }

        fn send(&self, dest: LinkAddr, next_hop: LinkAddr, data: &[u8]) -> Result<()> {
            if self.fail_send.get() {
                return Err(Error::HalFailure);
            }
            self.sent.borrow_mut().push(SentPacket {
                dest,
                next_hop,
                data: data.to_vec(),
                at: self.time_ms(),
            });
            Ok(())
        }

        fn random_u16(&self) -> u16 {
            if let Some(value) = self.scripted.borrow_mut().pop_front() {
                return value;
            }
            self.rng.borrow_mut().gen()
        }

        fn on_edge_added(&self, a: LinkAddr, b: LinkAddr) {
            self.events.borrow_mut().push(ScheduleEvent::EdgeAdded(a, b));
        }

        fn on_rank_changed(&self, addr: LinkAddr, rank: Rank) {
            self.events.borrow_mut().push(ScheduleEvent::RankChanged(addr, rank));
        }

        fn on_slotframe_size_changed(&self, size: u16, seq: u16) {
            self.events.borrow_mut().push(ScheduleEvent::SlotframeSize(size, seq));
        }

        fn platform_name(&self) -> &'static str {
            "mock"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_mock_records() {
            let hal = MockHal::new(1);
            hal.advance(5);
            hal.send(LinkAddr::new(3, 0), LinkAddr::new(2, 0), &[1, 2, 3]).unwrap();
            hal.on_edge_added(LinkAddr::new(1, 0), LinkAddr::new(2, 0));
            let sent = hal.take_sent();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].at, 5);
            assert!(hal.sent().is_empty());
            assert_eq!(hal.events().len(), 1);
        }

        #[test]
        fn test_scripted_random_first() {
            let hal = MockHal::new(1);
            hal.script_random(&[10, 20]);
            assert_eq!(hal.random_u16(), 10);
            assert_eq!(hal.random_u16(), 20);
            hal.random_u16();
        }

        #[test]
        fn test_send_failure() {
            let hal = MockHal::default();
            hal.set_send_failure(true);
            assert_eq!(
                hal.send(LinkAddr::new(2, 0), LinkAddr::new(2, 0), &[]),
                Err(Error::HalFailure)
            );
        }
    }
}
