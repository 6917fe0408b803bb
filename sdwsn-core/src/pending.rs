//! Outstanding sequence numbers awaiting acknowledgment
//!
//! Bounded FIFO. Registering into a full pool evicts the oldest entry.

use crate::types::*;
use heapless::Deque;

/// Draw attempts before falling back to a linear probe
const DRAW_ATTEMPTS: usize = 16;

/// Pending acknowledgment pool
#[derive(Default)]
pub struct PendingAcks {
    seqs: Deque<u16, PENDING_ACK_SLOTS>,
}

impl PendingAcks {
    /// Create an empty pool
    pub const fn new() -> Self {
        Self { seqs: Deque::new() }
    }

    /// True if `seq` is awaiting an ack
    pub fn contains(&self, seq: u16) -> bool {
        self.seqs.iter().any(|&s| s == seq)
    }

    /// Track `seq`. Returns the evicted sequence number, if any.
    pub fn register(&mut self, seq: u16) -> Option<u16> {
        if self.contains(seq) {
            return None;
        }
        let evicted = if self.seqs.is_full() {
            self.seqs.pop_front()
        } else {
            None
        };
        // Room was made above
        let _ = self.seqs.push_back(seq);
        evicted
    }

    /// Consume `seq` if it is pending
    pub fn resolve(&mut self, seq: u16) -> bool {
        if !self.contains(seq) {
            return false;
        }
        let mut kept: Deque<u16, PENDING_ACK_SLOTS> = Deque::new();
        while let Some(s) = self.seqs.pop_front() {
            if s != seq {
                let _ = kept.push_back(s);
            }
        }
        self.seqs = kept;
        true
    }

    /// Pick a sequence number not currently pending
    pub fn draw_fresh<F>(&self, mut random: F) -> u16
    where
        F: FnMut() -> u16,
    {
        let mut candidate = random();
        for _ in 0..DRAW_ATTEMPTS {
            if !self.contains(candidate) {
                return candidate;
            }
            candidate = random();
        }
        while self.contains(candidate) {
            candidate = candidate.wrapping_add(1);
        }
        candidate
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.seqs.clear();
    }

    /// Pending count
    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    /// True if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    /// Pending sequence numbers, oldest first
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.seqs.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_resolve() {
        let mut pending = PendingAcks::new();
        pending.register(10);
        pending.register(20);
        assert!(pending.resolve(10));
        assert!(!pending.resolve(10));
        assert!(pending.contains(20));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_full_evicts_oldest() {
        let mut pending = PendingAcks::new();
        for seq in 0..PENDING_ACK_SLOTS as u16 {
            assert_eq!(pending.register(seq), None);
        }
        assert_eq!(pending.register(100), Some(0));
        assert!(!pending.contains(0));
        assert!(pending.contains(100));
        assert_eq!(pending.len(), PENDING_ACK_SLOTS);
    }

    #[test]
    fn test_no_duplicates() {
        let mut pending = PendingAcks::new();
        pending.register(5);
        pending.register(5);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_draw_skips_pending() {
        let mut pending = PendingAcks::new();
        pending.register(42);
        let mut script = [42u16, 42, 7].into_iter();
        assert_eq!(pending.draw_fresh(|| script.next().unwrap_or(0)), 7);
    }

    #[test]
    fn test_draw_probe_fallback() {
        let mut pending = PendingAcks::new();
        pending.register(42);
        pending.register(43);
        assert_eq!(pending.draw_fresh(|| 42), 44);
    }
}
