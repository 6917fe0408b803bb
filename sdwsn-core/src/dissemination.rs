//! Dissemination Protocol
//!
//! Cooperative state machine delivering one config batch at a time:
//!
//! ```text
//! Idle -> SelectTarget -> Transmit -> AwaitAck -> Done -> SelectTarget
//!                            ^            |
//!                            +-- Retry <--+ (timeout)
//! ```
//!
//! Every transmission is stamped with a fresh random sequence number that
//! is not already pending. After `max_attempts` unanswered transmissions the
//! target is marked done anyway so the rest of the round can proceed. A
//! send the HAL refuses still spends an attempt but retries without waiting
//! for the timeout. Attempts are capped at the pending-ack pool size. Each
//! call to [`Dissemination::step`] performs exactly one transition.

use crate::config::ControllerConfig;
use crate::hal::Hal;
use crate::pending::PendingAcks;
use crate::routes::{ConfigRoutes, ForwardingTable};
use crate::types::*;
use crate::wire::NcPacket;
use tracing::{debug, info, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Dissemination configuration
#[derive(Debug, Clone, Copy)]
pub struct DisseminationConfig {
    /// Per-attempt acknowledgment timeout
    pub ack_timeout_ms: TimeMs,
    /// Transmissions per target and round
    pub max_attempts: u8,
    /// Skip targets whose reported checksum matches
    pub differential: bool,
}

impl Default for DisseminationConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: ACK_TIMEOUT_MS,
            max_attempts: MAX_ATTEMPTS,
            differential: false,
        }
    }
}

impl From<&ControllerConfig> for DisseminationConfig {
    fn from(config: &ControllerConfig) -> Self {
        Self {
            ack_timeout_ms: config.ack_timeout_ms,
            max_attempts: config.attempt_limit(),
            differential: config.differential,
        }
    }
}

// ============================================================================
// State
// ============================================================================

/// Protocol state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisseminationState {
    /// No round in progress
    #[default]
    Idle,
    /// Pick the next source
    SelectTarget,
    /// Send to `target` through `next_hop`
    Transmit {
        /// Source being configured
        target: LinkAddr,
        /// Controller's first hop toward it
        next_hop: LinkAddr,
    },
    /// Waiting for an ack or the deadline
    AwaitAck {
        /// Source being configured
        target: LinkAddr,
        /// Controller's first hop toward it
        next_hop: LinkAddr,
        /// Timeout for this attempt
        deadline: TimeMs,
    },
    /// Attempt timed out
    Retry {
        /// Source being configured
        target: LinkAddr,
        /// Controller's first hop toward it
        next_hop: LinkAddr,
    },
    /// Target finished, delivered or abandoned
    Done {
        /// Source just finished
        target: LinkAddr,
        /// False if abandoned
        delivered: bool,
    },
}

/// Result of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A transition happened
    Progress,
    /// Waiting on an ack or timeout
    Waiting,
    /// No target left; back to idle
    Finished,
}

/// Protocol counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisseminationStats {
    /// Packets handed to the HAL
    pub packets_sent: u32,
    /// Matching acks
    pub acks_received: u32,
    /// Acks for sequence numbers not pending
    pub stale_acks: u32,
    /// Targets abandoned after the last attempt
    pub delivery_failures: u32,
    /// Targets skipped because their checksum matched
    pub differential_skips: u32,
    /// Targets with no first hop from the controller
    pub unroutable: u32,
}

// ============================================================================
// Protocol
// ============================================================================

/// Dissemination state machine
pub struct Dissemination {
    config: DisseminationConfig,
    state: DisseminationState,
    pending: PendingAcks,
    attempts: u8,
    delivered: bool,
    stats: DisseminationStats,
}

impl Dissemination {
    /// Create an idle state machine
    pub fn new(config: Option<DisseminationConfig>) -> Self {
        let mut config = config.unwrap_or_default();
        config.max_attempts = config.max_attempts.clamp(1, PENDING_ACK_SLOTS as u8);
        Self {
            config,
            state: DisseminationState::Idle,
            pending: PendingAcks::new(),
            attempts: 0,
            delivered: false,
            stats: DisseminationStats::default(),
        }
    }

    /// Begin a round. No effect if one is already running.
    pub fn start(&mut self) {
        if self.state == DisseminationState::Idle {
            self.state = DisseminationState::SelectTarget;
        }
    }

    /// Current state
    pub fn state(&self) -> DisseminationState {
        self.state
    }

    /// True unless idle
    pub fn is_active(&self) -> bool {
        self.state != DisseminationState::Idle
    }

    /// Transmissions made for the current target
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Outstanding sequence numbers
    pub fn pending(&self) -> &PendingAcks {
        &self.pending
    }

    /// Counters
    pub fn stats(&self) -> &DisseminationStats {
        &self.stats
    }

    /// Handle an ack carrying `seq` (already decremented from the wire value)
    pub fn on_ack(&mut self, seq: u16) -> Result<()> {
        let waiting = matches!(
            self.state,
            DisseminationState::Transmit { .. }
                | DisseminationState::AwaitAck { .. }
                | DisseminationState::Retry { .. }
        );
        if waiting && self.pending.resolve(seq) {
            self.delivered = true;
            self.stats.acks_received += 1;
            debug!("Dissemination: ack for seq {:#06x}", seq);
            return Ok(());
        }
        self.stats.stale_acks += 1;
        debug!("Dissemination: stale ack for seq {:#06x}", seq);
        Err(Error::StaleAck)
    }

    /// Perform one transition
    pub fn step<H: Hal>(
        &mut self,
        routes: &mut ConfigRoutes,
        forwarding: &ForwardingTable,
        hal: &H,
        now: TimeMs,
    ) -> StepOutcome {
        match self.state {
            DisseminationState::Idle => StepOutcome::Finished,
            DisseminationState::SelectTarget => self.select_target(routes, forwarding),
            DisseminationState::Transmit { target, next_hop } => {
                self.transmit(routes, hal, target, next_hop, now);
                StepOutcome::Progress
            }
            DisseminationState::AwaitAck {
                target,
                next_hop,
                deadline,
            } => {
                if self.delivered {
                    self.state = DisseminationState::Done {
                        target,
                        delivered: true,
                    };
                    StepOutcome::Progress
                } else if now >= deadline {
                    debug!("Dissemination: attempt {} to {} timed out", self.attempts, target);
                    self.state = DisseminationState::Retry { target, next_hop };
                    StepOutcome::Progress
                } else {
                    StepOutcome::Waiting
                }
            }
            DisseminationState::Retry { target, next_hop } => {
                if self.delivered {
                    self.state = DisseminationState::Done {
                        target,
                        delivered: true,
                    };
                } else if self.attempts >= self.config.max_attempts {
                    warn!(
                        "Dissemination: giving up on {} after {} attempts",
                        target, self.attempts
                    );
                    self.stats.delivery_failures += 1;
                    self.state = DisseminationState::Done {
                        target,
                        delivered: false,
                    };
                } else {
                    self.state = DisseminationState::Transmit { target, next_hop };
                }
                StepOutcome::Progress
            }
            DisseminationState::Done { target, delivered } => {
                routes.mark_acked(target);
                if delivered {
                    info!("Dissemination: {} configured after {} attempts", target, self.attempts);
                }
                self.state = DisseminationState::SelectTarget;
                StepOutcome::Progress
            }
        }
    }

    fn select_target(&mut self, routes: &mut ConfigRoutes, forwarding: &ForwardingTable) -> StepOutcome {
        self.pending.clear();
        self.attempts = 0;
        self.delivered = false;

        let Some(target) = routes.select_next_undisseminated() else {
            debug!("Dissemination: round complete");
            self.state = DisseminationState::Idle;
            return StepOutcome::Finished;
        };

        if self.config.differential {
            routes.mark_stale_removed(target);
            if routes.get(target).is_none() {
                return StepOutcome::Progress;
            }
            if routes.checksum_matches(target) {
                debug!("Dissemination: {} already up to date", target);
                self.stats.differential_skips += 1;
                routes.mark_acked(target);
                return StepOutcome::Progress;
            }
        }

        match forwarding.next_hop(target) {
            Some(next_hop) => {
                self.state = DisseminationState::Transmit { target, next_hop };
            }
            None => {
                warn!("Dissemination: no first hop toward {}", target);
                self.stats.unroutable += 1;
                routes.mark_acked(target);
            }
        }
        StepOutcome::Progress
    }

    fn transmit<H: Hal>(&mut self, routes: &ConfigRoutes, hal: &H, target: LinkAddr, next_hop: LinkAddr, now: TimeMs) {
        let Some(record) = routes.get(target) else {
            self.state = DisseminationState::Done {
                target,
                delivered: false,
            };
            return;
        };

        let seq = self.pending.draw_fresh(|| hal.random_u16());
        let packet = match NcPacket::config(seq, record.entries()) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dissemination: cannot build packet for {}: {}", target, e);
                self.state = DisseminationState::Done {
                    target,
                    delivered: false,
                };
                return;
            }
        };

        self.pending.register(seq);
        self.attempts += 1;
        let bytes = packet.encode();
        if let Err(e) = hal.send(target, next_hop, &bytes) {
            warn!("Dissemination: send to {} failed on attempt {}: {}", target, self.attempts, e);
            self.state = DisseminationState::Retry { target, next_hop };
            return;
        }
        self.stats.packets_sent += 1;
        debug!(
            "Dissemination: seq {:#06x} to {} via {} ({} routes, attempt {})",
            seq,
            target,
            next_hop,
            packet.entries.len(),
            self.attempts
        );

        self.state = DisseminationState::AwaitAck {
            target,
            next_hop,
            deadline: now.saturating_add(self.config.ack_timeout_ms),
        };
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::hal::MockHal;
    use crate::routes::reported_checksum;

    const CTRL: LinkAddr = LinkAddr::new(1, 0);
    const A: LinkAddr = LinkAddr::new(2, 0);
    const B: LinkAddr = LinkAddr::new(3, 0);

    fn setup() -> (ConfigRoutes, ForwardingTable) {
        let mut routes = ConfigRoutes::new(CTRL);
        routes.add_route(A, CTRL, CTRL).unwrap();
        routes.add_route(A, LinkAddr::new(9, 0), B).unwrap();
        routes.set_depth(A, 1).unwrap();
        let mut forwarding = ForwardingTable::new();
        forwarding.insert(A, A).unwrap();
        (routes, forwarding)
    }

    fn run_until_finished(
        proto: &mut Dissemination,
        routes: &mut ConfigRoutes,
        forwarding: &ForwardingTable,
        hal: &MockHal,
    ) -> usize {
        let mut steps = 0;
        loop {
            steps += 1;
            assert!(steps < 1_000, "state machine did not terminate");
            match proto.step(routes, forwarding, hal, hal.time_ms()) {
                StepOutcome::Finished => return steps,
                StepOutcome::Waiting => hal.advance(1_000),
                StepOutcome::Progress => {}
            }
        }
    }

    #[test]
    fn test_delivery_on_ack() {
        let (mut routes, forwarding) = setup();
        let hal = MockHal::new(3);
        let mut proto = Dissemination::new(None);
        proto.start();

        assert_eq!(proto.step(&mut routes, &forwarding, &hal, 0), StepOutcome::Progress);
        assert!(matches!(proto.state(), DisseminationState::Transmit { target: A, .. }));
        proto.step(&mut routes, &forwarding, &hal, 0);
        assert!(matches!(proto.state(), DisseminationState::AwaitAck { .. }));

        let sent = hal.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dest, A);
        let packet = NcPacket::decode(&sent[0].data).unwrap();
        assert_eq!(packet.entries.len(), 2);

        assert_eq!(proto.step(&mut routes, &forwarding, &hal, 10), StepOutcome::Waiting);
        proto.on_ack(packet.seq).unwrap();
        proto.step(&mut routes, &forwarding, &hal, 20);
        assert!(matches!(proto.state(), DisseminationState::Done { delivered: true, .. }));
        proto.step(&mut routes, &forwarding, &hal, 20);
        assert!(routes.get(A).unwrap().acked);
        assert_eq!(proto.step(&mut routes, &forwarding, &hal, 20), StepOutcome::Finished);
        assert_eq!(proto.stats().acks_received, 1);
    }

    #[test]
    fn test_retry_bound() {
        let (mut routes, forwarding) = setup();
        let hal = MockHal::new(4);
        let mut proto = Dissemination::new(None);
        proto.start();

        run_until_finished(&mut proto, &mut routes, &forwarding, &hal);

        let sent = hal.sent();
        assert_eq!(sent.len(), MAX_ATTEMPTS as usize);
        let mut seqs: std::vec::Vec<u16> = sent
            .iter()
            .map(|p| NcPacket::decode(&p.data).unwrap().seq)
            .collect();
        seqs.sort_unstable();
        seqs.dedup();
        assert_eq!(seqs.len(), MAX_ATTEMPTS as usize);
        assert_eq!(proto.stats().delivery_failures, 1);
        assert!(routes.get(A).unwrap().acked);
        assert!(!proto.is_active());
    }

    #[test]
    fn test_pending_holds_every_attempt() {
        let (mut routes, forwarding) = setup();
        let hal = MockHal::new(5);
        let mut proto = Dissemination::new(None);
        proto.start();
        loop {
            proto.step(&mut routes, &forwarding, &hal, hal.time_ms());
            if matches!(proto.state(), DisseminationState::Done { .. }) {
                break;
            }
            hal.advance(ACK_TIMEOUT_MS);
        }
        assert_eq!(proto.pending().len(), MAX_ATTEMPTS as usize);
        assert_eq!(proto.attempts(), MAX_ATTEMPTS);
    }

    #[test]
    fn test_fresh_seq_avoids_pending() {
        let (mut routes, forwarding) = setup();
        let hal = MockHal::new(6);
        hal.script_random(&[77, 77, 78]);
        let mut proto = Dissemination::new(None);
        proto.start();
        proto.step(&mut routes, &forwarding, &hal, 0);
        proto.step(&mut routes, &forwarding, &hal, 0);
        proto.step(&mut routes, &forwarding, &hal, ACK_TIMEOUT_MS);
        proto.step(&mut routes, &forwarding, &hal, ACK_TIMEOUT_MS);
        proto.step(&mut routes, &forwarding, &hal, ACK_TIMEOUT_MS);
        let seqs: std::vec::Vec<u16> = hal
            .sent()
            .iter()
            .map(|p| NcPacket::decode(&p.data).unwrap().seq)
            .collect();
        assert_eq!(seqs, vec![77, 78]);
    }

    #[test]
    fn test_stale_ack_ignored() {
        let (mut routes, forwarding) = setup();
        let hal = MockHal::new(7);
        let mut proto = Dissemination::new(None);
        assert_eq!(proto.on_ack(1), Err(Error::StaleAck));
        proto.start();
        proto.step(&mut routes, &forwarding, &hal, 0);
        proto.step(&mut routes, &forwarding, &hal, 0);
        let seq = NcPacket::decode(&hal.sent()[0].data).unwrap().seq;
        assert_eq!(proto.on_ack(seq.wrapping_add(5)), Err(Error::StaleAck));
        assert_eq!(proto.stats().stale_acks, 2);
        assert_eq!(proto.step(&mut routes, &forwarding, &hal, 1), StepOutcome::Waiting);
    }

    #[test]
    fn test_attempts_clamped_to_pending_slots() {
        let (mut routes, forwarding) = setup();
        let hal = MockHal::new(9);
        let mut proto = Dissemination::new(Some(DisseminationConfig {
            max_attempts: 40,
            ..Default::default()
        }));
        proto.start();
        loop {
            proto.step(&mut routes, &forwarding, &hal, hal.time_ms());
            if matches!(proto.state(), DisseminationState::Done { .. }) {
                break;
            }
            hal.advance(ACK_TIMEOUT_MS);
        }

        let sent = hal.sent();
        assert_eq!(sent.len(), PENDING_ACK_SLOTS);
        assert_eq!(proto.attempts() as usize, PENDING_ACK_SLOTS);
        // A late ack for the first attempt is still pending
        let first = NcPacket::decode(&sent[0].data).unwrap().seq;
        assert!(proto.pending().contains(first));

        let mut proto = Dissemination::new(Some(DisseminationConfig {
            max_attempts: 0,
            ..Default::default()
        }));
        let (mut routes, forwarding) = setup();
        let hal = MockHal::new(9);
        proto.start();
        run_until_finished(&mut proto, &mut routes, &forwarding, &hal);
        assert_eq!(hal.sent().len(), 1);
    }

    #[test]
    fn test_failed_send_retries_without_timeout() {
        let (mut routes, forwarding) = setup();
        let hal = MockHal::new(10);
        hal.set_send_failure(true);
        let mut proto = Dissemination::new(None);
        proto.start();

        proto.step(&mut routes, &forwarding, &hal, 0);
        proto.step(&mut routes, &forwarding, &hal, 0);
        assert!(matches!(proto.state(), DisseminationState::Retry { target: A, .. }));
        assert_eq!(proto.attempts(), 1);

        // Every attempt fails at the same instant; no timeout is waited
        let mut steps = 0;
        while proto.step(&mut routes, &forwarding, &hal, 0) != StepOutcome::Finished {
            steps += 1;
            assert!(steps < 100);
        }
        assert_eq!(proto.stats().packets_sent, 0);
        assert_eq!(proto.stats().delivery_failures, 1);
        assert!(routes.get(A).unwrap().acked);

        // Radio recovers on the next round
        hal.set_send_failure(false);
        routes.clear_acked();
        proto.start();
        proto.step(&mut routes, &forwarding, &hal, 0);
        proto.step(&mut routes, &forwarding, &hal, 0);
        assert!(matches!(proto.state(), DisseminationState::AwaitAck { .. }));
        assert_eq!(hal.sent().len(), 1);
    }

    #[test]
    fn test_differential_skip() {
        let (mut routes, forwarding) = setup();
        routes.clear_current();
        routes.add_route(A, CTRL, CTRL).unwrap();
        routes.add_route(A, LinkAddr::new(9, 0), B).unwrap();
        let node_table = [(CTRL, CTRL), (LinkAddr::new(9, 0), B)];
        routes.record_checksum(A, reported_checksum(node_table)).unwrap();

        let hal = MockHal::new(8);
        let mut proto = Dissemination::new(Some(DisseminationConfig {
            differential: true,
            ..Default::default()
        }));
        proto.start();
        run_until_finished(&mut proto, &mut routes, &forwarding, &hal);
        assert!(hal.sent().is_empty());
        assert_eq!(proto.stats().differential_skips, 1);
    }

    #[test]
    fn test_unroutable_target_skipped() {
        let (mut routes, _) = setup();
        let hal = MockHal::new(9);
        let mut proto = Dissemination::new(None);
        proto.start();
        run_until_finished(&mut proto, &mut routes, &ForwardingTable::new(), &hal);
        assert!(hal.sent().is_empty());
        assert_eq!(proto.stats().unroutable, 1);
    }
}
