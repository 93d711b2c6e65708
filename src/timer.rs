use std::ops::Mul;
use std::time::Duration;

/// Retransmission backoff for handshake flights.
///
/// Starts at the configured timeout and doubles on every attempt, giving
/// the exponentially increasing retransmission intervals of RFC 6347
/// section 4.2.4.1. The retry budget is shared between timer-driven
/// resends and resends triggered by a duplicate of the peer's previous
/// flight.
pub struct ExponentialBackoff {
    start_rto: Duration,
    retries: usize,
    rto: Duration,
    left: usize,
}

impl ExponentialBackoff {
    pub fn new(start_rto: Duration, retries: usize) -> Self {
        Self {
            start_rto,
            retries,
            rto: start_rto,
            left: retries,
        }
    }

    /// Rearm for a fresh flight.
    pub fn reset(&mut self) {
        self.rto = self.start_rto;
        self.left = self.retries;
    }

    /// Current retransmission timeout.
    pub fn rto(&self) -> Duration {
        self.rto
    }

    /// Consume one retry and double the timeout.
    pub fn attempt(&mut self) {
        let (n, overflow) = self.left.overflowing_sub(1);

        if overflow {
            return;
        }

        self.left = n;
        self.rto = self.rto.mul(2);
    }

    pub fn can_retry(&self) -> bool {
        self.left > 0
    }

    pub fn retries_left(&self) -> usize {
        self.left
    }
}
