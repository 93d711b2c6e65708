/// Sliding replay window for DTLS record sequence numbers.
///
/// Maintains the latest accepted sequence number and a 64-bit bitmap of the
/// last 64 seen sequence numbers to reject duplicates and old records.
///
/// Each epoch has its own `ReplayWindow`; the record layer routes records
/// to the window of their epoch and resets on epoch change.
#[derive(Debug, Default)]
pub struct ReplayWindow {
    max_seq: u64,
    window: u64,
    any_seen: bool,
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether `seqno` would be accepted, without mutating the window.
    ///
    /// Used before decryption; the window is only advanced once the record
    /// authenticates, so forged sequence numbers cannot poison it.
    pub fn check(&self, seqno: u64) -> bool {
        if !self.any_seen || seqno > self.max_seq {
            return true;
        }
        let offset = self.max_seq - seqno;
        if offset >= 64 {
            return false;
        }
        (self.window & (1u64 << offset)) == 0
    }

    /// Mark `seqno` as seen and slide the window forward if needed.
    ///
    /// Returns true if the sequence number was fresh, false if it was a
    /// duplicate or too old.
    pub fn update(&mut self, seqno: u64) -> bool {
        if !self.any_seen {
            self.any_seen = true;
            self.max_seq = seqno;
            self.window = 1;
            return true;
        }

        if seqno > self.max_seq {
            let delta = seqno - self.max_seq;
            if delta > 63 {
                // Jump exceeds window size: clear entirely, only newest is seen
                self.window = 1;
            } else {
                self.window <<= delta;
                self.window |= 1; // mark newest as seen
            }
            self.max_seq = seqno;
            true
        } else {
            let offset = self.max_seq - seqno;
            if offset >= 64 {
                return false; // too old
            }
            let mask = 1u64 << offset;
            if (self.window & mask) != 0 {
                return false; // duplicate
            }
            self.window |= mask;
            true
        }
    }
}
