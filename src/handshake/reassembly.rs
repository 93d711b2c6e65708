//! Reassembly of fragmented handshake messages.

use crate::message::{HandshakeHeader, MessageType};
use crate::Error;

/// Reassembly state for one handshake message.
///
/// Fragments may arrive out of order, overlapping and duplicated; the
/// message is complete once the union of received intervals covers
/// `[0, total_length)`.
#[derive(Debug)]
pub struct Reassembly {
    msg_type: MessageType,
    message_seq: u16,
    total_length: usize,
    buffer: Vec<u8>,
    /// Received intervals, disjoint and sorted by start offset.
    intervals: Vec<(usize, usize)>,
}

impl Reassembly {
    pub fn new(header: &HandshakeHeader) -> Reassembly {
        Reassembly {
            msg_type: header.msg_type,
            message_seq: header.message_seq,
            total_length: header.length as usize,
            buffer: vec![0; header.length as usize],
            intervals: Vec::new(),
        }
    }

    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    pub fn message_seq(&self) -> u16 {
        self.message_seq
    }

    /// Add one fragment. Every fragment must agree with the header
    /// metadata announced by the first one.
    pub fn add(&mut self, header: &HandshakeHeader, fragment: &[u8]) -> Result<(), Error> {
        if header.msg_type != self.msg_type || header.length as usize != self.total_length {
            return Err(Error::decode(0, "fragment metadata mismatch"));
        }

        let start = header.fragment_offset as usize;
        let end = start + fragment.len();
        if end > self.total_length {
            return Err(Error::decode(0, "fragment past message end"));
        }

        self.buffer[start..end].copy_from_slice(fragment);
        self.insert_interval(start, end);

        Ok(())
    }

    fn insert_interval(&mut self, start: usize, end: usize) {
        if start == end {
            return;
        }

        // Merge with any overlapping or adjacent intervals.
        let mut merged = (start, end);
        let mut keep = Vec::with_capacity(self.intervals.len() + 1);

        for &(s, e) in &self.intervals {
            if e < merged.0 || s > merged.1 {
                keep.push((s, e));
            } else {
                merged = (merged.0.min(s), merged.1.max(e));
            }
        }

        let at = keep.partition_point(|&(s, _)| s < merged.0);
        keep.insert(at, merged);
        self.intervals = keep;
    }

    /// Complete iff a single interval covers the whole message.
    pub fn is_complete(&self) -> bool {
        if self.total_length == 0 {
            return true;
        }
        matches!(self.intervals.as_slice(), [(0, end)] if *end == self.total_length)
    }

    /// Take the reassembled message body. Panics if incomplete.
    pub fn into_body(self) -> Vec<u8> {
        debug_assert!(self.is_complete());
        self.buffer
    }
}
