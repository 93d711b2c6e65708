use std::fmt;
use std::io;

use crate::message::{Alert, AlertDescription};

/// Errors surfaced by the record layer, the handshake and the connector.
#[derive(Debug)]
pub enum Error {
    /// Wire data could not be decoded. Carries the byte offset into the
    /// datagram and a short reason.
    Decode { offset: usize, reason: String },
    /// A record failed authentication. Dropped without a response so the
    /// failure is indistinguishable from packet loss on the wire.
    BadRecordMac,
    /// A record's sequence number was already seen in its epoch. Silent.
    ReplayDropped,
    /// The peer did not complete the handshake within the retransmission
    /// budget.
    HandshakeTimeout,
    /// The handshake failed; carries the alert that was (or would be) sent.
    HandshakeFailure(Alert),
    /// The peer closed the connection, via close_notify or a fatal alert.
    PeerClosed(Alert),
    /// The connection store is at capacity with no evictable entry.
    StoreFull,
    /// The 48-bit write sequence number space of the current epoch is
    /// exhausted; a new handshake is required.
    SeqExhausted,
    /// A message arrived that the current state does not accept.
    UnexpectedMessage(String),
    /// A cryptographic operation failed.
    Crypto(String),
    /// Peer credentials could not be verified.
    Security(String),
    /// Invalid configuration.
    Config(String),
    /// Socket I/O failure.
    Io(io::Error),
    /// The connector is not running.
    NotRunning,
}

impl Error {
    /// Decode error helper with the conventional (offset, reason) payload.
    pub(crate) fn decode(offset: usize, reason: impl Into<String>) -> Self {
        Error::Decode {
            offset,
            reason: reason.into(),
        }
    }

    /// The fatal alert this error maps to, if any. Silent errors
    /// (replay, bad MAC on unauthenticated data) map to none.
    pub fn to_alert(&self) -> Option<Alert> {
        match self {
            Error::Decode { .. } => Some(Alert::fatal(AlertDescription::DecodeError)),
            Error::UnexpectedMessage(_) => {
                Some(Alert::fatal(AlertDescription::UnexpectedMessage))
            }
            Error::Crypto(_) => Some(Alert::fatal(AlertDescription::DecryptError)),
            Error::Security(_) => Some(Alert::fatal(AlertDescription::DecryptError)),
            Error::HandshakeFailure(alert) => Some(*alert),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Decode { offset, reason } => {
                write!(f, "decode error at offset {}: {}", offset, reason)
            }
            Error::BadRecordMac => write!(f, "record failed authentication"),
            Error::ReplayDropped => write!(f, "duplicate record dropped"),
            Error::HandshakeTimeout => write!(f, "handshake timed out"),
            Error::HandshakeFailure(alert) => write!(f, "handshake failed: {}", alert),
            Error::PeerClosed(alert) => write!(f, "peer closed connection: {}", alert),
            Error::StoreFull => write!(f, "connection store full"),
            Error::SeqExhausted => write!(f, "record sequence number space exhausted"),
            Error::UnexpectedMessage(what) => write!(f, "unexpected message: {}", what),
            Error::Crypto(what) => write!(f, "crypto failure: {}", what),
            Error::Security(what) => write!(f, "security failure: {}", what),
            Error::Config(what) => write!(f, "invalid configuration: {}", what),
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::NotRunning => write!(f, "connector not running"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Io(value)
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match value {
            nom::Err::Incomplete(_) => Error::decode(0, "truncated input"),
            nom::Err::Error(x) | nom::Err::Failure(x) => {
                Error::decode(0, format!("{:?}", x.code))
            }
        }
    }
}
