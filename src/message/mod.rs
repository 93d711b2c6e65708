//! Wire codec for DTLS 1.2 records and handshake messages.
//!
//! Every type pairs a nom `parse` with a `serialize` writer and round-trips
//! `parse(serialize(m)) == m`.

mod alert;
mod certificate;
mod cipher_suite;
mod client_hello;
mod client_key_exchange;
mod extension;
mod finished;
mod handshake;
mod hello_verify_request;
mod random;
mod record;
mod server_hello;
mod server_key_exchange;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use certificate::CertificatePayload;
pub use cipher_suite::{CipherKind, CipherSuite, KeyExchange};
pub use client_hello::ClientHello;
pub use client_key_exchange::ClientKeyExchange;
pub use extension::{CertificateType, Extension, ExtensionType, NamedCurve};
pub use finished::Finished;
pub use handshake::{BodyContext, Handshake, HandshakeBody, HandshakeHeader};
pub use hello_verify_request::HelloVerifyRequest;
pub use random::Random;
pub use record::{ContentType, DtlsRecord, DtlsRecordSlice, Sequence};
pub use server_hello::ServerHello;
pub use server_key_exchange::{
    EcdhParams, ServerKeyExchange, CURVE_TYPE_NAMED_CURVE, HASH_SHA256, SIG_ECDSA,
};

use arrayvec::ArrayVec;
use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

/// Maximum number of cipher suites retained from a hello message.
pub const MAX_CIPHER_SUITES: usize = 32;

/// Maximum number of compression methods retained from a hello message.
pub const MAX_COMPRESSION_METHODS: usize = 4;

pub type CipherSuiteVec = ArrayVec<CipherSuite, MAX_CIPHER_SUITES>;
pub type CompressionMethodVec = ArrayVec<CompressionMethod, MAX_COMPRESSION_METHODS>;
pub type ExtensionVec = ArrayVec<Extension, 8>;

/// DTLS protocol version. On the wire the version octets are the one's
/// complement of the TLS version, so DTLS 1.2 is {254, 253}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    DTLS1_0,
    #[default]
    DTLS1_2,
    Unknown(u16),
}

impl ProtocolVersion {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0xFEFF => ProtocolVersion::DTLS1_0,
            0xFEFD => ProtocolVersion::DTLS1_2,
            _ => ProtocolVersion::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ProtocolVersion::DTLS1_0 => 0xFEFF,
            ProtocolVersion::DTLS1_2 => 0xFEFD,
            ProtocolVersion::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ProtocolVersion> {
        let (input, value) = be_u16(input)?;
        Ok((input, Self::from_u16(value)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.as_u16().to_be_bytes());
    }
}

/// TLS compression method. Only NULL is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Null,
    Unknown(u8),
}

impl CompressionMethod {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => CompressionMethod::Null,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            CompressionMethod::Null => 0x00,
            CompressionMethod::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CompressionMethod> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}

/// Session identifier, 0-32 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionId(ArrayVec<u8, 32>);

impl SessionId {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn try_new(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > 32 {
            return None;
        }
        let mut v = ArrayVec::new();
        v.try_extend_from_slice(bytes).ok()?;
        Some(SessionId(v))
    }

    /// Fresh random 32-byte session id, assigned by the server.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        SessionId::try_new(&bytes).unwrap()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Parse with a leading 1-byte length prefix.
    pub fn parse(input: &[u8]) -> IResult<&[u8], SessionId> {
        let (input, len) = be_u8(input)?;
        if len > 32 {
            return Err(Err::Failure(NomError::new(input, ErrorKind::LengthValue)));
        }
        let (input, bytes) = take(len as usize)(input)?;
        // Length is validated above.
        Ok((input, SessionId::try_new(bytes).unwrap()))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.0.len() as u8);
        output.extend_from_slice(&self.0);
    }
}

/// HelloVerifyRequest cookie, 0-255 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cookie(Vec<u8>);

impl Cookie {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn try_new(bytes: &[u8]) -> Option<Self> {
        if bytes.len() > 255 {
            return None;
        }
        Some(Cookie(bytes.to_vec()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Parse with a leading 1-byte length prefix.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Cookie> {
        let (input, len) = be_u8(input)?;
        let (input, bytes) = take(len as usize)(input)?;
        Ok((input, Cookie(bytes.to_vec())))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.0.len() as u8);
        output.extend_from_slice(&self.0);
    }
}

/// PSK identity, an opaque UTF-8 string up to 2^16-1 bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PskIdentity(Vec<u8>);

impl PskIdentity {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        PskIdentity(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parse with a leading 2-byte length prefix.
    pub fn parse(input: &[u8]) -> IResult<&[u8], PskIdentity> {
        let (input, len) = be_u16(input)?;
        let (input, bytes) = take(len as usize)(input)?;
        Ok((input, PskIdentity(bytes.to_vec())))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&(self.0.len() as u16).to_be_bytes());
        output.extend_from_slice(&self.0);
    }
}

impl std::fmt::Debug for PskIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PskIdentity({})", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for PskIdentity {
    fn from(value: &str) -> Self {
        PskIdentity(value.as_bytes().to_vec())
    }
}

/// Handshake message type (RFC 5246 / RFC 6347).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    HelloRequest,
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    Certificate,
    ServerKeyExchange,
    ServerHelloDone,
    ClientKeyExchange,
    Finished,
    Unknown(u8),
}

impl MessageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => MessageType::HelloRequest,
            1 => MessageType::ClientHello,
            2 => MessageType::ServerHello,
            3 => MessageType::HelloVerifyRequest,
            11 => MessageType::Certificate,
            12 => MessageType::ServerKeyExchange,
            14 => MessageType::ServerHelloDone,
            16 => MessageType::ClientKeyExchange,
            20 => MessageType::Finished,
            _ => MessageType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MessageType::HelloRequest => 0,
            MessageType::ClientHello => 1,
            MessageType::ServerHello => 2,
            MessageType::HelloVerifyRequest => 3,
            MessageType::Certificate => 11,
            MessageType::ServerKeyExchange => 12,
            MessageType::ServerHelloDone => 14,
            MessageType::ClientKeyExchange => 16,
            MessageType::Finished => 20,
            MessageType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], MessageType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}
