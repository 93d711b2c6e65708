use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::be_u16;
use nom::{Err, IResult};

use crate::util::{be_u24, put_u24};
use crate::Error;

use super::{CertificateType, KeyExchange, MessageType};
use super::{CertificatePayload, ClientHello, ClientKeyExchange, Finished};
use super::{HelloVerifyRequest, ServerHello, ServerKeyExchange};

/// The 12-byte DTLS handshake header:
/// type(1) + length(3) + message_seq(2) + fragment_offset(3) + fragment_length(3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeHeader {
    pub msg_type: MessageType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl HandshakeHeader {
    pub const LEN: usize = 12;

    /// Is this a proper fragment rather than a whole message?
    pub fn is_fragment(&self) -> bool {
        self.fragment_offset != 0 || self.fragment_length != self.length
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], HandshakeHeader> {
        let (input, msg_type) = MessageType::parse(input)?;
        let (input, length) = be_u24(input)?;
        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;

        // A fragment can never extend past the end of the full message.
        if fragment_offset
            .checked_add(fragment_length)
            .map(|end| end > length)
            .unwrap_or(true)
        {
            return Err(Err::Failure(NomError::new(input, ErrorKind::LengthValue)));
        }

        Ok((
            input,
            HandshakeHeader {
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.msg_type.as_u8());
        put_u24(output, self.length);
        output.extend_from_slice(&self.message_seq.to_be_bytes());
        put_u24(output, self.fragment_offset);
        put_u24(output, self.fragment_length);
    }
}

/// A handshake header with its (possibly partial) fragment bytes, as
/// carved out of a record.
#[derive(Debug, PartialEq, Eq)]
pub struct Handshake<'a> {
    pub header: HandshakeHeader,
    pub fragment: &'a [u8],
}

impl<'a> Handshake<'a> {
    pub fn parse(input: &'a [u8]) -> IResult<&[u8], Handshake<'a>> {
        let (input, header) = HandshakeHeader::parse(input)?;
        let (input, fragment) = take(header.fragment_length as usize)(input)?;

        Ok((input, Handshake { header, fragment }))
    }

    /// Serialize an unfragmented handshake message.
    pub fn serialize_message(
        msg_type: MessageType,
        message_seq: u16,
        body: &[u8],
        output: &mut Vec<u8>,
    ) {
        let header = HandshakeHeader {
            msg_type,
            length: body.len() as u32,
            message_seq,
            fragment_offset: 0,
            fragment_length: body.len() as u32,
        };
        header.serialize(output);
        output.extend_from_slice(body);
    }

    /// Serialize one fragment of a (possibly larger) handshake message.
    pub fn serialize_fragment(
        msg_type: MessageType,
        total_length: u32,
        message_seq: u16,
        fragment_offset: u32,
        chunk: &[u8],
        output: &mut Vec<u8>,
    ) {
        let header = HandshakeHeader {
            msg_type,
            length: total_length,
            message_seq,
            fragment_offset,
            fragment_length: chunk.len() as u32,
        };
        header.serialize(output);
        output.extend_from_slice(chunk);
    }
}

/// Context needed to parse body types whose wire shape depends on the
/// negotiation state.
#[derive(Debug, Clone, Copy)]
pub struct BodyContext {
    pub key_exchange: KeyExchange,
    pub certificate_type: CertificateType,
}

impl Default for BodyContext {
    fn default() -> Self {
        BodyContext {
            key_exchange: KeyExchange::Psk,
            certificate_type: CertificateType::X509,
        }
    }
}

/// A fully reassembled handshake message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeBody {
    HelloRequest,
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    HelloVerifyRequest(HelloVerifyRequest),
    Certificate(CertificatePayload),
    ServerKeyExchange(ServerKeyExchange),
    ServerHelloDone,
    ClientKeyExchange(ClientKeyExchange),
    Finished(Finished),
}

impl HandshakeBody {
    pub fn msg_type(&self) -> MessageType {
        match self {
            HandshakeBody::HelloRequest => MessageType::HelloRequest,
            HandshakeBody::ClientHello(_) => MessageType::ClientHello,
            HandshakeBody::ServerHello(_) => MessageType::ServerHello,
            HandshakeBody::HelloVerifyRequest(_) => MessageType::HelloVerifyRequest,
            HandshakeBody::Certificate(_) => MessageType::Certificate,
            HandshakeBody::ServerKeyExchange(_) => MessageType::ServerKeyExchange,
            HandshakeBody::ServerHelloDone => MessageType::ServerHelloDone,
            HandshakeBody::ClientKeyExchange(_) => MessageType::ClientKeyExchange,
            HandshakeBody::Finished(_) => MessageType::Finished,
        }
    }

    /// Parse a complete body. The entire input must be consumed.
    pub fn parse(msg_type: MessageType, body: &[u8], ctx: BodyContext) -> Result<Self, Error> {
        let (rest, parsed) = match msg_type {
            MessageType::HelloRequest => (body, HandshakeBody::HelloRequest),
            MessageType::ClientHello => {
                let (rest, m) = ClientHello::parse(body)?;
                (rest, HandshakeBody::ClientHello(m))
            }
            MessageType::ServerHello => {
                let (rest, m) = ServerHello::parse(body)?;
                (rest, HandshakeBody::ServerHello(m))
            }
            MessageType::HelloVerifyRequest => {
                let (rest, m) = HelloVerifyRequest::parse(body)?;
                (rest, HandshakeBody::HelloVerifyRequest(m))
            }
            MessageType::Certificate => {
                let (rest, m) = CertificatePayload::parse(body, ctx.certificate_type)?;
                (rest, HandshakeBody::Certificate(m))
            }
            MessageType::ServerKeyExchange => {
                let (rest, m) = ServerKeyExchange::parse(body, ctx.key_exchange)?;
                (rest, HandshakeBody::ServerKeyExchange(m))
            }
            MessageType::ServerHelloDone => (body, HandshakeBody::ServerHelloDone),
            MessageType::ClientKeyExchange => {
                let (rest, m) = ClientKeyExchange::parse(body, ctx.key_exchange)?;
                (rest, HandshakeBody::ClientKeyExchange(m))
            }
            MessageType::Finished => {
                let (rest, m) = Finished::parse(body)?;
                (rest, HandshakeBody::Finished(m))
            }
            MessageType::Unknown(v) => {
                return Err(Error::decode(0, format!("unknown handshake type {}", v)));
            }
        };

        // HelloRequest and ServerHelloDone have empty bodies; for those,
        // rest == body, so the trailing-bytes check rejects any payload.
        if !rest.is_empty() {
            return Err(Error::decode(
                body.len() - rest.len(),
                "trailing bytes after handshake body",
            ));
        }

        Ok(parsed)
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        match self {
            HandshakeBody::HelloRequest => {}
            HandshakeBody::ClientHello(m) => m.serialize(output),
            HandshakeBody::ServerHello(m) => m.serialize(output),
            HandshakeBody::HelloVerifyRequest(m) => m.serialize(output),
            HandshakeBody::Certificate(m) => m.serialize(output),
            HandshakeBody::ServerKeyExchange(m) => m.serialize(output),
            HandshakeBody::ServerHelloDone => {}
            HandshakeBody::ClientKeyExchange(m) => m.serialize(output),
            HandshakeBody::Finished(m) => m.serialize(output),
        }
    }
}
