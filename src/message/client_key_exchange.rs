use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::IResult;

use super::{KeyExchange, PskIdentity};

/// ClientKeyExchange, whose shape depends on the negotiated key exchange
/// (RFC 4279 section 2, RFC 5489 section 3.2, RFC 4492 section 5.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientKeyExchange {
    /// The PSK identity the client wants the server to look up.
    Psk { identity: PskIdentity },
    /// PSK identity plus the client's ephemeral ECDH public point.
    EcdhePsk {
        identity: PskIdentity,
        point: Vec<u8>,
    },
    /// The client's ephemeral ECDH public point.
    EcdheEcdsa { point: Vec<u8> },
}

impl ClientKeyExchange {
    /// Parse according to the negotiated key exchange algorithm.
    pub fn parse(input: &[u8], kex: KeyExchange) -> IResult<&[u8], ClientKeyExchange> {
        match kex {
            KeyExchange::Psk => {
                let (input, identity) = PskIdentity::parse(input)?;
                Ok((input, ClientKeyExchange::Psk { identity }))
            }
            KeyExchange::EcdhePsk => {
                let (input, identity) = PskIdentity::parse(input)?;
                let (input, point) = parse_point(input)?;
                Ok((input, ClientKeyExchange::EcdhePsk { identity, point }))
            }
            KeyExchange::EcdheEcdsa => {
                let (input, point) = parse_point(input)?;
                Ok((input, ClientKeyExchange::EcdheEcdsa { point }))
            }
        }
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        match self {
            ClientKeyExchange::Psk { identity } => {
                identity.serialize(output);
            }
            ClientKeyExchange::EcdhePsk { identity, point } => {
                identity.serialize(output);
                output.push(point.len() as u8);
                output.extend_from_slice(point);
            }
            ClientKeyExchange::EcdheEcdsa { point } => {
                output.push(point.len() as u8);
                output.extend_from_slice(point);
            }
        }
    }

    /// The PSK identity carried, for PSK-flavored exchanges.
    pub fn psk_identity(&self) -> Option<&PskIdentity> {
        match self {
            ClientKeyExchange::Psk { identity } => Some(identity),
            ClientKeyExchange::EcdhePsk { identity, .. } => Some(identity),
            ClientKeyExchange::EcdheEcdsa { .. } => None,
        }
    }

    /// The ECDH public point carried, for ECDHE-flavored exchanges.
    pub fn ecdh_point(&self) -> Option<&[u8]> {
        match self {
            ClientKeyExchange::Psk { .. } => None,
            ClientKeyExchange::EcdhePsk { point, .. } => Some(point),
            ClientKeyExchange::EcdheEcdsa { point } => Some(point),
        }
    }
}

fn parse_point(input: &[u8]) -> IResult<&[u8], Vec<u8>> {
    let (input, len) = be_u8(input)?;
    let (input, point) = take(len as usize)(input)?;
    Ok((input, point.to_vec()))
}
