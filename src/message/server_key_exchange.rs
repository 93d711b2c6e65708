use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use super::{KeyExchange, NamedCurve, PskIdentity};

/// ECCurveType selector (RFC 4492 section 5.4).
pub const CURVE_TYPE_EXPLICIT_PRIME: u8 = 1;
pub const CURVE_TYPE_EXPLICIT_CHAR2: u8 = 2;
pub const CURVE_TYPE_NAMED_CURVE: u8 = 3;

/// SignatureAndHashAlgorithm for ECDSA over SHA-256 (RFC 5246 section
/// 7.4.1.4.1), the only signature scheme the connector produces.
pub const HASH_SHA256: u8 = 4;
pub const SIG_ECDSA: u8 = 3;

/// Ephemeral ECDH parameters: a named curve and an uncompressed point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcdhParams {
    pub curve: NamedCurve,
    pub point: Vec<u8>,
}

impl EcdhParams {
    pub fn parse(input: &[u8]) -> IResult<&[u8], EcdhParams> {
        let (input, _curve_type) = be_u8(input)?; // validated by the caller
        let (input, curve) = NamedCurve::parse(input)?;
        let (input, point_len) = be_u8(input)?;
        let (input, point) = take(point_len as usize)(input)?;

        Ok((
            input,
            EcdhParams {
                curve,
                point: point.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(CURVE_TYPE_NAMED_CURVE);
        output.extend_from_slice(&self.curve.as_u16().to_be_bytes());
        output.push(self.point.len() as u8);
        output.extend_from_slice(&self.point);
    }
}

/// ServerKeyExchange, whose shape depends on the negotiated key exchange
/// (RFC 4492 section 5.4, RFC 4279 section 2, RFC 5489 section 3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerKeyExchange {
    /// Signed ephemeral ECDH parameters.
    EcdheEcdsa {
        params: EcdhParams,
        hash_algorithm: u8,
        signature_algorithm: u8,
        /// DER-encoded ECDSA signature over
        /// client_random || server_random || params.
        signature: Vec<u8>,
    },
    /// PSK identity hint plus unsigned ephemeral ECDH parameters.
    EcdhePsk {
        hint: PskIdentity,
        params: EcdhParams,
    },
    /// PSK identity hint only.
    Psk { hint: PskIdentity },
    /// The peer used an explicit curve encoding. The remainder of the
    /// message is not parseable; the handshake aborts with
    /// HANDSHAKE_FAILURE.
    UnsupportedCurve { curve_type: u8 },
}

impl ServerKeyExchange {
    /// Parse according to the negotiated key exchange algorithm.
    pub fn parse(input: &[u8], kex: KeyExchange) -> IResult<&[u8], ServerKeyExchange> {
        match kex {
            KeyExchange::Psk => {
                let (input, hint) = PskIdentity::parse(input)?;
                Ok((input, ServerKeyExchange::Psk { hint }))
            }
            KeyExchange::EcdhePsk => {
                let (input, hint) = PskIdentity::parse(input)?;
                if let Some(skipped) = Self::unsupported_curve(input) {
                    return Ok((&input[input.len()..], skipped));
                }
                let (input, params) = EcdhParams::parse(input)?;
                Ok((input, ServerKeyExchange::EcdhePsk { hint, params }))
            }
            KeyExchange::EcdheEcdsa => {
                if let Some(skipped) = Self::unsupported_curve(input) {
                    return Ok((&input[input.len()..], skipped));
                }
                let (input, params) = EcdhParams::parse(input)?;
                let (input, hash_algorithm) = be_u8(input)?;
                let (input, signature_algorithm) = be_u8(input)?;
                let (input, sig_len) = be_u16(input)?;
                let (input, signature) = take(sig_len as usize)(input)?;

                Ok((
                    input,
                    ServerKeyExchange::EcdheEcdsa {
                        params,
                        hash_algorithm,
                        signature_algorithm,
                        signature: signature.to_vec(),
                    },
                ))
            }
        }
    }

    fn unsupported_curve(input: &[u8]) -> Option<ServerKeyExchange> {
        match input.first() {
            Some(&ct) if ct != CURVE_TYPE_NAMED_CURVE => {
                Some(ServerKeyExchange::UnsupportedCurve { curve_type: ct })
            }
            _ => None,
        }
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        match self {
            ServerKeyExchange::EcdheEcdsa {
                params,
                hash_algorithm,
                signature_algorithm,
                signature,
            } => {
                params.serialize(output);
                output.push(*hash_algorithm);
                output.push(*signature_algorithm);
                output.extend_from_slice(&(signature.len() as u16).to_be_bytes());
                output.extend_from_slice(signature);
            }
            ServerKeyExchange::EcdhePsk { hint, params } => {
                hint.serialize(output);
                params.serialize(output);
            }
            ServerKeyExchange::Psk { hint } => {
                hint.serialize(output);
            }
            ServerKeyExchange::UnsupportedCurve { .. } => {
                unreachable!("never serialized");
            }
        }
    }
}
