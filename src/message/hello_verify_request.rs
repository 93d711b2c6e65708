use nom::IResult;

use super::{Cookie, ProtocolVersion};

/// HelloVerifyRequest (RFC 6347 section 4.2.1): the stateless reply to an
/// uncookied ClientHello.
///
/// The version is fixed to DTLS 1.0 regardless of the negotiated version,
/// as mandated for HelloVerifyRequest compatibility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    pub server_version: ProtocolVersion,
    pub cookie: Cookie,
}

impl HelloVerifyRequest {
    pub fn new(cookie: Cookie) -> Self {
        HelloVerifyRequest {
            server_version: ProtocolVersion::DTLS1_0,
            cookie,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], HelloVerifyRequest> {
        let (input, server_version) = ProtocolVersion::parse(input)?;
        let (input, cookie) = Cookie::parse(input)?;

        Ok((
            input,
            HelloVerifyRequest {
                server_version,
                cookie,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.server_version.serialize(output);
        self.cookie.serialize(output);
    }
}
