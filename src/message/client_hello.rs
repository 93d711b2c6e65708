use arrayvec::ArrayVec;
use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

use super::extension::find;
use super::{CertificateType, CipherSuite, CipherSuiteVec, CompressionMethod};
use super::{CompressionMethodVec, Cookie, Extension, ExtensionType, ExtensionVec};
use super::{NamedCurve, ProtocolVersion, Random, SessionId};
use crate::util::many1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cookie: Cookie,
    pub cipher_suites: CipherSuiteVec,
    pub compression_methods: CompressionMethodVec,
    pub extensions: ExtensionVec,
}

impl ClientHello {
    pub fn new(
        random: Random,
        session_id: SessionId,
        cookie: Cookie,
        cipher_suites: &[CipherSuite],
    ) -> Self {
        let mut suites = ArrayVec::new();
        for suite in cipher_suites.iter().take(suites.capacity()) {
            suites.push(*suite);
        }

        let mut compression_methods = ArrayVec::new();
        compression_methods.push(CompressionMethod::Null);

        ClientHello {
            client_version: ProtocolVersion::DTLS1_2,
            random,
            session_id,
            cookie,
            cipher_suites: suites,
            compression_methods,
            extensions: ArrayVec::new(),
        }
    }

    /// Attach the extensions a hello for these suites needs: curve and
    /// point-format offers when any suite runs ECDHE, certificate-type
    /// offers when the server authenticates with a certificate or RPK.
    pub fn with_default_extensions(mut self, offer_rpk: bool) -> Self {
        let uses_ecdhe = self.cipher_suites.iter().any(|s| s.uses_ecdhe());
        let uses_certificate = self
            .cipher_suites
            .iter()
            .any(|s| s.requires_server_certificate());

        if uses_ecdhe {
            self.extensions
                .push(Extension::supported_groups(NamedCurve::supported()));
            self.extensions.push(Extension::ec_point_formats());
        }

        if uses_certificate {
            let types: &[CertificateType] = if offer_rpk {
                &[CertificateType::RawPublicKey, CertificateType::X509]
            } else {
                &[CertificateType::X509]
            };
            self.extensions.push(Extension::certificate_type_offer(
                ExtensionType::ServerCertificateType,
                types,
            ));
        }

        self
    }

    /// The server certificate types the client offered, defaulting to
    /// X.509 when the extension is absent (RFC 7250 section 4.1).
    pub fn offered_server_certificate_types(&self) -> Vec<CertificateType> {
        find(&self.extensions, ExtensionType::ServerCertificateType)
            .and_then(|e| e.as_certificate_type_offer())
            .unwrap_or_else(|| vec![CertificateType::X509])
    }

    /// Curves both sides can use, in the client's preference order.
    pub fn common_curves(&self) -> Vec<NamedCurve> {
        find(&self.extensions, ExtensionType::SupportedGroups)
            .and_then(|e| e.as_supported_groups())
            .map(|curves| curves.into_iter().filter(|c| c.is_supported()).collect())
            .unwrap_or_else(|| NamedCurve::supported().to_vec())
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ClientHello> {
        let (input, client_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;
        let (input, cookie) = Cookie::parse(input)?;

        let (input, cipher_suites_len) = be_u16(input)?;
        if cipher_suites_len % 2 != 0 {
            return Err(Err::Failure(NomError::new(input, ErrorKind::LengthValue)));
        }
        let (input, input_cipher) = take(cipher_suites_len as usize)(input)?;
        let (rest, cipher_suites) = many1(CipherSuite::parse)(input_cipher)?;
        if !rest.is_empty() {
            return Err(Err::Failure(NomError::new(rest, ErrorKind::LengthValue)));
        }

        let (input, compression_methods_len) = be_u8(input)?;
        let (input, input_compression) = take(compression_methods_len as usize)(input)?;
        let (rest, compression_methods) = many1(CompressionMethod::parse)(input_compression)?;
        if !rest.is_empty() {
            return Err(Err::Failure(NomError::new(rest, ErrorKind::LengthValue)));
        }

        let (input, extensions) = Extension::parse_block(input)?;

        Ok((
            input,
            ClientHello {
                client_version,
                random,
                session_id,
                cookie,
                cipher_suites,
                compression_methods,
                extensions,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.client_version.serialize(output);
        self.random.serialize(output);
        self.session_id.serialize(output);
        self.cookie.serialize(output);
        output.extend_from_slice(&(self.cipher_suites.len() as u16 * 2).to_be_bytes());
        for suite in &self.cipher_suites {
            suite.serialize(output);
        }
        output.push(self.compression_methods.len() as u8);
        for method in &self.compression_methods {
            output.push(method.as_u8());
        }
        Extension::serialize_block(&self.extensions, output);
    }

    /// The fields a stateless cookie commits to: everything the client
    /// sent except the cookie itself (RFC 6347 section 4.2.1).
    pub fn cookie_input(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.client_version.serialize(&mut out);
        self.random.serialize(&mut out);
        self.session_id.serialize(&mut out);
        for suite in &self.cipher_suites {
            suite.serialize(&mut out);
        }
        for method in &self.compression_methods {
            out.push(method.as_u8());
        }
        out
    }
}
