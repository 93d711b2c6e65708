use nom::IResult;

use super::extension::find;
use super::{CertificateType, CipherSuite, CompressionMethod, Extension, ExtensionType};
use super::{ExtensionVec, ProtocolVersion, Random, SessionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub server_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuite,
    pub compression_method: CompressionMethod,
    pub extensions: ExtensionVec,
}

impl ServerHello {
    pub fn new(random: Random, session_id: SessionId, cipher_suite: CipherSuite) -> Self {
        ServerHello {
            server_version: ProtocolVersion::DTLS1_2,
            random,
            session_id,
            cipher_suite,
            compression_method: CompressionMethod::Null,
            extensions: ExtensionVec::new(),
        }
    }

    /// The certificate type the server selected, defaulting to X.509 when
    /// the extension is absent.
    pub fn server_certificate_type(&self) -> CertificateType {
        find(&self.extensions, ExtensionType::ServerCertificateType)
            .and_then(|e| e.as_certificate_type_selection())
            .unwrap_or(CertificateType::X509)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ServerHello> {
        let (input, server_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;
        let (input, cipher_suite) = CipherSuite::parse(input)?;
        let (input, compression_method) = CompressionMethod::parse(input)?;
        let (input, extensions) = Extension::parse_block(input)?;

        Ok((
            input,
            ServerHello {
                server_version,
                random,
                session_id,
                cipher_suite,
                compression_method,
                extensions,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.server_version.serialize(output);
        self.random.serialize(output);
        self.session_id.serialize(output);
        self.cipher_suite.serialize(output);
        output.push(self.compression_method.as_u8());
        Extension::serialize_block(&self.extensions, output);
    }
}
