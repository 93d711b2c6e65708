use arrayvec::ArrayVec;
use nom::bytes::complete::take;
use nom::error::{Error as NomError, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

use super::ExtensionVec;

/// Named elliptic curve (RFC 4492 section 5.1.1, "supported groups").
///
/// Only named curves are representable; the explicit prime/char2 curve
/// encodings are rejected at the ServerKeyExchange parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedCurve {
    Secp256r1,
    Secp384r1,
    Unknown(u16),
}

impl NamedCurve {
    pub fn from_u16(value: u16) -> Self {
        match value {
            23 => NamedCurve::Secp256r1,
            24 => NamedCurve::Secp384r1,
            _ => NamedCurve::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            NamedCurve::Secp256r1 => 23,
            NamedCurve::Secp384r1 => 24,
            NamedCurve::Unknown(value) => *value,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, NamedCurve::Unknown(_))
    }

    pub fn supported() -> &'static [NamedCurve] {
        &[NamedCurve::Secp256r1, NamedCurve::Secp384r1]
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], NamedCurve> {
        let (input, value) = be_u16(input)?;
        Ok((input, Self::from_u16(value)))
    }
}

/// Certificate type for the client/server_certificate_type extensions
/// (RFC 7250).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateType {
    X509,
    RawPublicKey,
    Unknown(u8),
}

impl CertificateType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => CertificateType::X509,
            2 => CertificateType::RawPublicKey,
            _ => CertificateType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            CertificateType::X509 => 0,
            CertificateType::RawPublicKey => 2,
            CertificateType::Unknown(value) => *value,
        }
    }
}

/// Hello extension type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionType {
    MaxFragmentLength,
    SupportedGroups,
    EcPointFormats,
    ClientCertificateType,
    ServerCertificateType,
    Unknown(u16),
}

impl ExtensionType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => ExtensionType::MaxFragmentLength,
            10 => ExtensionType::SupportedGroups,
            11 => ExtensionType::EcPointFormats,
            19 => ExtensionType::ClientCertificateType,
            20 => ExtensionType::ServerCertificateType,
            _ => ExtensionType::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ExtensionType::MaxFragmentLength => 1,
            ExtensionType::SupportedGroups => 10,
            ExtensionType::EcPointFormats => 11,
            ExtensionType::ClientCertificateType => 19,
            ExtensionType::ServerCertificateType => 20,
            ExtensionType::Unknown(value) => *value,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, ExtensionType::Unknown(_))
    }
}

/// A hello extension: type id plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub extension_type: ExtensionType,
    pub data: Vec<u8>,
}

impl Extension {
    /// supported_groups listing our named curves.
    pub fn supported_groups(curves: &[NamedCurve]) -> Extension {
        let mut data = Vec::with_capacity(2 + curves.len() * 2);
        data.extend_from_slice(&((curves.len() * 2) as u16).to_be_bytes());
        for curve in curves {
            data.extend_from_slice(&curve.as_u16().to_be_bytes());
        }
        Extension {
            extension_type: ExtensionType::SupportedGroups,
            data,
        }
    }

    /// ec_point_formats offering the uncompressed encoding only.
    pub fn ec_point_formats() -> Extension {
        Extension {
            extension_type: ExtensionType::EcPointFormats,
            data: vec![0x01, 0x00],
        }
    }

    /// client/server_certificate_type offer (client side, a list).
    pub fn certificate_type_offer(
        extension_type: ExtensionType,
        types: &[CertificateType],
    ) -> Extension {
        let mut data = Vec::with_capacity(1 + types.len());
        data.push(types.len() as u8);
        for t in types {
            data.push(t.as_u8());
        }
        Extension {
            extension_type,
            data,
        }
    }

    /// client/server_certificate_type selection (server side, one value).
    pub fn certificate_type_selection(
        extension_type: ExtensionType,
        selected: CertificateType,
    ) -> Extension {
        Extension {
            extension_type,
            data: vec![selected.as_u8()],
        }
    }

    /// Curves listed in a supported_groups payload.
    pub fn as_supported_groups(&self) -> Option<Vec<NamedCurve>> {
        if self.extension_type != ExtensionType::SupportedGroups {
            return None;
        }
        let (rest, len) = be_u16::<_, NomError<&[u8]>>(&self.data[..]).ok()?;
        if rest.len() != len as usize || len % 2 != 0 {
            return None;
        }
        let mut curves = Vec::with_capacity(len as usize / 2);
        let mut input = rest;
        while !input.is_empty() {
            let (next, curve) = NamedCurve::parse(input).ok()?;
            curves.push(curve);
            input = next;
        }
        Some(curves)
    }

    /// Certificate types in an offer payload (list form).
    pub fn as_certificate_type_offer(&self) -> Option<Vec<CertificateType>> {
        let (rest, len) = be_u8::<_, NomError<&[u8]>>(&self.data[..]).ok()?;
        if rest.len() != len as usize {
            return None;
        }
        Some(rest.iter().map(|b| CertificateType::from_u8(*b)).collect())
    }

    /// Certificate type in a selection payload (single value form).
    pub fn as_certificate_type_selection(&self) -> Option<CertificateType> {
        if self.data.len() != 1 {
            return None;
        }
        Some(CertificateType::from_u8(self.data[0]))
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Extension> {
        let (input, extension_type) = be_u16(input)?;
        let (input, len) = be_u16(input)?;
        let (input, data) = take(len as usize)(input)?;
        Ok((
            input,
            Extension {
                extension_type: ExtensionType::from_u16(extension_type),
                data: data.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.extension_type.as_u16().to_be_bytes());
        output.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        output.extend_from_slice(&self.data);
    }

    /// Parse a hello message's optional extensions block. Absent block
    /// yields an empty list; unknown extension types are skipped.
    pub fn parse_block(input: &[u8]) -> IResult<&[u8], ExtensionVec> {
        let mut extensions = ArrayVec::new();

        if input.is_empty() {
            return Ok((input, extensions));
        }

        let (input, block_len) = be_u16(input)?;
        let (input, mut block) = take(block_len as usize)(input)?;

        while !block.is_empty() {
            let before = block.len();
            let (rest, ext) = Extension::parse(block)?;
            if rest.len() == before {
                return Err(Err::Failure(NomError::new(rest, ErrorKind::LengthValue)));
            }
            if ext.extension_type.is_supported() && !extensions.is_full() {
                extensions.push(ext);
            }
            block = rest;
        }

        Ok((input, extensions))
    }

    /// Serialize an extensions block; writes nothing when empty.
    pub fn serialize_block(extensions: &[Extension], output: &mut Vec<u8>) {
        if extensions.is_empty() {
            return;
        }

        let block_len: usize = extensions.iter().map(|e| 4 + e.data.len()).sum();
        output.extend_from_slice(&(block_len as u16).to_be_bytes());
        for ext in extensions {
            ext.serialize(output);
        }
    }
}

/// Find an extension of the given type.
pub fn find<'a>(extensions: &'a [Extension], t: ExtensionType) -> Option<&'a Extension> {
    extensions.iter().find(|e| e.extension_type == t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_groups_roundtrip() {
        let ext = Extension::supported_groups(NamedCurve::supported());
        let mut out = Vec::new();
        ext.serialize(&mut out);

        let (rest, parsed) = Extension::parse(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed, ext);
        assert_eq!(
            parsed.as_supported_groups().unwrap(),
            vec![NamedCurve::Secp256r1, NamedCurve::Secp384r1]
        );
    }

    #[test]
    fn certificate_type_forms() {
        let offer = Extension::certificate_type_offer(
            ExtensionType::ServerCertificateType,
            &[CertificateType::RawPublicKey, CertificateType::X509],
        );
        assert_eq!(
            offer.as_certificate_type_offer().unwrap(),
            vec![CertificateType::RawPublicKey, CertificateType::X509]
        );

        let selection = Extension::certificate_type_selection(
            ExtensionType::ServerCertificateType,
            CertificateType::RawPublicKey,
        );
        assert_eq!(
            selection.as_certificate_type_selection().unwrap(),
            CertificateType::RawPublicKey
        );
    }

    #[test]
    fn block_roundtrip_skips_unknown() {
        let known = Extension::ec_point_formats();
        let unknown = Extension {
            extension_type: ExtensionType::Unknown(0xFF01),
            data: vec![0xAB],
        };

        let mut out = Vec::new();
        Extension::serialize_block(&[known.clone(), unknown], &mut out);

        let (rest, parsed) = Extension::parse_block(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0], known);
    }

    #[test]
    fn empty_block_is_absent() {
        let (rest, parsed) = Extension::parse_block(&[]).unwrap();
        assert!(rest.is_empty());
        assert!(parsed.is_empty());

        let mut out = Vec::new();
        Extension::serialize_block(&[], &mut out);
        assert!(out.is_empty());
    }
}
