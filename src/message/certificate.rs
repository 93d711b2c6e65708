use nom::bytes::complete::take;
use nom::IResult;

use crate::util::{be_u24, put_u24};

use super::CertificateType;

/// Certificate message payload: either an X.509 chain (leaf first) or a
/// raw public key (RFC 7250, a bare SubjectPublicKeyInfo).
///
/// Both forms use the same outer encoding, a 3-byte total length followed
/// by 3-byte length-prefixed entries; the RPK form has exactly one entry
/// holding the SubjectPublicKeyInfo instead of a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificatePayload {
    X509 { chain: Vec<Vec<u8>> },
    RawPublicKey { spki: Vec<u8> },
}

impl CertificatePayload {
    pub fn parse(input: &[u8], certificate_type: CertificateType) -> IResult<&[u8], Self> {
        let (input, total_len) = be_u24(input)?;
        let (input, mut entries) = take(total_len as usize)(input)?;

        let mut chain = Vec::new();
        while !entries.is_empty() {
            let (rest, len) = be_u24(entries)?;
            let (rest, entry) = take(len as usize)(rest)?;
            chain.push(entry.to_vec());
            entries = rest;
        }

        let payload = match certificate_type {
            CertificateType::RawPublicKey => CertificatePayload::RawPublicKey {
                spki: chain.into_iter().next().unwrap_or_default(),
            },
            _ => CertificatePayload::X509 { chain },
        };

        Ok((input, payload))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        let entries: Vec<&[u8]> = match self {
            CertificatePayload::X509 { chain } => chain.iter().map(|c| c.as_slice()).collect(),
            CertificatePayload::RawPublicKey { spki } => vec![spki.as_slice()],
        };

        let total: usize = entries.iter().map(|e| 3 + e.len()).sum();
        put_u24(output, total as u32);
        for entry in entries {
            put_u24(output, entry.len() as u32);
            output.extend_from_slice(entry);
        }
    }

    /// The key material the handshake verifies signatures against: the
    /// leaf certificate DER or the raw SubjectPublicKeyInfo.
    pub fn leaf(&self) -> Option<&[u8]> {
        match self {
            CertificatePayload::X509 { chain } => chain.first().map(|c| c.as_slice()),
            CertificatePayload::RawPublicKey { spki } => Some(spki),
        }
    }
}
