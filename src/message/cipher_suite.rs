use nom::number::complete::be_u16;
use nom::IResult;

/// Key exchange algorithm of a cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchange {
    Psk,
    EcdhePsk,
    EcdheEcdsa,
}

/// Bulk cipher construction of a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    /// AEAD with an 8-byte explicit nonce and the given tag length.
    Aead { tag_len: usize },
    /// AES-CBC with HMAC-SHA256, MAC-then-encrypt, explicit 16-byte IV.
    Cbc,
}

/// Supported DTLS 1.2 cipher suites.
///
/// All suites use SHA-256 as the PRF hash (RFC 5246 section 5, RFC 6655).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum CipherSuite {
    PSK_AES128_CCM_8,
    PSK_AES128_CCM,
    PSK_AES128_GCM_SHA256,
    PSK_AES128_CBC_SHA256,
    ECDHE_PSK_AES128_CBC_SHA256,
    ECDHE_ECDSA_AES128_CCM_8,
    ECDHE_ECDSA_AES128_GCM_SHA256,
    Unknown(u16),
}

impl CipherSuite {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0xC0A8 => CipherSuite::PSK_AES128_CCM_8,
            0xC0A4 => CipherSuite::PSK_AES128_CCM,
            0x00A8 => CipherSuite::PSK_AES128_GCM_SHA256,
            0x00AE => CipherSuite::PSK_AES128_CBC_SHA256,
            0xC037 => CipherSuite::ECDHE_PSK_AES128_CBC_SHA256,
            0xC0AE => CipherSuite::ECDHE_ECDSA_AES128_CCM_8,
            0xC02B => CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
            _ => CipherSuite::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CipherSuite::PSK_AES128_CCM_8 => 0xC0A8,
            CipherSuite::PSK_AES128_CCM => 0xC0A4,
            CipherSuite::PSK_AES128_GCM_SHA256 => 0x00A8,
            CipherSuite::PSK_AES128_CBC_SHA256 => 0x00AE,
            CipherSuite::ECDHE_PSK_AES128_CBC_SHA256 => 0xC037,
            CipherSuite::ECDHE_ECDSA_AES128_CCM_8 => 0xC0AE,
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256 => 0xC02B,
            CipherSuite::Unknown(value) => *value,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, CipherSuite::Unknown(_))
    }

    /// Default suite preference: PSK with the smallest records first, the
    /// natural order for constrained peers.
    pub fn default_suites() -> Vec<CipherSuite> {
        vec![
            CipherSuite::PSK_AES128_CCM_8,
            CipherSuite::PSK_AES128_GCM_SHA256,
            CipherSuite::PSK_AES128_CBC_SHA256,
            CipherSuite::ECDHE_PSK_AES128_CBC_SHA256,
            CipherSuite::ECDHE_ECDSA_AES128_CCM_8,
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
        ]
    }

    pub fn key_exchange(&self) -> KeyExchange {
        match self {
            CipherSuite::PSK_AES128_CCM_8
            | CipherSuite::PSK_AES128_CCM
            | CipherSuite::PSK_AES128_GCM_SHA256
            | CipherSuite::PSK_AES128_CBC_SHA256 => KeyExchange::Psk,
            CipherSuite::ECDHE_PSK_AES128_CBC_SHA256 => KeyExchange::EcdhePsk,
            CipherSuite::ECDHE_ECDSA_AES128_CCM_8
            | CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256 => KeyExchange::EcdheEcdsa,
            CipherSuite::Unknown(_) => KeyExchange::Psk,
        }
    }

    pub fn kind(&self) -> CipherKind {
        match self {
            CipherSuite::PSK_AES128_CCM_8 | CipherSuite::ECDHE_ECDSA_AES128_CCM_8 => {
                CipherKind::Aead { tag_len: 8 }
            }
            CipherSuite::PSK_AES128_CCM => CipherKind::Aead { tag_len: 16 },
            CipherSuite::PSK_AES128_GCM_SHA256
            | CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256 => CipherKind::Aead { tag_len: 16 },
            CipherSuite::PSK_AES128_CBC_SHA256
            | CipherSuite::ECDHE_PSK_AES128_CBC_SHA256 => CipherKind::Cbc,
            CipherSuite::Unknown(_) => CipherKind::Aead { tag_len: 16 },
        }
    }

    /// MAC key length of the key block. Zero for AEAD suites.
    pub fn mac_key_len(&self) -> usize {
        match self.kind() {
            CipherKind::Aead { .. } => 0,
            CipherKind::Cbc => 32, // HMAC-SHA256
        }
    }

    /// Bulk encryption key length. AES-128 throughout.
    pub fn enc_key_len(&self) -> usize {
        16
    }

    /// Length of the implicit (fixed) IV part of the key block.
    pub fn fixed_iv_len(&self) -> usize {
        match self.kind() {
            CipherKind::Aead { .. } => 4,
            CipherKind::Cbc => 0, // CBC uses a per-record explicit IV only
        }
    }

    /// Length of the per-record explicit IV/nonce on the wire.
    pub fn record_iv_len(&self) -> usize {
        match self.kind() {
            CipherKind::Aead { .. } => 8,
            CipherKind::Cbc => 16,
        }
    }

    /// Ciphertext expansion over the plaintext, excluding CBC padding.
    pub fn max_expansion(&self) -> usize {
        match self.kind() {
            CipherKind::Aead { tag_len } => self.record_iv_len() + tag_len,
            // explicit IV + MAC + worst-case padding
            CipherKind::Cbc => self.record_iv_len() + 32 + 16,
        }
    }

    /// Does the server authenticate with a certificate (or RPK)?
    pub fn requires_server_certificate(&self) -> bool {
        self.key_exchange() == KeyExchange::EcdheEcdsa
    }

    /// Does the key exchange involve an ECDHE exchange?
    pub fn uses_ecdhe(&self) -> bool {
        matches!(
            self.key_exchange(),
            KeyExchange::EcdhePsk | KeyExchange::EcdheEcdsa
        )
    }

    /// Does the key exchange involve a pre-shared key?
    pub fn uses_psk(&self) -> bool {
        matches!(self.key_exchange(), KeyExchange::Psk | KeyExchange::EcdhePsk)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], CipherSuite> {
        let (input, value) = be_u16(input)?;
        Ok((input, Self::from_u16(value)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.as_u16().to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_roundtrip() {
        for suite in CipherSuite::default_suites() {
            assert_eq!(CipherSuite::from_u16(suite.as_u16()), suite);
        }
    }

    #[test]
    fn unknown_preserved() {
        let suite = CipherSuite::from_u16(0x1234);
        assert_eq!(suite, CipherSuite::Unknown(0x1234));
        assert_eq!(suite.as_u16(), 0x1234);
        assert!(!suite.is_supported());
    }

    #[test]
    fn key_block_geometry() {
        let ccm8 = CipherSuite::PSK_AES128_CCM_8;
        assert_eq!(ccm8.mac_key_len(), 0);
        assert_eq!(ccm8.enc_key_len(), 16);
        assert_eq!(ccm8.fixed_iv_len(), 4);
        assert_eq!(ccm8.kind(), CipherKind::Aead { tag_len: 8 });

        let cbc = CipherSuite::PSK_AES128_CBC_SHA256;
        assert_eq!(cbc.mac_key_len(), 32);
        assert_eq!(cbc.fixed_iv_len(), 0);
        assert_eq!(cbc.record_iv_len(), 16);
    }

    #[test]
    fn key_exchange_classification() {
        assert!(CipherSuite::PSK_AES128_CCM_8.uses_psk());
        assert!(!CipherSuite::PSK_AES128_CCM_8.uses_ecdhe());
        assert!(CipherSuite::ECDHE_PSK_AES128_CBC_SHA256.uses_psk());
        assert!(CipherSuite::ECDHE_PSK_AES128_CBC_SHA256.uses_ecdhe());
        assert!(CipherSuite::ECDHE_ECDSA_AES128_CCM_8.requires_server_certificate());
        assert!(!CipherSuite::PSK_AES128_GCM_SHA256.requires_server_certificate());
    }
}
