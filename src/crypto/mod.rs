//! Cryptographic primitives: PRF, AEAD and CBC record protection, ECDHE,
//! ECDSA, the stateless cookie HMAC, and pre-master secret construction.

mod aead;
mod cbc;
mod cookie;
mod ecdhe;
mod prf;
mod signing;

pub use aead::{open as aead_open, seal as aead_seal};
pub use cbc::{open as cbc_open, seal as cbc_seal};
pub use cookie::CookieGenerator;
pub use ecdhe::EcdheKeyPair;
pub use prf::{key_expansion, master_secret, prf_sha256, verify_data};
pub use signing::{
    sign, signature_input, spki_of_private_key, verify, verifying_key_from_certificate,
    verifying_key_from_spki, VerifyingKey,
};

use crate::message::{ContentType, ProtocolVersion, Sequence};

/// Length of the implicit (fixed) IV for the AEAD suites.
pub const AEAD_FIXED_IV_LEN: usize = 4;

/// Length of the per-record explicit nonce for the AEAD suites.
pub const AEAD_EXPLICIT_NONCE_LEN: usize = 8;

/// Additional authenticated data for record protection:
/// epoch(2) || seq(6) || type(1) || version(2) || length(2).
///
/// The same 13 bytes prefix the MAC input of the CBC suites, with
/// `length` being the plaintext length in both cases.
#[derive(Debug, Clone, Copy)]
pub struct Aad([u8; 13]);

impl Aad {
    pub fn new(content_type: ContentType, sequence: Sequence, plaintext_len: u16) -> Self {
        let mut bytes = [0u8; 13];
        bytes[..2].copy_from_slice(&sequence.epoch.to_be_bytes());
        bytes[2..8].copy_from_slice(&sequence.sequence_number.to_be_bytes()[2..]);
        bytes[8] = content_type.as_u8();
        bytes[9..11].copy_from_slice(&ProtocolVersion::DTLS1_2.as_u16().to_be_bytes());
        bytes[11..13].copy_from_slice(&plaintext_len.to_be_bytes());
        Aad(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

/// A 12-byte AEAD nonce: 4-byte fixed IV from the key block plus the
/// 8-byte explicit part carried in the record.
#[derive(Debug, Clone, Copy)]
pub struct Nonce([u8; 12]);

impl Nonce {
    pub fn new(fixed_iv: &[u8], explicit: &[u8]) -> Self {
        debug_assert_eq!(fixed_iv.len(), AEAD_FIXED_IV_LEN);
        debug_assert_eq!(explicit.len(), AEAD_EXPLICIT_NONCE_LEN);

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(fixed_iv);
        bytes[4..].copy_from_slice(explicit);
        Nonce(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

/// Pre-master secret for plain PSK key exchange (RFC 4279 section 2):
/// uint16(N) || N zero bytes || uint16(N) || psk.
pub fn psk_pre_master_secret(psk: &[u8]) -> Vec<u8> {
    let n = psk.len();
    let mut out = Vec::with_capacity(4 + 2 * n);
    out.extend_from_slice(&(n as u16).to_be_bytes());
    out.resize(2 + n, 0);
    out.extend_from_slice(&(n as u16).to_be_bytes());
    out.extend_from_slice(psk);
    out
}

/// Pre-master secret for ECDHE_PSK key exchange (RFC 5489 section 2):
/// uint16(len(Z)) || Z || uint16(len(psk)) || psk, with Z the ECDH shared
/// secret.
pub fn ecdhe_psk_pre_master_secret(shared_secret: &[u8], psk: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + shared_secret.len() + psk.len());
    out.extend_from_slice(&(shared_secret.len() as u16).to_be_bytes());
    out.extend_from_slice(shared_secret);
    out.extend_from_slice(&(psk.len() as u16).to_be_bytes());
    out.extend_from_slice(psk);
    out
}
