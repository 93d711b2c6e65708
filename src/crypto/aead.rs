use aes::Aes128;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::Aes128Gcm;
use ccm::consts::{U12, U16, U8};
use ccm::Ccm;

use super::{Aad, Nonce};
use crate::buffer::Buf;
use crate::message::{CipherKind, CipherSuite};
use crate::Error;

type Aes128Ccm = Ccm<Aes128, U16, U12>;
type Aes128Ccm8 = Ccm<Aes128, U8, U12>;

/// Encrypt `buf` in place and append the authentication tag.
pub fn seal(suite: CipherSuite, key: &[u8], nonce: Nonce, aad: Aad, buf: &mut Buf) -> Result<(), Error> {
    let nonce = aes_gcm::Nonce::from_slice(nonce.as_slice());

    let result = match suite.kind() {
        CipherKind::Aead { tag_len: 16 } if is_gcm(suite) => Aes128Gcm::new_from_slice(key)
            .map_err(|_| Error::Crypto("bad AEAD key length".into()))?
            .encrypt_in_place(nonce, aad.as_slice(), buf),
        CipherKind::Aead { tag_len: 16 } => Aes128Ccm::new_from_slice(key)
            .map_err(|_| Error::Crypto("bad AEAD key length".into()))?
            .encrypt_in_place(nonce, aad.as_slice(), buf),
        CipherKind::Aead { tag_len: 8 } => Aes128Ccm8::new_from_slice(key)
            .map_err(|_| Error::Crypto("bad AEAD key length".into()))?
            .encrypt_in_place(nonce, aad.as_slice(), buf),
        _ => return Err(Error::Crypto(format!("{:?} is not an AEAD suite", suite))),
    };

    result.map_err(|_| Error::Crypto("AEAD seal failed".into()))
}

/// Decrypt `buf` (ciphertext plus trailing tag) in place.
///
/// Failure is reported as [`Error::BadRecordMac`], which the record layer
/// treats as a silent drop.
pub fn open(suite: CipherSuite, key: &[u8], nonce: Nonce, aad: Aad, buf: &mut Buf) -> Result<(), Error> {
    let nonce = aes_gcm::Nonce::from_slice(nonce.as_slice());

    let result = match suite.kind() {
        CipherKind::Aead { tag_len: 16 } if is_gcm(suite) => Aes128Gcm::new_from_slice(key)
            .map_err(|_| Error::Crypto("bad AEAD key length".into()))?
            .decrypt_in_place(nonce, aad.as_slice(), buf),
        CipherKind::Aead { tag_len: 16 } => Aes128Ccm::new_from_slice(key)
            .map_err(|_| Error::Crypto("bad AEAD key length".into()))?
            .decrypt_in_place(nonce, aad.as_slice(), buf),
        CipherKind::Aead { tag_len: 8 } => Aes128Ccm8::new_from_slice(key)
            .map_err(|_| Error::Crypto("bad AEAD key length".into()))?
            .decrypt_in_place(nonce, aad.as_slice(), buf),
        _ => return Err(Error::Crypto(format!("{:?} is not an AEAD suite", suite))),
    };

    result.map_err(|_| Error::BadRecordMac)
}

fn is_gcm(suite: CipherSuite) -> bool {
    matches!(
        suite,
        CipherSuite::PSK_AES128_GCM_SHA256 | CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256
    )
}
