//! MAC-then-encrypt record protection for the AES-128-CBC + HMAC-SHA256
//! suites (RFC 5246 section 6.2.3.2).

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::Aad;
use crate::buffer::Buf;
use crate::Error;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

const BLOCK_LEN: usize = 16;
const MAC_LEN: usize = 32;

/// Protect `buf` in place: MAC over aad || plaintext, TLS padding, CBC
/// encryption under a fresh random explicit IV which is prepended.
pub fn seal(mac_key: &[u8], enc_key: &[u8], aad: Aad, buf: &mut Buf) -> Result<(), Error> {
    // MAC = HMAC(mac_key, seq || type || version || length || plaintext)
    let mut mac = HmacSha256::new_from_slice(mac_key)
        .map_err(|_| Error::Crypto("bad MAC key length".into()))?;
    mac.update(aad.as_slice());
    mac.update(buf);
    let tag = mac.finalize().into_bytes();
    buf.extend_from_slice(&tag);

    // TLS padding: padding_length + 1 bytes, each holding padding_length.
    let padding_length = BLOCK_LEN - 1 - (buf.len() % BLOCK_LEN);
    for _ in 0..=padding_length {
        buf.push(padding_length as u8);
    }

    let mut iv = [0u8; BLOCK_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let enc = Aes128CbcEnc::new_from_slices(enc_key, &iv)
        .map_err(|_| Error::Crypto("bad CBC key length".into()))?;
    let len = buf.len();
    enc.encrypt_padded_mut::<NoPadding>(&mut buf[..], len)
        .map_err(|_| Error::Crypto("CBC encrypt failed".into()))?;

    // Prepend the explicit IV.
    let mut with_iv = Buf::with_capacity(BLOCK_LEN + buf.len());
    with_iv.extend_from_slice(&iv);
    with_iv.extend_from_slice(buf);
    *buf = with_iv;

    Ok(())
}

/// Unprotect `buf` (explicit IV || ciphertext) in place, verifying padding
/// and MAC.
///
/// Every failure mode collapses into [`Error::BadRecordMac`]; padding and
/// MAC are both checked before reporting so the error is not a padding
/// oracle, and the MAC comparison itself is constant time.
pub fn open(mac_key: &[u8], enc_key: &[u8], aad_for: impl Fn(u16) -> Aad, buf: &mut Buf) -> Result<(), Error> {
    if buf.len() < BLOCK_LEN + MAC_LEN + 1 || (buf.len() - BLOCK_LEN) % BLOCK_LEN != 0 {
        return Err(Error::BadRecordMac);
    }

    let iv: [u8; BLOCK_LEN] = buf[..BLOCK_LEN].try_into().unwrap();
    buf.drain(..BLOCK_LEN);

    let dec = Aes128CbcDec::new_from_slices(enc_key, &iv)
        .map_err(|_| Error::Crypto("bad CBC key length".into()))?;
    dec.decrypt_padded_mut::<NoPadding>(&mut buf[..])
        .map_err(|_| Error::BadRecordMac)?;

    // Validate TLS padding: the final byte gives the count of further
    // padding bytes, all holding the same value.
    let padding_length = buf[buf.len() - 1] as usize;
    if buf.len() < padding_length + 1 + MAC_LEN {
        return Err(Error::BadRecordMac);
    }
    let content_end = buf.len() - padding_length - 1;
    let mut padding_ok = 1u8;
    for b in &buf[content_end..] {
        padding_ok &= (*b == padding_length as u8) as u8;
    }

    let plaintext_len = content_end - MAC_LEN;
    let aad = aad_for(plaintext_len as u16);

    let mut mac = HmacSha256::new_from_slice(mac_key)
        .map_err(|_| Error::Crypto("bad MAC key length".into()))?;
    mac.update(aad.as_slice());
    mac.update(&buf[..plaintext_len]);
    let expected = mac.finalize().into_bytes();

    let mac_ok: bool = expected
        .ct_eq(&buf[plaintext_len..content_end])
        .into();

    if padding_ok != 1 || !mac_ok {
        return Err(Error::BadRecordMac);
    }

    buf.truncate(plaintext_len);
    Ok(())
}
