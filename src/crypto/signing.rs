//! ECDSA P-256/SHA-256 signing and verification for ServerKeyExchange,
//! plus SubjectPublicKeyInfo extraction from certificates and raw keys.

use der::{Decode, Encode};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::{DecodePrivateKey, EncodePublicKey};
use x509_cert::Certificate;

use crate::message::{EcdhParams, Random};
use crate::Error;

pub use p256::ecdsa::VerifyingKey;

/// The bytes an ECDSA ServerKeyExchange signature covers:
/// client_random || server_random || serialized params
/// (RFC 4492 section 5.4).
pub fn signature_input(
    client_random: &Random,
    server_random: &Random,
    params: &EcdhParams,
) -> Vec<u8> {
    let mut input = Vec::with_capacity(64 + 4 + params.point.len());
    client_random.serialize(&mut input);
    server_random.serialize(&mut input);
    params.serialize(&mut input);
    input
}

/// Sign `message` with a PKCS#8 DER encoded P-256 private key, producing
/// a DER encoded ECDSA signature.
pub fn sign(private_key_der: &[u8], message: &[u8]) -> Result<Vec<u8>, Error> {
    let key = SigningKey::from_pkcs8_der(private_key_der)
        .map_err(|_| Error::Crypto("invalid PKCS#8 private key".into()))?;
    let signature: Signature = key.sign(message);
    Ok(signature.to_der().as_bytes().to_vec())
}

/// Verify a DER encoded ECDSA signature over `message`.
pub fn verify(key: &VerifyingKey, message: &[u8], signature_der: &[u8]) -> Result<(), Error> {
    let signature = Signature::from_der(signature_der)
        .map_err(|_| Error::Security("malformed ECDSA signature".into()))?;
    key.verify(message, &signature)
        .map_err(|_| Error::Security("ECDSA signature verification failed".into()))
}

/// Extract the verifying key from an X.509 certificate (DER).
pub fn verifying_key_from_certificate(certificate_der: &[u8]) -> Result<VerifyingKey, Error> {
    let cert = Certificate::from_der(certificate_der)
        .map_err(|_| Error::Security("malformed certificate".into()))?;
    let spki = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|_| Error::Security("malformed SubjectPublicKeyInfo".into()))?;
    verifying_key_from_spki(&spki)
}

/// Extract the verifying key from a raw SubjectPublicKeyInfo (DER), the
/// RFC 7250 raw-public-key certificate payload.
pub fn verifying_key_from_spki(spki_der: &[u8]) -> Result<VerifyingKey, Error> {
    let spki = spki::SubjectPublicKeyInfoRef::try_from(spki_der)
        .map_err(|_| Error::Security("malformed SubjectPublicKeyInfo".into()))?;
    let point = spki
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| Error::Security("unaligned public key bit string".into()))?;
    VerifyingKey::from_sec1_bytes(point)
        .map_err(|_| Error::Security("unsupported public key".into()))
}

/// The SubjectPublicKeyInfo (DER) of a PKCS#8 private key; what the
/// server presents as its raw public key.
pub fn spki_of_private_key(private_key_der: &[u8]) -> Result<Vec<u8>, Error> {
    let key = SigningKey::from_pkcs8_der(private_key_der)
        .map_err(|_| Error::Crypto("invalid PKCS#8 private key".into()))?;
    let spki = key
        .verifying_key()
        .to_public_key_der()
        .map_err(|_| Error::Crypto("public key encoding failed".into()))?;
    Ok(spki.as_bytes().to_vec())
}
