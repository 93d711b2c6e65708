//! Self-signed certificate generation for ECDHE_ECDSA endpoints.

use rcgen::{
    Certificate as RcgenCertificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    PKCS_ECDSA_P256_SHA256,
};

use crate::Error;

/// Certificate and private key pair.
#[derive(Clone)]
pub struct DtlsIdentity {
    /// Certificate in DER format.
    pub certificate: Vec<u8>,
    /// Private key in PKCS#8 DER format.
    pub private_key: Vec<u8>,
}

/// Generate a self-signed ECDSA P-256 certificate.
///
/// Suitable for raw-public-key deployments and for tests; production
/// X.509 deployments bring their own chain via the credential store.
pub fn generate_self_signed_certificate() -> Result<DtlsIdentity, Error> {
    let key_pair = KeyPair::generate(&PKCS_ECDSA_P256_SHA256)
        .map_err(|e| Error::Crypto(format!("key generation failed: {}", e)))?;

    let mut params = CertificateParams::new(vec!["cadmium".to_string()]);

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::OrganizationName, "cadmium".to_string());
    distinguished_name.push(DnType::CommonName, "cadmium".to_string());
    params.distinguished_name = distinguished_name;

    params.is_ca = IsCa::NoCa;
    params.key_pair = Some(key_pair);

    let not_before = time::OffsetDateTime::now_utc();
    params.not_before = not_before;
    params.not_after = not_before + time::Duration::days(365);

    let cert = RcgenCertificate::from_params(params)
        .map_err(|e| Error::Crypto(format!("certificate generation failed: {}", e)))?;

    let certificate = cert
        .serialize_der()
        .map_err(|e| Error::Crypto(format!("certificate encoding failed: {}", e)))?;
    let private_key = cert.serialize_private_key_der();

    Ok(DtlsIdentity {
        certificate,
        private_key,
    })
}
