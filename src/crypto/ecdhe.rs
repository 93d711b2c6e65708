use elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;

use crate::message::NamedCurve;
use crate::Error;

/// An ephemeral ECDH key pair on one of the supported named curves.
///
/// The public point is kept in uncompressed SEC1 encoding, the only point
/// format the connector offers.
pub struct EcdheKeyPair {
    curve: NamedCurve,
    secret: Secret,
    public_point: Vec<u8>,
}

enum Secret {
    P256(p256::ecdh::EphemeralSecret),
    P384(p384::ecdh::EphemeralSecret),
}

impl EcdheKeyPair {
    /// Generate a fresh ephemeral key pair on `curve`.
    pub fn generate(curve: NamedCurve) -> Result<Self, Error> {
        let (secret, public_point) = match curve {
            NamedCurve::Secp256r1 => {
                let secret = p256::ecdh::EphemeralSecret::random(&mut OsRng);
                let point = secret.public_key().to_encoded_point(false).as_bytes().to_vec();
                (Secret::P256(secret), point)
            }
            NamedCurve::Secp384r1 => {
                let secret = p384::ecdh::EphemeralSecret::random(&mut OsRng);
                let point = secret.public_key().to_encoded_point(false).as_bytes().to_vec();
                (Secret::P384(secret), point)
            }
            NamedCurve::Unknown(id) => {
                return Err(Error::Crypto(format!("unsupported curve {}", id)));
            }
        };

        Ok(EcdheKeyPair {
            curve,
            secret,
            public_point,
        })
    }

    pub fn curve(&self) -> NamedCurve {
        self.curve
    }

    /// The public point in uncompressed SEC1 encoding.
    pub fn public_point(&self) -> &[u8] {
        &self.public_point
    }

    /// Derive the shared secret from the peer's public point.
    ///
    /// The x-coordinate of the shared point, per RFC 4492 section 5.10.
    pub fn derive(&self, peer_point: &[u8]) -> Result<Vec<u8>, Error> {
        match &self.secret {
            Secret::P256(secret) => {
                let peer = p256::PublicKey::from_sec1_bytes(peer_point)
                    .map_err(|_| Error::Crypto("invalid peer ECDH point".into()))?;
                let shared = secret.diffie_hellman(&peer);
                Ok(shared.raw_secret_bytes().to_vec())
            }
            Secret::P384(secret) => {
                let peer = p384::PublicKey::from_sec1_bytes(peer_point)
                    .map_err(|_| Error::Crypto("invalid peer ECDH point".into()))?;
                let shared = secret.diffie_hellman(&peer);
                Ok(shared.raw_secret_bytes().to_vec())
            }
        }
    }
}
