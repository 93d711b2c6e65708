//! Credential interfaces consumed by the handshake, plus an in-memory
//! implementation for tests and simple deployments.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use parking_lot::Mutex;

use crate::message::PskIdentity;

/// Key material and trust decisions the handshake delegates.
///
/// Implementations may block (a remote PSK store); lookups run on the
/// connection's worker task, and retransmission timers live on the timer
/// service, so a slow lookup never stalls them.
pub trait CredentialStore: Send + Sync {
    /// Resolve a PSK identity to its secret. `None` for unknown
    /// identities, which fail the handshake at Finished verification.
    fn lookup_psk(&self, identity: &PskIdentity) -> Option<Vec<u8>>;

    /// The PSK identity a client presents to this peer.
    fn psk_identity_for(&self, peer: SocketAddr) -> Option<PskIdentity> {
        let _ = peer;
        None
    }

    /// Validate an X.509 certificate chain (leaf first).
    fn verify_cert_chain(&self, chain: &[Vec<u8>]) -> Result<(), String> {
        let _ = chain;
        Err("no trust anchors configured".to_string())
    }

    /// Trusted raw public keys (SubjectPublicKeyInfo, DER).
    fn trusted_rpks(&self) -> Vec<Vec<u8>> {
        Vec::new()
    }

    /// Own certificate chain (leaf first) and PKCS#8 private key, for
    /// suites where this endpoint authenticates with a certificate.
    fn own_certificate(&self) -> Option<(Vec<Vec<u8>>, Vec<u8>)> {
        None
    }
}

/// In-memory credential store.
///
/// Supports an injectable lookup latency so tests can exercise the
/// retransmission timers against a slow PSK backend.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    psks: Mutex<HashMap<PskIdentity, Vec<u8>>>,
    client_identity: Mutex<Option<PskIdentity>>,
    trusted_rpks: Mutex<Vec<Vec<u8>>>,
    own_certificate: Mutex<Option<(Vec<Vec<u8>>, Vec<u8>)>>,
    trust_any_certificate: Mutex<bool>,
    lookup_delay: Mutex<Duration>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a PSK identity and its secret.
    pub fn add_psk(&self, identity: impl Into<PskIdentity>, secret: impl Into<Vec<u8>>) -> &Self {
        self.psks.lock().insert(identity.into(), secret.into());
        self
    }

    /// The identity this endpoint presents when acting as a client.
    pub fn set_client_identity(&self, identity: impl Into<PskIdentity>) -> &Self {
        *self.client_identity.lock() = Some(identity.into());
        self
    }

    /// Trust a raw public key (SubjectPublicKeyInfo, DER).
    pub fn add_trusted_rpk(&self, spki: Vec<u8>) -> &Self {
        self.trusted_rpks.lock().push(spki);
        self
    }

    /// Set this endpoint's certificate chain and private key.
    pub fn set_own_certificate(&self, chain: Vec<Vec<u8>>, private_key: Vec<u8>) -> &Self {
        *self.own_certificate.lock() = Some((chain, private_key));
        self
    }

    /// Accept any syntactically valid X.509 chain. For tests.
    pub fn trust_any_certificate(&self) -> &Self {
        *self.trust_any_certificate.lock() = true;
        self
    }

    /// Delay every `lookup_psk` by `delay`, emulating a remote store.
    pub fn set_lookup_delay(&self, delay: Duration) -> &Self {
        *self.lookup_delay.lock() = delay;
        self
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn lookup_psk(&self, identity: &PskIdentity) -> Option<Vec<u8>> {
        let delay = *self.lookup_delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.psks.lock().get(identity).cloned()
    }

    fn psk_identity_for(&self, _peer: SocketAddr) -> Option<PskIdentity> {
        self.client_identity.lock().clone()
    }

    fn verify_cert_chain(&self, chain: &[Vec<u8>]) -> Result<(), String> {
        if chain.is_empty() {
            return Err("empty certificate chain".to_string());
        }
        if *self.trust_any_certificate.lock() {
            return Ok(());
        }
        Err("no trust anchors configured".to_string())
    }

    fn trusted_rpks(&self) -> Vec<Vec<u8>> {
        self.trusted_rpks.lock().clone()
    }

    fn own_certificate(&self) -> Option<(Vec<Vec<u8>>, Vec<u8>)> {
        self.own_certificate.lock().clone()
    }
}
