//! Established-session state: negotiated parameters, key block, epochs,
//! sequence counters and record protection.

use std::net::SocketAddr;

use crate::buffer::Buf;
use crate::crypto::{self, Aad, Nonce};
use crate::message::{CipherKind, CipherSuite, ContentType, DtlsRecord};
use crate::message::{ProtocolVersion, PskIdentity, Sequence, SessionId};
use crate::util::put_u48;
use crate::window::ReplayWindow;
use crate::Error;

/// How the peer authenticated itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerIdentity {
    /// PSK identity presented in the ClientKeyExchange.
    Psk(PskIdentity),
    /// Raw public key: the peer's SubjectPublicKeyInfo (DER).
    RawPublicKey(Vec<u8>),
    /// X.509 certificate chain, leaf first.
    X509(Vec<Vec<u8>>),
    /// The peer was not authenticated (server side before the handshake
    /// reaches the key exchange).
    Unknown,
}

/// The six key-material fields of RFC 5246 section 6.3.
struct KeyBlock {
    client_write_mac_key: Buf,
    server_write_mac_key: Buf,
    client_write_key: Buf,
    server_write_key: Buf,
    client_write_iv: Buf,
    server_write_iv: Buf,
}

impl KeyBlock {
    fn derive(
        suite: CipherSuite,
        master_secret: &[u8],
        client_random: &[u8],
        server_random: &[u8],
    ) -> KeyBlock {
        let mac_len = suite.mac_key_len();
        let key_len = suite.enc_key_len();
        let iv_len = suite.fixed_iv_len();
        let total = 2 * (mac_len + key_len + iv_len);

        let material = crypto::key_expansion(master_secret, client_random, server_random, total);
        let mut at = 0usize;
        let mut split = |len: usize| {
            let part = Buf::from(&material[at..at + len]);
            at += len;
            part
        };

        KeyBlock {
            client_write_mac_key: split(mac_len),
            server_write_mac_key: split(mac_len),
            client_write_key: split(key_len),
            server_write_key: split(key_len),
            client_write_iv: split(iv_len),
            server_write_iv: split(iv_len),
        }
    }
}

/// Per-peer session: cryptographic parameters negotiated by a handshake
/// plus the record protection state of the established epochs.
///
/// Created when a handshake starts, armed with keys at ChangeCipherSpec,
/// and marked established once the Finished exchange verifies.
pub struct Session {
    peer: SocketAddr,
    id: SessionId,
    suite: CipherSuite,
    is_client: bool,
    master_secret: Buf,
    keys: Option<KeyBlock>,
    peer_identity: PeerIdentity,
    established: bool,

    write_epoch: u16,
    write_seq: u64,
    read_epoch: u16,
    replay: ReplayWindow,
}

impl Session {
    pub fn new(peer: SocketAddr, is_client: bool) -> Session {
        Session {
            peer,
            id: SessionId::empty(),
            suite: CipherSuite::PSK_AES128_CCM_8,
            is_client,
            master_secret: Buf::new(),
            keys: None,
            peer_identity: PeerIdentity::Unknown,
            established: false,
            write_epoch: 1,
            write_seq: 0,
            read_epoch: 1,
            replay: ReplayWindow::new(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn set_id(&mut self, id: SessionId) {
        self.id = id;
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn set_cipher_suite(&mut self, suite: CipherSuite) {
        self.suite = suite;
    }

    pub fn peer_identity(&self) -> &PeerIdentity {
        &self.peer_identity
    }

    pub fn set_peer_identity(&mut self, identity: PeerIdentity) {
        self.peer_identity = identity;
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn set_established(&mut self) {
        self.established = true;
    }

    pub fn master_secret(&self) -> &[u8] {
        &self.master_secret
    }

    pub fn set_master_secret(&mut self, master_secret: &[u8]) {
        self.master_secret = Buf::from(master_secret);
    }

    pub fn read_epoch(&self) -> u16 {
        self.read_epoch
    }

    pub fn write_epoch(&self) -> u16 {
        self.write_epoch
    }

    /// Derive the key block from the master secret and both randoms
    /// (RFC 5246 section 6.3). Must run before the first protected record
    /// in either direction.
    pub fn derive_keys(&mut self, client_random: &[u8], server_random: &[u8]) {
        self.keys = Some(KeyBlock::derive(
            self.suite,
            &self.master_secret,
            client_random,
            server_random,
        ));
    }

    pub fn keys_derived(&self) -> bool {
        self.keys.is_some()
    }

    /// Protect a payload into a full wire record at the current write
    /// epoch, consuming one sequence number.
    ///
    /// Fails with [`Error::SeqExhausted`] when the 48-bit sequence number
    /// space is used up; RFC 6347 requires a new handshake at that point.
    pub fn encrypt_record(
        &mut self,
        content_type: ContentType,
        payload: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if self.write_seq >= Sequence::MAX_SEQUENCE_NUMBER {
            return Err(Error::SeqExhausted);
        }

        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| Error::Crypto("keys not derived".into()))?;

        let sequence = Sequence {
            epoch: self.write_epoch,
            sequence_number: self.write_seq,
        };
        self.write_seq += 1;

        let (mac_key, enc_key, iv) = if self.is_client {
            (
                &keys.client_write_mac_key,
                &keys.client_write_key,
                &keys.client_write_iv,
            )
        } else {
            (
                &keys.server_write_mac_key,
                &keys.server_write_key,
                &keys.server_write_iv,
            )
        };

        let mut fragment = Buf::from(payload);
        let aad = Aad::new(content_type, sequence, payload.len() as u16);

        match self.suite.kind() {
            CipherKind::Aead { .. } => {
                // Explicit nonce: epoch || sequence_number, unique per key.
                let mut explicit = Vec::with_capacity(8);
                explicit.extend_from_slice(&sequence.epoch.to_be_bytes());
                put_u48(&mut explicit, sequence.sequence_number);

                let nonce = Nonce::new(iv, &explicit);
                crypto::aead_seal(self.suite, enc_key, nonce, aad, &mut fragment)?;

                // Prepend the explicit nonce.
                let mut with_nonce = Buf::with_capacity(8 + fragment.len());
                with_nonce.extend_from_slice(&explicit);
                with_nonce.extend_from_slice(&fragment);
                fragment = with_nonce;
            }
            CipherKind::Cbc => {
                crypto::cbc_seal(mac_key, enc_key, aad, &mut fragment)?;
            }
        }

        let record = DtlsRecord {
            content_type,
            version: ProtocolVersion::DTLS1_2,
            sequence,
            length: fragment.len() as u16,
            fragment: &fragment,
        };

        let mut out = Vec::with_capacity(DtlsRecord::HEADER_LEN + fragment.len());
        record.serialize(&mut out);
        Ok(out)
    }

    /// Unprotect an inbound record at the current read epoch.
    ///
    /// The anti-replay window is consulted first and advanced only after
    /// the record authenticates, so unauthenticated traffic cannot move
    /// it. Replayed records fail with [`Error::ReplayDropped`], forged
    /// ones with [`Error::BadRecordMac`]; both are silent drops.
    pub fn decrypt_record(&mut self, record: &DtlsRecord) -> Result<Vec<u8>, Error> {
        if record.sequence.epoch != self.read_epoch {
            return Err(Error::UnexpectedMessage(format!(
                "record epoch {} != read epoch {}",
                record.sequence.epoch, self.read_epoch
            )));
        }

        if !self.replay.check(record.sequence.sequence_number) {
            return Err(Error::ReplayDropped);
        }

        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| Error::Crypto("keys not derived".into()))?;

        // Reading direction uses the peer's write keys.
        let (mac_key, enc_key, iv) = if self.is_client {
            (
                &keys.server_write_mac_key,
                &keys.server_write_key,
                &keys.server_write_iv,
            )
        } else {
            (
                &keys.client_write_mac_key,
                &keys.client_write_key,
                &keys.client_write_iv,
            )
        };

        let plaintext = match self.suite.kind() {
            CipherKind::Aead { tag_len } => {
                let explicit_len = self.suite.record_iv_len();
                if record.fragment.len() < explicit_len + tag_len {
                    return Err(Error::BadRecordMac);
                }

                let plaintext_len = record.fragment.len() - explicit_len - tag_len;
                let aad = Aad::new(record.content_type, record.sequence, plaintext_len as u16);
                let nonce = Nonce::new(iv, &record.fragment[..explicit_len]);

                let mut buf = Buf::from(&record.fragment[explicit_len..]);
                crypto::aead_open(self.suite, enc_key, nonce, aad, &mut buf)?;
                buf
            }
            CipherKind::Cbc => {
                let content_type = record.content_type;
                let sequence = record.sequence;

                let mut buf = Buf::from(record.fragment);
                crypto::cbc_open(
                    mac_key,
                    enc_key,
                    |len| Aad::new(content_type, sequence, len),
                    &mut buf,
                )?;
                buf
            }
        };

        self.replay.update(record.sequence.sequence_number);

        Ok(plaintext.into_vec())
    }
}
