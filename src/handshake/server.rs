//! Server side of the DTLS 1.2 handshake, including the stateless
//! cookie exchange.
//!
//! The cookie responder answers uncookied ClientHellos without creating
//! any per-peer state (RFC 6347 section 4.2.1); a [`ServerHandshake`] is
//! only constructed once a ClientHello echoes a valid cookie.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use subtle::ConstantTimeEq;

use crate::credentials::CredentialStore;
use crate::crypto::{self, CookieGenerator, EcdheKeyPair};
use crate::message::{Alert, AlertDescription, BodyContext, CertificateType, CipherSuite};
use crate::message::{CertificatePayload, ClientHello, ClientKeyExchange, CompressionMethod};
use crate::message::{ContentType, DtlsRecord, DtlsRecordSlice, EcdhParams, Extension};
use crate::message::{ExtensionType, Finished, Handshake, HandshakeBody, HelloVerifyRequest};
use crate::message::{KeyExchange, MessageType, NamedCurve, ProtocolVersion, Random};
use crate::message::{Sequence, ServerHello, ServerKeyExchange, SessionId};
use crate::message::{HASH_SHA256, SIG_ECDSA};
use crate::session::PeerIdentity;
use crate::{Config, Error};

use super::{failure, Engine, Inbound, Output, Resumption};

/// A ClientHello extracted from the first record of a datagram, with
/// everything the stateless cookie check and handshaker creation need.
pub struct InitialClientHello {
    pub hello: ClientHello,
    /// The complete handshake message bytes (header plus body), kept for
    /// the Finished transcript.
    pub raw: Vec<u8>,
    pub message_seq: u16,
    pub record_sequence: u64,
}

/// Parse the leading record of a datagram as an epoch-0 ClientHello.
///
/// Returns `Ok(None)` when the record is not a ClientHello; fragmented
/// initial hellos are not accepted.
pub fn parse_initial_client_hello(datagram: &[u8]) -> Result<Option<InitialClientHello>, Error> {
    let Some(slice) = DtlsRecordSlice::try_read(datagram)? else {
        return Ok(None);
    };

    let (_, record) = DtlsRecord::parse(slice.slice)?;
    if record.content_type != ContentType::Handshake || record.sequence.epoch != 0 {
        return Ok(None);
    }

    let (_, handshake) = Handshake::parse(record.fragment)?;
    if handshake.header.msg_type != MessageType::ClientHello || handshake.header.is_fragment() {
        return Ok(None);
    }

    let (rest, hello) = ClientHello::parse(handshake.fragment)?;
    if !rest.is_empty() {
        return Err(Error::decode(
            handshake.fragment.len() - rest.len(),
            "trailing bytes after ClientHello",
        ));
    }

    let mut raw = Vec::with_capacity(12 + handshake.fragment.len());
    Handshake::serialize_message(
        MessageType::ClientHello,
        handshake.header.message_seq,
        handshake.fragment,
        &mut raw,
    );

    Ok(Some(InitialClientHello {
        hello,
        raw,
        message_seq: handshake.header.message_seq,
        record_sequence: record.sequence.sequence_number,
    }))
}

/// Convenience used by the connector and tests: parse the hello and
/// verify its cookie in one step.
pub fn verify_cookie_and_extract(
    responder: &mut HelloVerifyResponder,
    datagram: &[u8],
    peer: SocketAddr,
    now: Instant,
) -> Result<Option<InitialClientHello>, Error> {
    let Some(initial) = parse_initial_client_hello(datagram)? else {
        return Ok(None);
    };

    if responder.cookie_valid(now, peer, &initial.hello) {
        Ok(Some(initial))
    } else {
        Ok(None)
    }
}

/// The stateless HelloVerifyRequest responder.
pub struct HelloVerifyResponder {
    cookies: CookieGenerator,
}

impl HelloVerifyResponder {
    pub fn new(cookie_secret_lifetime: Duration, now: Instant) -> HelloVerifyResponder {
        HelloVerifyResponder {
            cookies: CookieGenerator::new(cookie_secret_lifetime, now),
        }
    }

    /// Does this hello carry a valid cookie for its source address?
    pub fn cookie_valid(&mut self, now: Instant, peer: SocketAddr, hello: &ClientHello) -> bool {
        self.cookies.verify(now, peer, hello)
    }

    /// Build the HelloVerifyRequest datagram answering an uncookied (or
    /// stale-cookied) ClientHello. No state is retained.
    ///
    /// The record sequence number mirrors the ClientHello's, as the
    /// server has no sequence state for this peer yet.
    pub fn hello_verify_datagram(
        &mut self,
        now: Instant,
        peer: SocketAddr,
        initial: &InitialClientHello,
    ) -> Vec<u8> {
        let cookie = self.cookies.generate(now, peer, &initial.hello);
        let hvr = HelloVerifyRequest::new(cookie);

        let mut body = Vec::new();
        hvr.serialize(&mut body);

        let mut fragment = Vec::with_capacity(12 + body.len());
        Handshake::serialize_message(MessageType::HelloVerifyRequest, 0, &body, &mut fragment);

        let record = DtlsRecord {
            content_type: ContentType::Handshake,
            version: ProtocolVersion::DTLS1_0,
            sequence: Sequence {
                epoch: 0,
                sequence_number: initial.record_sequence,
            },
            length: fragment.len() as u16,
            fragment: &fragment,
        };

        let mut out = Vec::with_capacity(DtlsRecord::HEADER_LEN + fragment.len());
        record.serialize(&mut out);
        out
    }
}

pub struct ServerHandshake {
    engine: Engine,
    credentials: Arc<dyn CredentialStore>,
    state: ServerState,

    client_random: Random,
    server_random: Random,
    ecdh_keypair: Option<EcdheKeyPair>,
    client_cert_type: CertificateType,
    resumed: bool,
    /// The peer's ChangeCipherSpec arrived ahead of the messages that
    /// precede it (datagram reordering within a flight).
    early_ccs: bool,

    /// Set when the PSK identity was unknown. The handshake continues
    /// with a random secret and fails at Finished verification, so an
    /// attacker cannot probe which identities exist.
    psk_failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    AwaitClientKeyExchange,
    AwaitCcs,
    AwaitFinished,
    Established,
    Failed,
}

impl ServerHandshake {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<Config>,
        credentials: Arc<dyn CredentialStore>,
        peer: SocketAddr,
        hello: ClientHello,
        hello_raw: Vec<u8>,
        hello_seq: u16,
        hello_record_seq: u64,
        resumable: Option<Resumption>,
        now: Instant,
    ) -> Result<ServerHandshake, Error> {
        let mut engine = Engine::new(config, peer, false);

        // The HelloVerifyRequest consumed our message_seq 0; the peer's
        // next message follows its cookied ClientHello. The HVR's record
        // sequence mirrored one of the client's, strictly below the
        // cookied hello's, so continuing after the latter keeps our
        // record sequence out of the client's replay window.
        engine.set_next_send_seq(1);
        engine.set_next_receive_seq(hello_seq + 1);
        engine.set_epoch0_send_seq(hello_record_seq + 1);
        engine.transcript_add_raw(&hello_raw);

        let mut server = ServerHandshake {
            engine,
            credentials,
            state: ServerState::AwaitClientKeyExchange,
            client_random: hello.random,
            server_random: Random::generate(),
            ecdh_keypair: None,
            client_cert_type: CertificateType::X509,
            resumed: false,
            early_ccs: false,
            psk_failed: false,
        };

        server.process_client_hello(hello, resumable, now)?;
        Ok(server)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn handle_datagram(&mut self, data: &[u8], now: Instant) -> Result<(), Error> {
        if self.state == ServerState::Failed {
            return Ok(());
        }

        let mut retransmitted = false;
        let mut rest = data;
        while let Some(slice) = DtlsRecordSlice::try_read(rest)? {
            rest = slice.rest;

            let mut items = Vec::new();
            let intake = self.engine.intake_record_bytes(slice.slice, &mut items);
            let result = intake.and_then(|_| {
                for item in items {
                    self.process(item, now, &mut retransmitted)?;
                }
                Ok(())
            });

            if let Err(e) = result {
                self.state = ServerState::Failed;
                return Err(e);
            }
        }
        Ok(())
    }

    fn process(
        &mut self,
        item: Inbound,
        now: Instant,
        retransmitted: &mut bool,
    ) -> Result<(), Error> {
        match item {
            Inbound::Message {
                msg_type,
                message_seq,
                body,
            } => self.process_message(msg_type, message_seq, &body, now),
            Inbound::DuplicateFlight => {
                // The peer retransmitted its previous flight; our reply
                // was likely lost. Resend the current flight, bounded by
                // the shared retry budget and at most once per datagram.
                // After establishment only the final flight's sender
                // keeps responding.
                let responds = self.state != ServerState::Established
                    || self.engine.is_final_flight();
                if responds && !*retransmitted {
                    *retransmitted = true;
                    self.engine.retransmit(now)?;
                }
                Ok(())
            }
            Inbound::Ccs => {
                match self.state {
                    ServerState::AwaitCcs => {
                        self.state = ServerState::AwaitFinished;
                    }
                    // Reordered ahead of the ClientKeyExchange.
                    ServerState::AwaitClientKeyExchange => {
                        self.early_ccs = true;
                    }
                    _ => {
                        return Err(Error::UnexpectedMessage(
                            "ChangeCipherSpec out of sequence".to_string(),
                        ));
                    }
                }
                Ok(())
            }
            Inbound::Alert(alert) => {
                self.engine.push_event(Output::PeerAlert(alert));
                if alert.is_fatal() || alert.is_close_notify() {
                    self.state = ServerState::Failed;
                    return Err(Error::PeerClosed(alert));
                }
                Ok(())
            }
            Inbound::AppData(data) => {
                self.engine.push_event(Output::ApplicationData(data));
                Ok(())
            }
        }
    }

    fn process_message(
        &mut self,
        msg_type: MessageType,
        message_seq: u16,
        body: &[u8],
        now: Instant,
    ) -> Result<(), Error> {
        let ctx = BodyContext {
            key_exchange: self.engine.session().cipher_suite().key_exchange(),
            certificate_type: self.client_cert_type,
        };
        let parsed = HandshakeBody::parse(msg_type, body, ctx)?;

        match (self.state, parsed) {
            (ServerState::AwaitClientKeyExchange, HandshakeBody::ClientKeyExchange(cke)) => {
                self.engine.transcript_add(msg_type, message_seq, body);
                self.process_client_key_exchange(cke)?;
                self.state = if self.early_ccs {
                    ServerState::AwaitFinished
                } else {
                    ServerState::AwaitCcs
                };
                Ok(())
            }
            (ServerState::AwaitFinished, HandshakeBody::Finished(finished)) => {
                self.process_client_finished(finished, msg_type, message_seq, body, now)
            }
            (ServerState::Established, HandshakeBody::ClientHello(_)) => {
                // Renegotiation is refused; the session is preserved
                // (RFC 6347 section 4.2.8 keeps epoch-0 hellos out of
                // this path, they never reach an established handshaker).
                debug!("refusing renegotiation (ClientHello on established session)");
                self.engine
                    .queue_alert(Alert::warning(AlertDescription::NoRenegotiation))
            }
            (state, other) => Err(Error::UnexpectedMessage(format!(
                "{:?} in server state {:?}",
                other.msg_type(),
                state
            ))),
        }
    }

    /// Select parameters and send flight 4 (full handshake) or the
    /// abbreviated ServerHello + ChangeCipherSpec + Finished.
    fn process_client_hello(
        &mut self,
        hello: ClientHello,
        resumable: Option<Resumption>,
        now: Instant,
    ) -> Result<(), Error> {
        if !hello
            .compression_methods
            .contains(&CompressionMethod::Null)
        {
            return Err(failure(AlertDescription::HandshakeFailure));
        }

        // Abbreviated flow when the offered session id matches a session
        // we still hold for this peer.
        let resumption = resumable.filter(|r| {
            !hello.session_id.is_empty()
                && r.id == hello.session_id
                && hello.cipher_suites.contains(&r.suite)
        });

        if let Some(resumption) = resumption {
            return self.send_abbreviated_flight(resumption, now);
        }

        let suite = self.select_cipher_suite(&hello)?;
        debug!("selected cipher suite {:?}", suite);

        self.client_cert_type = CertificateType::X509;
        let rpk_offered = hello
            .offered_server_certificate_types()
            .contains(&CertificateType::RawPublicKey);

        let session_id = SessionId::random();
        {
            let session = self.engine.session_mut();
            session.set_cipher_suite(suite);
            session.set_id(session_id.clone());
        }

        let mut sh = ServerHello::new(self.server_random, session_id, suite);

        let server_cert_type = if suite.requires_server_certificate() && rpk_offered {
            CertificateType::RawPublicKey
        } else {
            CertificateType::X509
        };
        if suite.requires_server_certificate() && rpk_offered {
            sh.extensions.push(Extension::certificate_type_selection(
                ExtensionType::ServerCertificateType,
                server_cert_type,
            ));
        }

        self.engine.begin_flight(4);

        let mut body = Vec::new();
        sh.serialize(&mut body);
        self.engine.queue_handshake(0, MessageType::ServerHello, body);

        if suite.requires_server_certificate() {
            self.queue_certificate_and_key_exchange(&hello, server_cert_type)?;
        } else if suite.key_exchange() == KeyExchange::EcdhePsk {
            self.queue_psk_ecdh_key_exchange(&hello)?;
        }

        self.engine
            .queue_handshake(0, MessageType::ServerHelloDone, Vec::new());

        self.state = ServerState::AwaitClientKeyExchange;
        self.engine.send_flight(now, true)
    }

    fn select_cipher_suite(&self, hello: &ClientHello) -> Result<CipherSuite, Error> {
        let have_certificate = self.credentials.own_certificate().is_some();

        for suite in self.engine.config().cipher_suites() {
            if !hello.cipher_suites.contains(suite) {
                continue;
            }
            if suite.requires_server_certificate() && !have_certificate {
                continue;
            }
            return Ok(*suite);
        }

        Err(failure(AlertDescription::HandshakeFailure))
    }

    fn select_curve(&self, hello: &ClientHello) -> NamedCurve {
        hello
            .common_curves()
            .into_iter()
            .next()
            .unwrap_or(NamedCurve::Secp256r1)
    }

    fn queue_certificate_and_key_exchange(
        &mut self,
        hello: &ClientHello,
        server_cert_type: CertificateType,
    ) -> Result<(), Error> {
        let (chain, private_key) = self
            .credentials
            .own_certificate()
            .ok_or_else(|| failure(AlertDescription::HandshakeFailure))?;

        let payload = match server_cert_type {
            CertificateType::RawPublicKey => CertificatePayload::RawPublicKey {
                spki: crypto::spki_of_private_key(&private_key)?,
            },
            _ => CertificatePayload::X509 { chain },
        };

        let mut cert_body = Vec::new();
        payload.serialize(&mut cert_body);
        self.engine
            .queue_handshake(0, MessageType::Certificate, cert_body);

        // Signed ephemeral ECDH parameters.
        let curve = self.select_curve(hello);
        let keypair = EcdheKeyPair::generate(curve)?;
        let params = EcdhParams {
            curve,
            point: keypair.public_point().to_vec(),
        };

        let input = crypto::signature_input(&self.client_random, &self.server_random, &params);
        let signature = crypto::sign(&private_key, &input)?;

        let ske = ServerKeyExchange::EcdheEcdsa {
            params,
            hash_algorithm: HASH_SHA256,
            signature_algorithm: SIG_ECDSA,
            signature,
        };
        let mut ske_body = Vec::new();
        ske.serialize(&mut ske_body);
        self.engine
            .queue_handshake(0, MessageType::ServerKeyExchange, ske_body);

        self.ecdh_keypair = Some(keypair);
        Ok(())
    }

    fn queue_psk_ecdh_key_exchange(&mut self, hello: &ClientHello) -> Result<(), Error> {
        let curve = self.select_curve(hello);
        let keypair = EcdheKeyPair::generate(curve)?;

        let ske = ServerKeyExchange::EcdhePsk {
            hint: crate::message::PskIdentity::new(Vec::new()),
            params: EcdhParams {
                curve,
                point: keypair.public_point().to_vec(),
            },
        };
        let mut ske_body = Vec::new();
        ske.serialize(&mut ske_body);
        self.engine
            .queue_handshake(0, MessageType::ServerKeyExchange, ske_body);

        self.ecdh_keypair = Some(keypair);
        Ok(())
    }

    fn send_abbreviated_flight(
        &mut self,
        resumption: Resumption,
        now: Instant,
    ) -> Result<(), Error> {
        debug!("resuming session {:?}", resumption.id);
        self.resumed = true;

        {
            let session = self.engine.session_mut();
            session.set_cipher_suite(resumption.suite);
            session.set_id(resumption.id.clone());
            session.set_master_secret(&resumption.master_secret);
        }

        let sh = ServerHello::new(self.server_random, resumption.id, resumption.suite);
        let mut body = Vec::new();
        sh.serialize(&mut body);

        self.engine.begin_flight(2);
        self.engine.queue_handshake(0, MessageType::ServerHello, body);

        let client_random = self.client_random;
        let server_random = self.server_random;
        self.engine
            .session_mut()
            .derive_keys(client_random.as_slice(), server_random.as_slice());

        self.engine.queue_ccs();

        let verify_data = crypto::verify_data(
            &resumption.master_secret,
            false,
            self.engine.transcript(),
        );
        let mut finished_body = Vec::new();
        Finished::new(verify_data).serialize(&mut finished_body);
        self.engine
            .queue_handshake(1, MessageType::Finished, finished_body);

        self.state = ServerState::AwaitCcs;
        self.engine.send_flight(now, true)
    }

    fn process_client_key_exchange(&mut self, cke: ClientKeyExchange) -> Result<(), Error> {
        let suite = self.engine.session().cipher_suite();

        let pre_master = match suite.key_exchange() {
            KeyExchange::Psk => {
                let identity = cke.psk_identity().expect("PSK CKE carries identity");
                match self.lookup_psk(identity) {
                    Some(psk) => crypto::psk_pre_master_secret(&psk),
                    None => self.fake_pre_master(),
                }
            }
            KeyExchange::EcdhePsk => {
                let keypair = self
                    .ecdh_keypair
                    .take()
                    .ok_or_else(|| Error::UnexpectedMessage("no ECDH state".to_string()))?;
                let point = cke
                    .ecdh_point()
                    .ok_or_else(|| Error::decode(0, "missing ECDH point"))?;
                let shared = keypair.derive(point)?;

                let identity = cke.psk_identity().expect("ECDHE_PSK CKE carries identity");
                match self.lookup_psk(identity) {
                    Some(psk) => crypto::ecdhe_psk_pre_master_secret(&shared, &psk),
                    None => self.fake_pre_master(),
                }
            }
            KeyExchange::EcdheEcdsa => {
                let keypair = self
                    .ecdh_keypair
                    .take()
                    .ok_or_else(|| Error::UnexpectedMessage("no ECDH state".to_string()))?;
                let point = cke
                    .ecdh_point()
                    .ok_or_else(|| Error::decode(0, "missing ECDH point"))?;
                keypair.derive(point)?
            }
        };

        let client_random = self.client_random;
        let server_random = self.server_random;
        let master = crypto::master_secret(
            &pre_master,
            client_random.as_slice(),
            server_random.as_slice(),
        );

        let session = self.engine.session_mut();
        session.set_master_secret(&master);
        session.derive_keys(client_random.as_slice(), server_random.as_slice());

        Ok(())
    }

    fn lookup_psk(&mut self, identity: &crate::message::PskIdentity) -> Option<Vec<u8>> {
        // This call may block on a remote store; the flight timer was
        // already cancelled when the ClientKeyExchange arrived, so no
        // spurious retransmission happens while we wait.
        match self.credentials.lookup_psk(identity) {
            Some(psk) => {
                self.engine
                    .session_mut()
                    .set_peer_identity(PeerIdentity::Psk(identity.clone()));
                Some(psk)
            }
            None => {
                debug!("unknown PSK identity {:?}", identity);
                self.psk_failed = true;
                None
            }
        }
    }

    /// A random pre-master secret standing in for an unknown identity;
    /// the handshake proceeds and fails at Finished verification,
    /// indistinguishable on the wire from a wrong key.
    fn fake_pre_master(&self) -> Vec<u8> {
        use rand::RngCore;
        let mut fake = vec![0u8; 48];
        rand::rngs::OsRng.fill_bytes(&mut fake);
        fake
    }

    fn process_client_finished(
        &mut self,
        finished: Finished,
        msg_type: MessageType,
        message_seq: u16,
        body: &[u8],
        now: Instant,
    ) -> Result<(), Error> {
        let master = self.engine.session().master_secret().to_vec();
        let expected = crypto::verify_data(&master, true, self.engine.transcript());

        let ok: bool = expected[..].ct_eq(&finished.verify_data[..]).into();
        if !ok || self.psk_failed {
            debug!("client Finished verification failed");
            return Err(failure(AlertDescription::DecryptError));
        }

        if !self.resumed {
            // Full handshake: answer with flight 6, ChangeCipherSpec and
            // our Finished over the transcript including the client's.
            self.engine.transcript_add(msg_type, message_seq, body);

            let verify_data = crypto::verify_data(&master, false, self.engine.transcript());
            let mut finished_body = Vec::new();
            Finished::new(verify_data).serialize(&mut finished_body);

            self.engine.begin_flight(6);
            self.engine.queue_ccs();
            self.engine
                .queue_handshake(1, MessageType::Finished, finished_body);
            self.engine.send_flight(now, false)?;
        }

        debug!("server handshake established");
        self.engine.session_mut().set_established();
        self.engine.push_event(Output::Connected);
        self.state = ServerState::Established;
        Ok(())
    }
}
