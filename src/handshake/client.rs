//! Client side of the DTLS 1.2 handshake.
//!
//! Flights 1, 3 and 5 originate here:
//!
//! 1  ClientHello                  -------->
//! 2                               <--------   HelloVerifyRequest
//! 3  ClientHello (with cookie)    -------->
//! 4                               <--------   ServerHello, Certificate*,
//!                                             ServerKeyExchange*,
//!                                             ServerHelloDone
//! 5  ClientKeyExchange,
//!    [ChangeCipherSpec], Finished -------->
//! 6                               <--------   [ChangeCipherSpec], Finished

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use subtle::ConstantTimeEq;

use crate::credentials::CredentialStore;
use crate::crypto::{self, EcdheKeyPair};
use crate::message::{AlertDescription, BodyContext, CertificateType, CipherSuite};
use crate::message::{CertificatePayload, ClientHello, ClientKeyExchange, Cookie};
use crate::message::{CompressionMethod, EcdhParams, Finished, HandshakeBody, KeyExchange};
use crate::message::{MessageType, ProtocolVersion, Random, SessionId};
use crate::session::PeerIdentity;
use crate::{Config, Error};

use super::{failure, Engine, Inbound, Output, Resumption};

pub struct ClientHandshake {
    engine: Engine,
    credentials: Arc<dyn CredentialStore>,
    state: ClientState,

    random: Random,
    server_random: Option<Random>,
    cookie: Cookie,
    resume: Option<Resumption>,
    resumed: bool,
    /// The peer's ChangeCipherSpec arrived ahead of the messages that
    /// precede it (datagram reordering within a flight).
    early_ccs: bool,

    server_cert_type: CertificateType,
    server_verifying_key: Option<crypto::VerifyingKey>,
    server_ecdh: Option<EcdhParams>,
}

/// Current state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    /// Waiting for a ServerHello, or maybe a HelloVerifyRequest.
    AwaitServerHello { can_hello_verify: bool },
    /// Collecting the server's flight 4 up to ServerHelloDone.
    AwaitServerHelloDone,
    /// Flight 5 sent (or resumption accepted); waiting for the peer's
    /// ChangeCipherSpec.
    AwaitServerCcs,
    /// Epoch advanced; waiting for the server Finished.
    AwaitServerFinished,
    Established,
    Failed,
}

impl ClientHandshake {
    pub fn new(
        config: Arc<Config>,
        credentials: Arc<dyn CredentialStore>,
        peer: SocketAddr,
        resume: Option<Resumption>,
        now: Instant,
    ) -> Result<ClientHandshake, Error> {
        let mut client = ClientHandshake {
            engine: Engine::new(config, peer, true),
            credentials,
            state: ClientState::AwaitServerHello {
                can_hello_verify: true,
            },
            random: Random::generate(),
            server_random: None,
            cookie: Cookie::empty(),
            resume,
            resumed: false,
            early_ccs: false,
            server_cert_type: CertificateType::X509,
            server_verifying_key: None,
            server_ecdh: None,
        };

        client.send_client_hello(1, now)?;
        Ok(client)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn handle_datagram(&mut self, data: &[u8], now: Instant) -> Result<(), Error> {
        if self.state == ClientState::Failed {
            return Ok(());
        }

        // Records are fed to the engine one at a time and their items
        // processed immediately: a later record in the same datagram may
        // only decrypt because of state a preceding one established.
        let mut retransmitted = false;
        let mut rest = data;
        while let Some(slice) = crate::message::DtlsRecordSlice::try_read(rest)? {
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
                self.state = ClientState::Failed;
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
                // One resend per datagram, however many duplicated
                // records it carried. After establishment only the final
                // flight's sender keeps responding.
                let responds = self.state != ClientState::Established
                    || self.engine.is_final_flight();
                if responds && !*retransmitted {
                    *retransmitted = true;
                    self.engine.retransmit(now)?;
                }
                Ok(())
            }
            Inbound::Ccs => {
                match self.state {
                    ClientState::AwaitServerCcs => {
                        self.state = ClientState::AwaitServerFinished;
                    }
                    // Reordered ahead of the flight it belongs to.
                    ClientState::AwaitServerHello { .. }
                    | ClientState::AwaitServerHelloDone => {
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
                    self.state = ClientState::Failed;
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
            key_exchange: self
                .suite()
                .map(|s| s.key_exchange())
                .unwrap_or(KeyExchange::Psk),
            certificate_type: self.server_cert_type,
        };
        let parsed = HandshakeBody::parse(msg_type, body, ctx)?;

        match (self.state, parsed) {
            (
                ClientState::AwaitServerHello { can_hello_verify },
                HandshakeBody::HelloVerifyRequest(hvr),
            ) => {
                if !can_hello_verify {
                    return Err(Error::UnexpectedMessage(
                        "second HelloVerifyRequest".to_string(),
                    ));
                }

                // The initial ClientHello and the HelloVerifyRequest are
                // excluded from the Finished transcript (RFC 6347 4.2.1).
                self.cookie = hvr.cookie;
                self.engine.transcript_reset();
                self.state = ClientState::AwaitServerHello {
                    can_hello_verify: false,
                };
                self.send_client_hello(3, now)
            }
            (ClientState::AwaitServerHello { .. }, HandshakeBody::ServerHello(sh)) => {
                self.engine.transcript_add(msg_type, message_seq, body);
                self.process_server_hello(sh)
            }
            (ClientState::AwaitServerHelloDone, HandshakeBody::Certificate(cert)) => {
                self.engine.transcript_add(msg_type, message_seq, body);
                self.process_certificate(cert)
            }
            (ClientState::AwaitServerHelloDone, HandshakeBody::ServerKeyExchange(ske)) => {
                self.engine.transcript_add(msg_type, message_seq, body);
                self.process_server_key_exchange(ske)
            }
            (ClientState::AwaitServerHelloDone, HandshakeBody::ServerHelloDone) => {
                self.engine.transcript_add(msg_type, message_seq, body);
                self.send_client_keys(now)?;
                self.state = if self.early_ccs {
                    ClientState::AwaitServerFinished
                } else {
                    ClientState::AwaitServerCcs
                };
                Ok(())
            }
            (ClientState::AwaitServerFinished, HandshakeBody::Finished(finished)) => {
                self.process_server_finished(finished, msg_type, message_seq, body, now)
            }
            (ClientState::Established, HandshakeBody::HelloRequest) => {
                // Renegotiation is refused; the session is preserved.
                debug!("refusing renegotiation (HelloRequest)");
                self.engine
                    .queue_alert(crate::message::Alert::warning(
                        AlertDescription::NoRenegotiation,
                    ))
            }
            (state, other) => Err(Error::UnexpectedMessage(format!(
                "{:?} in client state {:?}",
                other.msg_type(),
                state
            ))),
        }
    }

    fn suite(&self) -> Option<CipherSuite> {
        if self.server_random.is_some() {
            Some(self.engine.session().cipher_suite())
        } else {
            None
        }
    }

    fn send_client_hello(&mut self, flight_no: u8, now: Instant) -> Result<(), Error> {
        let session_id = self
            .resume
            .as_ref()
            .map(|r| r.id.clone())
            .unwrap_or_else(SessionId::empty);

        let offer_rpk = !self.credentials.trusted_rpks().is_empty();

        let hello = ClientHello::new(
            self.random,
            session_id,
            self.cookie.clone(),
            self.engine.config().cipher_suites(),
        )
        .with_default_extensions(offer_rpk);

        let mut body = Vec::new();
        hello.serialize(&mut body);

        self.engine.begin_flight(flight_no);
        self.engine.queue_handshake(0, MessageType::ClientHello, body);
        self.engine.send_flight(now, true)
    }

    fn process_server_hello(&mut self, sh: crate::message::ServerHello) -> Result<(), Error> {
        if sh.server_version != ProtocolVersion::DTLS1_2 {
            return Err(failure(AlertDescription::ProtocolVersion));
        }
        if sh.compression_method != CompressionMethod::Null {
            return Err(failure(AlertDescription::HandshakeFailure));
        }
        if !self.engine.config().cipher_suites().contains(&sh.cipher_suite) {
            return Err(failure(AlertDescription::HandshakeFailure));
        }

        self.server_random = Some(sh.random);
        self.server_cert_type = sh.server_certificate_type();

        let session = self.engine.session_mut();
        session.set_cipher_suite(sh.cipher_suite);
        session.set_id(sh.session_id.clone());

        // Abbreviated flow: the server echoed the session id we offered.
        let resumable = self
            .resume
            .as_ref()
            .filter(|r| !sh.session_id.is_empty() && r.id == sh.session_id)
            .cloned();

        if let Some(resumption) = resumable {
            if resumption.suite != sh.cipher_suite {
                return Err(failure(AlertDescription::HandshakeFailure));
            }

            debug!("server accepted session resumption");
            self.resumed = true;

            let client_random = self.random;
            let server_random = sh.random;
            let session = self.engine.session_mut();
            session.set_master_secret(&resumption.master_secret);
            session.derive_keys(client_random.as_slice(), server_random.as_slice());

            self.state = if self.early_ccs {
                ClientState::AwaitServerFinished
            } else {
                ClientState::AwaitServerCcs
            };
        } else {
            self.state = ClientState::AwaitServerHelloDone;
        }

        Ok(())
    }

    fn process_certificate(&mut self, cert: CertificatePayload) -> Result<(), Error> {
        match &cert {
            CertificatePayload::RawPublicKey { spki } => {
                let trusted = self.credentials.trusted_rpks();
                if !trusted.iter().any(|t| t == spki) {
                    return Err(failure(AlertDescription::UnknownCa));
                }
                self.server_verifying_key = Some(crypto::verifying_key_from_spki(spki)?);
                self.engine
                    .session_mut()
                    .set_peer_identity(PeerIdentity::RawPublicKey(spki.clone()));
            }
            CertificatePayload::X509 { chain } => {
                self.credentials
                    .verify_cert_chain(chain)
                    .map_err(Error::Security)?;
                let leaf = chain
                    .first()
                    .ok_or_else(|| failure(AlertDescription::BadCertificate))?;
                self.server_verifying_key = Some(crypto::verifying_key_from_certificate(leaf)?);
                self.engine
                    .session_mut()
                    .set_peer_identity(PeerIdentity::X509(chain.clone()));
            }
        }
        Ok(())
    }

    fn process_server_key_exchange(
        &mut self,
        ske: crate::message::ServerKeyExchange,
    ) -> Result<(), Error> {
        match ske {
            crate::message::ServerKeyExchange::UnsupportedCurve { curve_type } => {
                debug!("server offered explicit curve type {}", curve_type);
                Err(failure(AlertDescription::HandshakeFailure))
            }
            crate::message::ServerKeyExchange::EcdheEcdsa {
                params, signature, ..
            } => {
                if !params.curve.is_supported() {
                    return Err(failure(AlertDescription::HandshakeFailure));
                }

                let key = self.server_verifying_key.as_ref().ok_or_else(|| {
                    Error::UnexpectedMessage("ServerKeyExchange before Certificate".to_string())
                })?;

                let server_random = self.server_random.as_ref().expect("set by ServerHello");
                let input = crypto::signature_input(&self.random, server_random, &params);
                crypto::verify(key, &input, &signature)?;

                self.server_ecdh = Some(params);
                Ok(())
            }
            crate::message::ServerKeyExchange::EcdhePsk { params, .. } => {
                if !params.curve.is_supported() {
                    return Err(failure(AlertDescription::HandshakeFailure));
                }
                self.server_ecdh = Some(params);
                Ok(())
            }
            crate::message::ServerKeyExchange::Psk { .. } => {
                // Identity hint; nothing the client needs.
                Ok(())
            }
        }
    }

    /// Build and send flight 5: ClientKeyExchange, ChangeCipherSpec and
    /// the protected Finished.
    fn send_client_keys(&mut self, now: Instant) -> Result<(), Error> {
        let suite = self.engine.session().cipher_suite();
        let peer = self.engine.session().peer();

        let (cke, pre_master) = match suite.key_exchange() {
            KeyExchange::Psk => {
                let (identity, psk) = self.client_psk(peer)?;
                let pre_master = crypto::psk_pre_master_secret(&psk);
                (ClientKeyExchange::Psk { identity }, pre_master)
            }
            KeyExchange::EcdhePsk => {
                let params = self.take_server_ecdh()?;
                let keypair = EcdheKeyPair::generate(params.curve)?;
                let shared = keypair.derive(&params.point)?;
                let (identity, psk) = self.client_psk(peer)?;
                let pre_master = crypto::ecdhe_psk_pre_master_secret(&shared, &psk);
                (
                    ClientKeyExchange::EcdhePsk {
                        identity,
                        point: keypair.public_point().to_vec(),
                    },
                    pre_master,
                )
            }
            KeyExchange::EcdheEcdsa => {
                let params = self.take_server_ecdh()?;
                let keypair = EcdheKeyPair::generate(params.curve)?;
                let pre_master = keypair.derive(&params.point)?;
                (
                    ClientKeyExchange::EcdheEcdsa {
                        point: keypair.public_point().to_vec(),
                    },
                    pre_master,
                )
            }
        };

        let client_random = self.random;
        let server_random = *self.server_random.as_ref().expect("set by ServerHello");

        let master = crypto::master_secret(
            &pre_master,
            client_random.as_slice(),
            server_random.as_slice(),
        );

        let session = self.engine.session_mut();
        session.set_master_secret(&master);
        session.derive_keys(client_random.as_slice(), server_random.as_slice());

        let mut cke_body = Vec::new();
        cke.serialize(&mut cke_body);

        self.engine.begin_flight(5);
        self.engine
            .queue_handshake(0, MessageType::ClientKeyExchange, cke_body);
        self.engine.queue_ccs();

        // The client Finished covers the transcript through the
        // ClientKeyExchange.
        let verify_data =
            crypto::verify_data(&master, true, self.engine.transcript());
        let mut finished_body = Vec::new();
        Finished::new(verify_data).serialize(&mut finished_body);
        self.engine.queue_handshake(1, MessageType::Finished, finished_body);

        self.engine.send_flight(now, true)
    }

    fn client_psk(&self, peer: SocketAddr) -> Result<(crate::message::PskIdentity, Vec<u8>), Error> {
        let identity = self
            .credentials
            .psk_identity_for(peer)
            .ok_or_else(|| failure(AlertDescription::HandshakeFailure))?;
        let psk = self
            .credentials
            .lookup_psk(&identity)
            .ok_or_else(|| failure(AlertDescription::HandshakeFailure))?;
        Ok((identity, psk))
    }

    fn take_server_ecdh(&mut self) -> Result<EcdhParams, Error> {
        self.server_ecdh.take().ok_or_else(|| {
            Error::UnexpectedMessage("missing ServerKeyExchange".to_string())
        })
    }

    fn process_server_finished(
        &mut self,
        finished: Finished,
        msg_type: MessageType,
        message_seq: u16,
        body: &[u8],
        now: Instant,
    ) -> Result<(), Error> {
        let master = self.engine.session().master_secret().to_vec();
        let expected = crypto::verify_data(&master, false, self.engine.transcript());

        let ok: bool = expected[..].ct_eq(&finished.verify_data[..]).into();
        if !ok {
            debug!("server Finished verification failed");
            return Err(failure(AlertDescription::DecryptError));
        }

        if self.resumed {
            // Abbreviated flow: our ChangeCipherSpec and Finished close
            // the handshake; the server's Finished is part of ours.
            self.engine.transcript_add(msg_type, message_seq, body);

            let verify_data = crypto::verify_data(&master, true, self.engine.transcript());
            let mut finished_body = Vec::new();
            Finished::new(verify_data).serialize(&mut finished_body);

            self.engine.begin_flight(3);
            self.engine.queue_ccs();
            self.engine
                .queue_handshake(1, MessageType::Finished, finished_body);
            self.engine.send_flight(now, false)?;
        }

        debug!("client handshake established");
        self.engine.session_mut().set_established();
        self.engine.push_event(Output::Connected);
        self.state = ClientState::Established;
        Ok(())
    }
}
