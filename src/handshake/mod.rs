//! The DTLS 1.2 handshake: a sans-IO per-connection endpoint.
//!
//! The [`Endpoint`] is driven from outside: feed inbound datagrams with
//! `handle_datagram`, drive retransmission with `handle_timeout`, and
//! drain `poll_output` for datagrams to put on the wire and events to
//! surface. The connector wires endpoints to the socket, the timer
//! service and the worker pool; tests drive them directly.

mod client;
mod reassembly;
mod server;

pub use client::ClientHandshake;
pub use server::{
    parse_initial_client_hello, verify_cookie_and_extract, HelloVerifyResponder,
    InitialClientHello, ServerHandshake,
};

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use crate::buffer::Buf;
use crate::message::{Alert, AlertDescription, CipherSuite, ContentType, DtlsRecord};
use crate::message::{Handshake, MessageType, ProtocolVersion, Sequence, SessionId};
use crate::session::Session;
use crate::timer::ExponentialBackoff;
use crate::window::ReplayWindow;
use crate::{Config, Error};

use reassembly::Reassembly;

/// Handshake messages buffered ahead of the expected message_seq.
const MAX_BUFFERED_MESSAGES: usize = 16;

/// Events and datagrams produced by an endpoint.
#[derive(Debug)]
pub enum Output {
    /// A datagram to transmit.
    Packet(Vec<u8>),
    /// The handshake completed; the session is established.
    Connected,
    /// Decrypted application data from the peer.
    ApplicationData(Vec<u8>),
    /// An alert received from the peer (close_notify or fatal alerts
    /// terminate the connection; warnings are informational).
    PeerAlert(Alert),
}

/// Session parameters carried over for an abbreviated handshake.
#[derive(Clone)]
pub struct Resumption {
    pub id: SessionId,
    pub master_secret: Vec<u8>,
    pub suite: CipherSuite,
}

/// Inbound items the engine hands to the role state machines, in strict
/// message_seq order for handshake messages.
pub(crate) enum Inbound {
    Message {
        msg_type: MessageType,
        message_seq: u16,
        body: Vec<u8>,
    },
    /// A retransmission of the peer's previous flight was observed.
    DuplicateFlight,
    Ccs,
    Alert(Alert),
    AppData(Vec<u8>),
}

/// One message of the current outbound flight, kept for retransmission.
///
/// Retransmits re-serialize with fresh record sequence numbers; the
/// handshake message_seq is part of the stored item and never changes.
enum FlightItem {
    Handshake {
        epoch: u16,
        msg_type: MessageType,
        message_seq: u16,
        body: Vec<u8>,
    },
    ChangeCipherSpec,
}

/// Record-layer and flight machinery shared by both roles.
pub(crate) struct Engine {
    config: Arc<Config>,
    session: Session,

    epoch0_send_seq: u64,
    epoch0_replay: ReplayWindow,
    peer_ccs_received: bool,

    queue_tx: VecDeque<Vec<u8>>,
    queue_events: VecDeque<Output>,

    transcript: Buf,

    next_send_seq: u16,
    next_receive_seq: u16,
    inbound: BTreeMap<u16, Reassembly>,

    flight: Vec<FlightItem>,
    flight_no: u8,
    flight_arms_timer: bool,
    backoff: ExponentialBackoff,
    flight_timeout: Option<Instant>,

    deferred: VecDeque<Vec<u8>>,
}

impl Engine {
    pub fn new(config: Arc<Config>, peer: SocketAddr, is_client: bool) -> Engine {
        let backoff =
            ExponentialBackoff::new(config.retransmit_timeout(), config.max_retransmissions());

        Engine {
            session: Session::new(peer, is_client),
            epoch0_send_seq: 0,
            epoch0_replay: ReplayWindow::new(),
            peer_ccs_received: false,
            queue_tx: VecDeque::new(),
            queue_events: VecDeque::new(),
            transcript: Buf::new(),
            next_send_seq: 0,
            next_receive_seq: 0,
            inbound: BTreeMap::new(),
            flight: Vec::new(),
            flight_no: 0,
            flight_arms_timer: false,
            backoff,
            flight_timeout: None,
            deferred: VecDeque::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn set_next_receive_seq(&mut self, seq: u16) {
        self.next_receive_seq = seq;
    }

    pub fn set_next_send_seq(&mut self, seq: u16) {
        self.next_send_seq = seq;
    }

    /// Continue the epoch-0 record sequence after records already sent
    /// statelessly (the HelloVerifyRequest mirrors the client's record
    /// sequence number, which the peer's replay window has seen).
    pub fn set_epoch0_send_seq(&mut self, seq: u64) {
        self.epoch0_send_seq = seq;
    }

    pub fn transcript_reset(&mut self) {
        self.transcript.clear();
    }

    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    /// Add a message to the Finished transcript in its unfragmented form
    /// (RFC 6347 section 4.2.6).
    pub fn transcript_add(&mut self, msg_type: MessageType, message_seq: u16, body: &[u8]) {
        let mut out = Vec::with_capacity(12 + body.len());
        Handshake::serialize_message(msg_type, message_seq, body, &mut out);
        self.transcript.extend_from_slice(&out);
    }

    /// Add raw handshake-message bytes, exactly as seen on the wire.
    pub fn transcript_add_raw(&mut self, raw: &[u8]) {
        self.transcript.extend_from_slice(raw);
    }

    // --- outbound -------------------------------------------------------

    /// Start a new flight: clears the retransmission buffer and resets
    /// the backoff budget.
    pub fn begin_flight(&mut self, flight_no: u8) {
        debug!("begin flight {}", flight_no);
        self.flight_no = flight_no;
        self.flight.clear();
        self.backoff.reset();
        self.flight_timeout = None;
    }

    /// Queue a handshake message into the current flight, assigning the
    /// next send message_seq and extending the transcript.
    pub fn queue_handshake(&mut self, epoch: u16, msg_type: MessageType, body: Vec<u8>) {
        let message_seq = self.next_send_seq;
        self.next_send_seq += 1;

        self.transcript_add(msg_type, message_seq, &body);

        self.flight.push(FlightItem::Handshake {
            epoch,
            msg_type,
            message_seq,
            body,
        });
    }

    /// Queue the ChangeCipherSpec marker into the current flight.
    pub fn queue_ccs(&mut self) {
        self.flight.push(FlightItem::ChangeCipherSpec);
    }

    /// Serialize and send the current flight. `arm_timer` is set for
    /// flights that await a reply; the final flight of a handshake is
    /// only resent in response to duplicates from the peer.
    pub fn send_flight(&mut self, now: Instant, arm_timer: bool) -> Result<(), Error> {
        let mtu = self.config.mtu();

        // Handshake fragments: record header + handshake header overhead.
        let max_fragment = mtu - DtlsRecord::HEADER_LEN - 12;

        let mut records: Vec<Vec<u8>> = Vec::new();

        for i in 0..self.flight.len() {
            match &self.flight[i] {
                FlightItem::Handshake {
                    epoch: 0,
                    msg_type,
                    message_seq,
                    body,
                } => {
                    let msg_type = *msg_type;
                    let message_seq = *message_seq;
                    let total = body.len();
                    let body = body.clone();

                    let mut offset = 0usize;
                    loop {
                        let chunk_len = (total - offset).min(max_fragment);
                        let chunk = &body[offset..offset + chunk_len];

                        let mut fragment = Vec::with_capacity(12 + chunk_len);
                        Handshake::serialize_fragment(
                            msg_type,
                            total as u32,
                            message_seq,
                            offset as u32,
                            chunk,
                            &mut fragment,
                        );

                        records.push(self.plain_record(ContentType::Handshake, &fragment));

                        offset += chunk_len;
                        if offset >= total {
                            break;
                        }
                    }
                }
                FlightItem::Handshake {
                    msg_type,
                    message_seq,
                    body,
                    ..
                } => {
                    // Protected epochs: the session encrypts; no
                    // fragmentation needed for the small epoch-1 handshake
                    // messages (Finished).
                    let mut fragment = Vec::with_capacity(12 + body.len());
                    Handshake::serialize_message(*msg_type, *message_seq, body, &mut fragment);
                    records.push(
                        self.session
                            .encrypt_record(ContentType::Handshake, &fragment)?,
                    );
                }
                FlightItem::ChangeCipherSpec => {
                    records.push(self.plain_record(ContentType::ChangeCipherSpec, &[0x01]));
                }
            }
        }

        // Pack records into MTU-bounded datagrams.
        let mut datagram: Vec<u8> = Vec::new();
        for record in records {
            if !datagram.is_empty() && datagram.len() + record.len() > mtu {
                self.queue_tx.push_back(std::mem::take(&mut datagram));
            }
            datagram.extend_from_slice(&record);
        }
        if !datagram.is_empty() {
            self.queue_tx.push_back(datagram);
        }

        self.flight_arms_timer = arm_timer;
        self.flight_timeout = if arm_timer {
            Some(now + self.backoff.rto())
        } else {
            None
        };

        Ok(())
    }

    fn plain_record(&mut self, content_type: ContentType, payload: &[u8]) -> Vec<u8> {
        let record = DtlsRecord {
            content_type,
            version: ProtocolVersion::DTLS1_2,
            sequence: Sequence {
                epoch: 0,
                sequence_number: self.epoch0_send_seq,
            },
            length: payload.len() as u16,
            fragment: payload,
        };
        self.epoch0_send_seq += 1;

        let mut out = Vec::with_capacity(DtlsRecord::HEADER_LEN + payload.len());
        record.serialize(&mut out);
        out
    }

    /// Retransmit the current flight, consuming one retry. Used both on
    /// timer expiry and when the peer retransmits its previous flight.
    /// Returns false once the retry budget is spent.
    pub fn retransmit(&mut self, now: Instant) -> Result<bool, Error> {
        if self.flight.is_empty() || !self.backoff.can_retry() {
            return Ok(false);
        }

        self.backoff.attempt();
        debug!(
            "retransmit flight {} ({} retries left)",
            self.flight_no,
            self.backoff.retries_left()
        );
        let arm = self.flight_arms_timer;
        self.send_flight(now, arm)?;
        Ok(true)
    }

    /// Drive the retransmission timer.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        let Some(timeout) = self.flight_timeout else {
            return Ok(());
        };

        if now < timeout {
            return Ok(());
        }

        if !self.retransmit(now)? {
            debug!("flight {} retry budget exhausted", self.flight_no);
            return Err(Error::HandshakeTimeout);
        }

        Ok(())
    }

    pub fn next_timeout(&self) -> Option<Instant> {
        self.flight_timeout
    }

    /// Is the buffered flight the final one of the handshake (sent
    /// without a timer)? Its sender keeps answering duplicates of the
    /// peer's last flight even after establishment, since the peer may
    /// have lost our closing flight.
    pub fn is_final_flight(&self) -> bool {
        !self.flight.is_empty() && !self.flight_arms_timer
    }

    /// The peer progressed to our next flight; stop retransmitting.
    fn cancel_flight_timer(&mut self) {
        self.flight_timeout = None;
    }

    /// Queue an alert record, protected if the write epoch is active.
    pub fn queue_alert(&mut self, alert: Alert) -> Result<(), Error> {
        let mut payload = Vec::with_capacity(Alert::LEN);
        alert.serialize(&mut payload);

        let record = if self.session.keys_derived() && self.is_established() {
            self.session.encrypt_record(ContentType::Alert, &payload)?
        } else {
            self.plain_record(ContentType::Alert, &payload)
        };

        self.queue_tx.push_back(record);
        Ok(())
    }

    /// Queue protected application data.
    pub fn queue_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        let record = self
            .session
            .encrypt_record(ContentType::ApplicationData, data)?;
        self.queue_tx.push_back(record);
        Ok(())
    }

    pub fn push_event(&mut self, event: Output) {
        self.queue_events.push_back(event);
    }

    pub fn poll_output(&mut self) -> Option<Output> {
        if let Some(packet) = self.queue_tx.pop_front() {
            return Some(Output::Packet(packet));
        }
        self.queue_events.pop_front()
    }

    pub fn is_established(&self) -> bool {
        self.session.is_established()
    }

    // --- inbound --------------------------------------------------------

    /// Produce ordered inbound items from one record.
    ///
    /// Records of a datagram must be fed one at a time, with the caller
    /// processing the produced items between records: a later record may
    /// only be decryptable because of state established by an earlier one
    /// (a ClientKeyExchange deriving the keys its flight's Finished
    /// needs).
    pub(crate) fn intake_record_bytes(
        &mut self,
        record_bytes: &[u8],
        out: &mut Vec<Inbound>,
    ) -> Result<(), Error> {
        self.intake_record(record_bytes, out, 0)
    }

    fn intake_record(
        &mut self,
        record_bytes: &[u8],
        out: &mut Vec<Inbound>,
        depth: usize,
    ) -> Result<(), Error> {
        let (_, record) = DtlsRecord::parse(record_bytes)?;

        let read_epoch = if self.peer_ccs_received { 1 } else { 0 };
        let epoch = record.sequence.epoch;

        if epoch == read_epoch + 1 && depth == 0 {
            // A record of the next epoch arriving before the peer's
            // ChangeCipherSpec; buffered, never dropped.
            if self.deferred.len() < self.config.max_deferred_records() {
                debug!("deferring record {} until CCS", record.sequence);
                self.deferred.push_back(record_bytes.to_vec());
            } else {
                debug!("deferred queue full, dropping {}", record.sequence);
            }
            return Ok(());
        }

        if epoch != read_epoch {
            debug!("dropping record {} outside read epoch", record.sequence);
            return Ok(());
        }

        let payload: Vec<u8> = if epoch == 0 {
            if !self.epoch0_replay.check(record.sequence.sequence_number) {
                debug!("replay drop {}", record.sequence);
                return Ok(());
            }
            self.epoch0_replay.update(record.sequence.sequence_number);
            record.fragment.to_vec()
        } else if !self.session.keys_derived() {
            // A protected record overtook the key exchange that derives
            // its keys (reordered datagrams within one flight). Dropping
            // it lets the peer's retransmission recover.
            debug!("no keys yet, dropping {}", record.sequence);
            return Ok(());
        } else {
            match self.session.decrypt_record(&record) {
                Ok(plaintext) => plaintext,
                Err(Error::ReplayDropped) => {
                    debug!("replay drop {}", record.sequence);
                    return Ok(());
                }
                Err(Error::BadRecordMac) => {
                    debug!("bad record mac, dropping {}", record.sequence);
                    return Ok(());
                }
                Err(e) => return Err(e),
            }
        };

        match record.content_type {
            ContentType::Handshake => {
                let mut input = &payload[..];
                while !input.is_empty() {
                    let (rest, handshake) = Handshake::parse(input)?;
                    input = rest;
                    self.intake_handshake(&handshake, out)?;
                }
            }
            ContentType::ChangeCipherSpec => {
                if self.peer_ccs_received {
                    debug!("duplicate ChangeCipherSpec ignored");
                    return Ok(());
                }
                self.peer_ccs_received = true;
                self.cancel_flight_timer();
                out.push(Inbound::Ccs);

                // Replay records that arrived ahead of the epoch change,
                // in their original arrival order.
                let deferred: Vec<Vec<u8>> = self.deferred.drain(..).collect();
                for bytes in deferred {
                    self.intake_record(&bytes, out, depth + 1)?;
                }
            }
            ContentType::Alert => {
                match Alert::parse(&payload) {
                    Ok((_, alert)) => out.push(Inbound::Alert(alert)),
                    Err(_) => debug!("malformed alert dropped"),
                }
            }
            ContentType::ApplicationData => {
                if self.is_established() {
                    out.push(Inbound::AppData(payload));
                } else {
                    debug!("application data before establishment dropped");
                }
            }
            ContentType::Unknown(v) => {
                debug!("unknown content type {} dropped", v);
            }
        }

        Ok(())
    }

    fn intake_handshake(&mut self, handshake: &Handshake, out: &mut Vec<Inbound>) -> Result<(), Error> {
        let header = &handshake.header;

        // On an established session a ClientHello (server side) or
        // HelloRequest (client side) is a renegotiation attempt. It uses
        // a fresh message_seq counter, so it bypasses ordering and goes
        // straight to the role, which refuses it.
        if self.is_established()
            && matches!(
                header.msg_type,
                MessageType::ClientHello | MessageType::HelloRequest
            )
        {
            if !header.is_fragment() {
                out.push(Inbound::Message {
                    msg_type: header.msg_type,
                    message_seq: header.message_seq,
                    body: handshake.fragment.to_vec(),
                });
            }
            return Ok(());
        }

        if header.message_seq < self.next_receive_seq {
            // A retransmission of the peer's previous flight.
            debug!(
                "duplicate handshake message_seq {} (expecting {})",
                header.message_seq, self.next_receive_seq
            );
            out.push(Inbound::DuplicateFlight);
            return Ok(());
        }

        if header.length as usize > self.config.max_fragmented_handshake_length() {
            return Err(Error::decode(0, "handshake message too large"));
        }

        if !self.inbound.contains_key(&header.message_seq)
            && self.inbound.len() >= MAX_BUFFERED_MESSAGES
        {
            debug!("inbound handshake buffer full, dropping message");
            return Ok(());
        }

        let entry = self
            .inbound
            .entry(header.message_seq)
            .or_insert_with(|| Reassembly::new(header));
        entry.add(header, handshake.fragment)?;

        // The peer has moved on to the flight we were waiting for.
        self.cancel_flight_timer();

        // Drain complete messages in strict message_seq order.
        while let Some(entry) = self.inbound.get(&self.next_receive_seq) {
            if !entry.is_complete() {
                break;
            }
            let entry = self.inbound.remove(&self.next_receive_seq).unwrap();
            let message_seq = self.next_receive_seq;
            self.next_receive_seq += 1;

            out.push(Inbound::Message {
                msg_type: entry.msg_type(),
                message_seq,
                body: entry.into_body(),
            });
        }

        Ok(())
    }
}

/// A DTLS endpoint for one peer: either side of the handshake plus the
/// established session.
pub struct Endpoint {
    inner: Inner,
}

enum Inner {
    Client(client::ClientHandshake),
    Server(server::ServerHandshake),
}

impl Endpoint {
    /// Create a client endpoint and queue the initial ClientHello.
    pub fn client(
        config: Arc<Config>,
        credentials: Arc<dyn crate::credentials::CredentialStore>,
        peer: SocketAddr,
        resume: Option<Resumption>,
        now: Instant,
    ) -> Result<Endpoint, Error> {
        Ok(Endpoint {
            inner: Inner::Client(client::ClientHandshake::new(
                config,
                credentials,
                peer,
                resume,
                now,
            )?),
        })
    }

    /// Create a server endpoint from a cookie-verified ClientHello.
    ///
    /// `hello_raw` is the complete handshake message as received (for the
    /// transcript); `resumable` carries the prior session of this peer,
    /// if any, enabling the abbreviated flow.
    #[allow(clippy::too_many_arguments)]
    pub fn server(
        config: Arc<Config>,
        credentials: Arc<dyn crate::credentials::CredentialStore>,
        peer: SocketAddr,
        hello: crate::message::ClientHello,
        hello_raw: Vec<u8>,
        hello_seq: u16,
        hello_record_seq: u64,
        resumable: Option<Resumption>,
        now: Instant,
    ) -> Result<Endpoint, Error> {
        Ok(Endpoint {
            inner: Inner::Server(server::ServerHandshake::new(
                config,
                credentials,
                peer,
                hello,
                hello_raw,
                hello_seq,
                hello_record_seq,
                resumable,
                now,
            )?),
        })
    }

    /// Process an inbound datagram.
    pub fn handle_datagram(&mut self, data: &[u8], now: Instant) -> Result<(), Error> {
        match &mut self.inner {
            Inner::Client(c) => c.handle_datagram(data, now),
            Inner::Server(s) => s.handle_datagram(data, now),
        }
    }

    /// Drive retransmission timers.
    pub fn handle_timeout(&mut self, now: Instant) -> Result<(), Error> {
        match &mut self.inner {
            Inner::Client(c) => c.engine_mut().handle_timeout(now),
            Inner::Server(s) => s.engine_mut().handle_timeout(now),
        }
    }

    /// Drain pending output.
    pub fn poll_output(&mut self) -> Option<Output> {
        self.engine_mut().poll_output()
    }

    /// Deadline for the next `handle_timeout` call, if a flight is in
    /// flight.
    pub fn next_timeout(&self) -> Option<Instant> {
        self.engine().next_timeout()
    }

    /// Send protected application data on the established session.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<(), Error> {
        if !self.is_established() {
            return Err(Error::UnexpectedMessage(
                "session not established".to_string(),
            ));
        }
        self.engine_mut().queue_application_data(data)
    }

    /// Queue a close_notify for the peer.
    pub fn queue_close_notify(&mut self) -> Result<(), Error> {
        self.engine_mut().queue_alert(Alert::close_notify())
    }

    /// Queue an arbitrary alert.
    pub fn queue_alert(&mut self, alert: Alert) -> Result<(), Error> {
        self.engine_mut().queue_alert(alert)
    }

    pub fn is_established(&self) -> bool {
        self.engine().is_established()
    }

    pub fn session(&self) -> &Session {
        self.engine().session()
    }

    /// Parameters for resuming this session later.
    pub fn resumption(&self) -> Option<Resumption> {
        let session = self.engine().session();
        if !session.is_established() || session.id().is_empty() {
            return None;
        }
        Some(Resumption {
            id: session.id().clone(),
            master_secret: session.master_secret().to_vec(),
            suite: session.cipher_suite(),
        })
    }

    /// Tear down with a fatal alert derived from `error`, if any applies.
    pub fn fail(&mut self, error: &Error) {
        if let Some(alert) = error.to_alert() {
            let _ = self.engine_mut().queue_alert(alert);
        }
    }

    fn engine(&self) -> &Engine {
        match &self.inner {
            Inner::Client(c) => c.engine(),
            Inner::Server(s) => s.engine(),
        }
    }

    fn engine_mut(&mut self) -> &mut Engine {
        match &mut self.inner {
            Inner::Client(c) => c.engine_mut(),
            Inner::Server(s) => s.engine_mut(),
        }
    }
}

/// Map a handshake-failure alert into the error the callbacks observe.
pub(crate) fn failure(description: AlertDescription) -> Error {
    Error::HandshakeFailure(Alert::fatal(description))
}
