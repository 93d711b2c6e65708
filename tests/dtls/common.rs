//! Shared helpers for the sans-IO handshake tests: an in-memory network
//! shuttling datagrams between a client endpoint and a lazily created
//! server endpoint, plus record-header inspection utilities.

#![allow(unused)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadmium::credentials::InMemoryCredentialStore;
use cadmium::handshake::{parse_initial_client_hello, HelloVerifyResponder};
use cadmium::message::{Alert, CipherSuite};
use cadmium::{Config, Endpoint, Output, Resumption};

/// Parsed DTLS record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecHdr {
    pub ctype: u8,
    pub epoch: u16,
    pub seq: u64,
    pub len: usize,
}

/// Handshake message types (RFC 5246 / 6347).
pub const CLIENT_HELLO: u8 = 1;
pub const SERVER_HELLO: u8 = 2;
pub const HELLO_VERIFY_REQUEST: u8 = 3;
pub const CERTIFICATE: u8 = 11;
pub const SERVER_KEY_EXCHANGE: u8 = 12;
pub const SERVER_HELLO_DONE: u8 = 14;
pub const CLIENT_KEY_EXCHANGE: u8 = 16;
pub const FINISHED: u8 = 20;

/// Record content types.
pub const CCS: u8 = 20;
pub const ALERT: u8 = 21;
pub const HANDSHAKE: u8 = 22;
pub const APPLICATION_DATA: u8 = 23;

/// Parse DTLS record headers from a datagram.
pub fn parse_records(datagram: &[u8]) -> Vec<RecHdr> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 13 <= datagram.len() {
        let ctype = datagram[i];
        let epoch = u16::from_be_bytes([datagram[i + 3], datagram[i + 4]]);
        let seq_bytes = [
            0u8,
            0u8,
            datagram[i + 5],
            datagram[i + 6],
            datagram[i + 7],
            datagram[i + 8],
            datagram[i + 9],
            datagram[i + 10],
        ];
        let seq = u64::from_be_bytes(seq_bytes);
        let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;
        out.push(RecHdr {
            ctype,
            epoch,
            seq,
            len,
        });
        i += 13 + len;
    }
    out
}

/// Split a datagram into its individual record byte slices.
pub fn split_records(datagram: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 13 <= datagram.len() {
        let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;
        out.push(datagram[i..i + 13 + len].to_vec());
        i += 13 + len;
    }
    out
}

/// Parse handshake message types from a datagram (content_type=22,
/// plaintext records only).
pub fn parse_handshake_types(datagram: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 13 <= datagram.len() {
        let ctype = datagram[i];
        let epoch = u16::from_be_bytes([datagram[i + 3], datagram[i + 4]]);
        let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;

        if ctype == HANDSHAKE && epoch == 0 && i + 13 + 1 <= datagram.len() {
            out.push(datagram[i + 13]);
        }
        i += 13 + len;
    }
    out
}

/// Collect record headers from a slice of datagrams.
pub fn collect_headers(datagrams: &[Vec<u8>]) -> Vec<RecHdr> {
    datagrams.iter().flat_map(|d| parse_records(d)).collect()
}

/// Collect plaintext handshake message types from a slice of datagrams.
pub fn collect_handshake_types(datagrams: &[Vec<u8>]) -> Vec<u8> {
    datagrams.iter().flat_map(|d| parse_handshake_types(d)).collect()
}

/// Assert that retransmitted records have the same epochs but increased
/// record sequence numbers.
pub fn assert_epochs_and_seq_increased(init: &[RecHdr], resend: &[RecHdr]) {
    assert_eq!(
        init.len(),
        resend.len(),
        "record count must match between initial and resend"
    );
    for (a, b) in init.iter().zip(resend.iter()) {
        assert_eq!(
            a.epoch, b.epoch,
            "epoch must match for the same record on resend"
        );
        assert!(
            b.seq > a.seq,
            "record sequence must increase on resend: {:?} -> {:?}",
            a,
            b
        );
    }
}

/// Copy a plaintext datagram with every record's sequence number bumped
/// by `delta`, emulating a peer's true retransmission (fresh record
/// sequence numbers, unchanged payload).
pub fn bump_record_seqs(datagram: &[u8], delta: u64) -> Vec<u8> {
    let mut out = datagram.to_vec();
    let mut i = 0usize;
    while i + 13 <= out.len() {
        let len = u16::from_be_bytes([out[i + 11], out[i + 12]]) as usize;
        let seq = u64::from_be_bytes([
            0,
            0,
            out[i + 5],
            out[i + 6],
            out[i + 7],
            out[i + 8],
            out[i + 9],
            out[i + 10],
        ]) + delta;
        out[i + 5..i + 11].copy_from_slice(&seq.to_be_bytes()[2..]);
        i += 13 + len;
    }
    out
}

/// Everything an endpoint produced when drained.
#[derive(Default, Debug)]
pub struct Drained {
    pub packets: Vec<Vec<u8>>,
    pub connected: bool,
    pub app_data: Vec<Vec<u8>>,
    pub alerts: Vec<Alert>,
}

/// Drain all pending output from an endpoint.
pub fn drain(endpoint: &mut Endpoint) -> Drained {
    let mut result = Drained::default();
    while let Some(output) = endpoint.poll_output() {
        match output {
            Output::Packet(p) => result.packets.push(p),
            Output::Connected => result.connected = true,
            Output::ApplicationData(d) => result.app_data.push(d),
            Output::PeerAlert(a) => result.alerts.push(a),
        }
    }
    result
}

pub fn client_addr() -> SocketAddr {
    "127.0.0.1:41000".parse().unwrap()
}

pub fn server_addr() -> SocketAddr {
    "127.0.0.1:5684".parse().unwrap()
}

/// PSK credentials matching on both sides.
pub fn psk_credentials() -> (Arc<InMemoryCredentialStore>, Arc<InMemoryCredentialStore>) {
    let client = Arc::new(InMemoryCredentialStore::new());
    client.add_psk("Client_identity", "secretPSK");
    client.set_client_identity("Client_identity");

    let server = Arc::new(InMemoryCredentialStore::new());
    server.add_psk("Client_identity", "secretPSK");

    (client, server)
}

pub fn config_with_suite(suite: CipherSuite) -> Config {
    Config::builder()
        .cipher_suites(vec![suite])
        .build()
        .expect("config")
}

/// In-memory network between one client endpoint and one (lazily
/// created) server endpoint, with the stateless cookie exchange in
/// between.
pub struct TestNet {
    pub client: Endpoint,
    pub server: Option<Endpoint>,
    pub now: Instant,

    responder: HelloVerifyResponder,
    server_config: Arc<Config>,
    server_credentials: Arc<InMemoryCredentialStore>,
    server_resumable: Option<Resumption>,

    /// Datagrams in flight, per direction.
    pub to_server: Vec<Vec<u8>>,
    pub to_client: Vec<Vec<u8>>,

    /// Accumulated events per side.
    pub client_connected: bool,
    pub server_connected: bool,
    pub client_app_data: Vec<Vec<u8>>,
    pub server_app_data: Vec<Vec<u8>>,
    pub client_alerts: Vec<Alert>,
    pub server_alerts: Vec<Alert>,
}

impl TestNet {
    pub fn new(
        client_config: Config,
        server_config: Config,
        client_credentials: Arc<InMemoryCredentialStore>,
        server_credentials: Arc<InMemoryCredentialStore>,
    ) -> TestNet {
        Self::with_resumption(
            client_config,
            server_config,
            client_credentials,
            server_credentials,
            None,
            None,
        )
    }

    pub fn with_resumption(
        client_config: Config,
        server_config: Config,
        client_credentials: Arc<InMemoryCredentialStore>,
        server_credentials: Arc<InMemoryCredentialStore>,
        client_resume: Option<Resumption>,
        server_resumable: Option<Resumption>,
    ) -> TestNet {
        let now = Instant::now();

        let client = Endpoint::client(
            Arc::new(client_config),
            client_credentials,
            server_addr(),
            client_resume,
            now,
        )
        .expect("client endpoint");

        TestNet {
            client,
            server: None,
            now,
            responder: HelloVerifyResponder::new(Duration::from_secs(60), now),
            server_config: Arc::new(server_config),
            server_credentials,
            server_resumable,
            to_server: Vec::new(),
            to_client: Vec::new(),
            client_connected: false,
            server_connected: false,
            client_app_data: Vec::new(),
            server_app_data: Vec::new(),
            client_alerts: Vec::new(),
            server_alerts: Vec::new(),
        }
    }

    /// A PSK net with matching credentials and AES-128-CCM-8.
    pub fn psk() -> TestNet {
        let (client_creds, server_creds) = psk_credentials();
        TestNet::new(
            config_with_suite(CipherSuite::PSK_AES128_CCM_8),
            config_with_suite(CipherSuite::PSK_AES128_CCM_8),
            client_creds,
            server_creds,
        )
    }

    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Drain the client into the to-server queue, recording events.
    pub fn pump_client(&mut self) -> Vec<Vec<u8>> {
        let drained = drain(&mut self.client);
        self.client_connected |= drained.connected;
        self.client_app_data.extend(drained.app_data);
        self.client_alerts.extend(drained.alerts.clone());
        self.to_server.extend(drained.packets.clone());
        drained.packets
    }

    /// Drain the server into the to-client queue, recording events.
    pub fn pump_server(&mut self) -> Vec<Vec<u8>> {
        let Some(server) = self.server.as_mut() else {
            return Vec::new();
        };
        let drained = drain(server);
        self.server_connected |= drained.connected;
        self.server_app_data.extend(drained.app_data);
        self.server_alerts.extend(drained.alerts.clone());
        self.to_client.extend(drained.packets.clone());
        drained.packets
    }

    /// Deliver all queued client->server datagrams, creating the server
    /// endpoint (or answering with HelloVerifyRequest) as the cookie
    /// exchange dictates.
    pub fn deliver_to_server(&mut self) -> Result<(), cadmium::Error> {
        let datagrams: Vec<Vec<u8>> = self.to_server.drain(..).collect();
        for datagram in datagrams {
            self.deliver_one_to_server(&datagram)?;
        }
        Ok(())
    }

    pub fn deliver_one_to_server(&mut self, datagram: &[u8]) -> Result<(), cadmium::Error> {
        if self.server.is_none() {
            let Some(initial) = parse_initial_client_hello(datagram)? else {
                return Ok(());
            };

            if !self
                .responder
                .cookie_valid(self.now, client_addr(), &initial.hello)
            {
                let hvr = self
                    .responder
                    .hello_verify_datagram(self.now, client_addr(), &initial);
                self.to_client.push(hvr);
                return Ok(());
            }

            let server = Endpoint::server(
                Arc::clone(&self.server_config),
                self.server_credentials.clone(),
                client_addr(),
                initial.hello,
                initial.raw,
                initial.message_seq,
                initial.record_sequence,
                self.server_resumable.clone(),
                self.now,
            )?;
            self.server = Some(server);
            return Ok(());
        }

        let now = self.now;
        self.server
            .as_mut()
            .expect("server exists")
            .handle_datagram(datagram, now)
    }

    /// Deliver all queued server->client datagrams.
    pub fn deliver_to_client(&mut self) -> Result<(), cadmium::Error> {
        let datagrams: Vec<Vec<u8>> = self.to_client.drain(..).collect();
        let now = self.now;
        for datagram in datagrams {
            self.client.handle_datagram(&datagram, now)?;
        }
        Ok(())
    }

    /// Shuttle datagrams in both directions until quiescent.
    pub fn settle(&mut self) -> Result<(), cadmium::Error> {
        for _ in 0..32 {
            self.pump_client();
            self.pump_server();
            if self.to_server.is_empty() && self.to_client.is_empty() {
                return Ok(());
            }
            self.deliver_to_server()?;
            self.deliver_to_client()?;
        }
        panic!("network did not settle");
    }

    /// Run the handshake to completion on both sides.
    pub fn run_handshake(&mut self) {
        self.settle().expect("handshake settles");
        assert!(self.client.is_established(), "client not established");
        assert!(
            self.server.as_ref().map(|s| s.is_established()).unwrap_or(false),
            "server not established"
        );
        assert!(self.client_connected, "client missed Connected event");
        assert!(self.server_connected, "server missed Connected event");
    }

    /// Exchange one application payload in each direction and assert it
    /// arrives intact.
    pub fn exchange_app_data(&mut self) {
        self.client
            .send_application_data(&[0x01])
            .expect("client app data");
        self.settle().expect("settle");
        assert_eq!(self.server_app_data.last().unwrap(), &vec![0x01]);

        self.server
            .as_mut()
            .unwrap()
            .send_application_data(&[0x02])
            .expect("server app data");
        self.settle().expect("settle");
        assert_eq!(self.client_app_data.last().unwrap(), &vec![0x02]);
    }
}
