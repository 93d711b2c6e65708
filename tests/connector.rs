//! Connector tests over loopback UDP: real sockets, worker pool, timer
//! service and connection store.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use parking_lot::Mutex;

use cadmium::credentials::InMemoryCredentialStore;
use cadmium::message::{
    AlertDescription, CipherSuite, ClientHello, ContentType, Cookie, DtlsRecord, Handshake,
    MessageType, ProtocolVersion, Random, Sequence, SessionId,
};
use cadmium::{Config, Connector, Error, MessageCallback, SessionListener};

fn psk_config() -> Config {
    Config::builder()
        .cipher_suites(vec![CipherSuite::PSK_AES128_CCM_8])
        .build()
        .unwrap()
}

fn psk_stores() -> (Arc<InMemoryCredentialStore>, Arc<InMemoryCredentialStore>) {
    let client = Arc::new(InMemoryCredentialStore::new());
    client.add_psk("Client_identity", "secretPSK");
    client.set_client_identity("Client_identity");

    let server = Arc::new(InMemoryCredentialStore::new());
    server.add_psk("Client_identity", "secretPSK");

    (client, server)
}

#[derive(Default)]
struct RecordingCallback {
    connecting: AtomicUsize,
    connect: AtomicUsize,
    sent: AtomicUsize,
    errors: Mutex<Vec<String>>,
}

impl MessageCallback for RecordingCallback {
    fn on_connecting(&self) {
        self.connecting.fetch_add(1, Ordering::SeqCst);
    }
    fn on_connect(&self) {
        self.connect.fetch_add(1, Ordering::SeqCst);
    }
    fn on_sent(&self) {
        self.sent.fetch_add(1, Ordering::SeqCst);
    }
    fn on_error(&self, error: &Error) {
        self.errors.lock().push(error.to_string());
    }
}

#[derive(Default)]
struct RecordingListener {
    established: Mutex<Vec<SocketAddr>>,
    failed: Mutex<Vec<(SocketAddr, String)>>,
}

impl SessionListener for RecordingListener {
    fn session_established(&self, peer: SocketAddr) {
        self.established.lock().push(peer);
    }
    fn session_failed(&self, peer: SocketAddr, error: &Error) {
        self.failed.lock().push((peer, error.to_string()));
    }
}

fn server_with_receiver(
    config: Config,
    credentials: Arc<InMemoryCredentialStore>,
) -> (Connector, Receiver<(SocketAddr, Vec<u8>)>) {
    let connector = Connector::new(config, credentials, "127.0.0.1:0".parse().unwrap());
    let (tx, rx) = unbounded();
    connector.set_raw_data_receiver(Box::new(move |peer, data| {
        let _ = tx.send((peer, data));
    }));
    connector.start().unwrap();
    (connector, rx)
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}

/// E1: full PSK handshake through two connectors, a 1-byte payload in
/// each direction, and the callback sequence on the triggering message.
#[test]
fn full_psk_handshake_over_udp() {
    let (client_creds, server_creds) = psk_stores();

    let (server, server_rx) = server_with_receiver(psk_config(), server_creds);
    let server_addr = server.local_address().unwrap();

    let (client, client_rx) = server_with_receiver(psk_config(), client_creds);

    let callback = Arc::new(RecordingCallback::default());
    client
        .send(vec![0x01], server_addr, Arc::clone(&callback) as _)
        .unwrap();

    // The payload arrives after the handshake completes.
    let (peer, data) = server_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("application data");
    assert_eq!(data, vec![0x01]);

    assert!(wait_until(Duration::from_secs(1), || {
        callback.sent.load(Ordering::SeqCst) == 1
    }));
    assert_eq!(callback.connecting.load(Ordering::SeqCst), 1);
    assert_eq!(callback.connect.load(Ordering::SeqCst), 1);
    assert!(callback.errors.lock().is_empty());

    // The server answers on its established session.
    server
        .send(vec![0x02], peer, Arc::new(RecordingCallback::default()) as _)
        .unwrap();
    let (_, data) = client_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("reply data");
    assert_eq!(data, vec![0x02]);

    // A second send reuses the session: on_connect does not fire again.
    let second = Arc::new(RecordingCallback::default());
    client
        .send(vec![0x03], server_addr, Arc::clone(&second) as _)
        .unwrap();
    let (_, data) = server_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("second payload");
    assert_eq!(data, vec![0x03]);
    assert_eq!(second.connecting.load(Ordering::SeqCst), 0);
    assert_eq!(second.connect.load(Ordering::SeqCst), 0);
    assert_eq!(second.sent.load(Ordering::SeqCst), 1);

    client.destroy();
    server.destroy();
}

/// E2: a ClientHello without a cookie gets a HelloVerifyRequest and
/// leaves no state behind.
#[test]
fn hello_verify_request_without_state() {
    let (_, server_creds) = psk_stores();
    let (server, _rx) = server_with_receiver(psk_config(), server_creds);
    let server_addr = server.local_address().unwrap();

    // Handcraft a cookieless ClientHello datagram.
    let hello = ClientHello::new(
        Random::generate(),
        SessionId::empty(),
        Cookie::empty(),
        &[CipherSuite::PSK_AES128_CCM_8],
    );
    let mut body = Vec::new();
    hello.serialize(&mut body);
    let mut fragment = Vec::new();
    Handshake::serialize_message(MessageType::ClientHello, 0, &body, &mut fragment);
    let record = DtlsRecord {
        content_type: ContentType::Handshake,
        version: ProtocolVersion::DTLS1_2,
        sequence: Sequence {
            epoch: 0,
            sequence_number: 0,
        },
        length: fragment.len() as u16,
        fragment: &fragment,
    };
    let mut datagram = Vec::new();
    record.serialize(&mut datagram);

    let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    socket.send_to(&datagram, server_addr).unwrap();

    let mut buf = [0u8; 1500];
    let (len, _) = socket.recv_from(&mut buf).expect("HelloVerifyRequest");
    // Record header, then the handshake header's message type.
    assert_eq!(buf[0], 22, "handshake record");
    assert_eq!(buf[13], 3, "HelloVerifyRequest");
    assert!(len > 13 + 12);

    // No connection was created for the uncookied hello.
    assert!(server.connection_store().is_empty());

    server.destroy();
}

/// E6: a full store with only fresh entries silently drops the new
/// handshake after the stateless cookie exchange.
#[test]
fn connection_store_exhaustion_drops_handshake_silently() {
    let (client_creds, server_creds) = psk_stores();

    let server_config = Config::builder()
        .cipher_suites(vec![CipherSuite::PSK_AES128_CCM_8])
        .max_connections(1)
        .build()
        .unwrap();
    let (server, server_rx) = server_with_receiver(server_config, server_creds);
    let server_addr = server.local_address().unwrap();

    // First client fills the single store slot.
    let (client_a, _rx_a) = server_with_receiver(psk_config(), Arc::clone(&client_creds));
    client_a
        .send(vec![0x01], server_addr, Arc::new(RecordingCallback::default()) as _)
        .unwrap();
    server_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("first client establishes");
    assert_eq!(server.connection_store().remaining_capacity(), 0);

    // Second client: the cookie exchange answers statelessly, but the
    // cookied hello cannot create a connection and is dropped without
    // any alert; the client handshake times out.
    let client_b_config = Config::builder()
        .cipher_suites(vec![CipherSuite::PSK_AES128_CCM_8])
        .retransmit_timeout(Duration::from_millis(100))
        .max_retransmissions(1)
        .build()
        .unwrap();
    let (client_b, _rx_b) = server_with_receiver(client_b_config, client_creds);
    let callback = Arc::new(RecordingCallback::default());
    client_b
        .send(vec![0x02], server_addr, Arc::clone(&callback) as _)
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(5), || !callback.errors.lock().is_empty()),
        "second handshake must fail"
    );
    assert!(callback.errors.lock()[0].contains("timed out"));
    assert_eq!(callback.connect.load(Ordering::SeqCst), 0);

    // The stored connection is still the first client's.
    assert_eq!(server.connection_store().len(), 1);
    let client_b_addr = client_b.local_address().unwrap();
    assert!(server.connection_store().get(client_b_addr).is_none());

    client_a.destroy();
    client_b.destroy();
    server.destroy();
}

/// E3 / RFC 6347 4.2.8: a fresh ClientHello from an address holding an
/// established session does not destroy that session until the new
/// handshake's Finished verifies; restart() preserves sessions.
#[test]
fn new_client_hello_preserves_session_until_finished() {
    let (client_creds, server_creds) = psk_stores();
    // Slow the client's own PSK fetch so the second handshake has an
    // observable window between ClientHello and Finished.
    client_creds.set_lookup_delay(Duration::from_millis(400));

    let (server, server_rx) = server_with_receiver(psk_config(), server_creds);
    let server_addr = server.local_address().unwrap();

    let listener = Arc::new(RecordingListener::default());
    let (client, _client_rx) = server_with_receiver(psk_config(), Arc::clone(&client_creds));
    client.set_session_listener(Arc::clone(&listener) as _);

    client
        .send(vec![0x01], server_addr, Arc::new(RecordingCallback::default()) as _)
        .unwrap();
    let (client_addr, _) = server_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("first handshake");

    let original_id = server
        .connection_store()
        .get(client_addr)
        .unwrap()
        .established_session_id()
        .expect("established session");

    // The client loses its state ("reboot") but keeps its port.
    client.destroy();
    client.start().unwrap();
    assert_eq!(client.local_address().unwrap(), client_addr);

    client
        .send(vec![0x09], server_addr, Arc::new(RecordingCallback::default()) as _)
        .unwrap();

    // While the new handshake is still in flight (the client is stuck
    // in its slow PSK lookup), the server must keep the old session.
    std::thread::sleep(Duration::from_millis(200));
    let connection = server
        .connection_store()
        .get(client_addr)
        .expect("connection survives");
    assert_eq!(
        connection.established_session_id(),
        Some(original_id.clone()),
        "old session preserved until the new Finished verifies"
    );

    // The new handshake completes and replaces the session.
    let (_, data) = server_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("second handshake completes");
    assert_eq!(data, vec![0x09]);

    let new_id = server
        .connection_store()
        .get(client_addr)
        .unwrap()
        .established_session_id()
        .expect("new session");
    assert_ne!(new_id, original_id);

    client.destroy();
    server.destroy();
}

/// Property 7: a close_notify from the peer removes the connection from
/// the store and reaches the alert handler.
#[test]
fn close_notify_tears_down_connection() {
    let (client_creds, server_creds) = psk_stores();

    let (server, server_rx) = server_with_receiver(psk_config(), server_creds);
    let server_addr = server.local_address().unwrap();

    let (alert_tx, alert_rx) = unbounded();
    server.set_alert_handler(Box::new(move |peer, alert| {
        let _ = alert_tx.send((peer, alert));
    }));

    let (client, _client_rx) = server_with_receiver(psk_config(), client_creds);
    client
        .send(vec![0x01], server_addr, Arc::new(RecordingCallback::default()) as _)
        .unwrap();
    let (client_addr, _) = server_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("handshake");
    assert!(server.connection_store().get(client_addr).is_some());

    client.close(server_addr);

    let (peer, alert) = alert_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("close_notify");
    assert_eq!(peer, client_addr);
    assert_eq!(alert.description, AlertDescription::CloseNotify);

    assert!(wait_until(Duration::from_secs(2), || {
        server.connection_store().get(client_addr).is_none()
    }));

    client.destroy();
    server.destroy();
}

/// restart() rebinds the same address and reuses established sessions.
#[test]
fn restart_preserves_established_sessions() {
    let (client_creds, server_creds) = psk_stores();

    let (server, server_rx) = server_with_receiver(psk_config(), server_creds);
    let server_addr = server.local_address().unwrap();

    let (client, _client_rx) = server_with_receiver(psk_config(), client_creds);
    let callback = Arc::new(RecordingCallback::default());
    client
        .send(vec![0x01], server_addr, Arc::clone(&callback) as _)
        .unwrap();
    server_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("handshake");

    let addr_before = client.local_address().unwrap();
    client.restart().unwrap();
    assert_eq!(client.local_address().unwrap(), addr_before);

    // The session survived the restart: no new handshake is needed.
    let second = Arc::new(RecordingCallback::default());
    client
        .send(vec![0x04], server_addr, Arc::clone(&second) as _)
        .unwrap();
    let (_, data) = server_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("data after restart");
    assert_eq!(data, vec![0x04]);
    assert_eq!(second.connecting.load(Ordering::SeqCst), 0);

    client.destroy();
    server.destroy();
}
