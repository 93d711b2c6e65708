//! Retransmission behavior: timer-driven resends with exponential
//! backoff, duplicate-triggered resends, and timer cancellation on
//! flight progress.

use std::sync::Arc;
use std::time::Duration;

use cadmium::credentials::InMemoryCredentialStore;
use cadmium::message::CipherSuite;
use cadmium::{Config, Error};

use crate::common::*;

fn short_timeout_config(suite: CipherSuite) -> Config {
    Config::builder()
        .cipher_suites(vec![suite])
        .retransmit_timeout(Duration::from_millis(500))
        .max_retransmissions(2)
        .build()
        .unwrap()
}

#[test]
fn lost_reply_triggers_exponential_retransmission() {
    let (client_creds, server_creds) = psk_credentials();
    let mut net = TestNet::new(
        short_timeout_config(CipherSuite::PSK_AES128_CCM_8),
        short_timeout_config(CipherSuite::PSK_AES128_CCM_8),
        client_creds,
        server_creds,
    );

    // Initial flight 1.
    let initial = net.pump_client();
    assert_eq!(initial.len(), 1);
    let initial_headers = collect_headers(&initial);
    net.to_server.clear(); // the server never sees it

    // Before the timeout nothing happens.
    net.advance(Duration::from_millis(400));
    net.client.handle_timeout(net.now).unwrap();
    assert!(net.pump_client().is_empty());

    // First retransmission after 500 ms: same handshake message_seq,
    // fresh record sequence numbers.
    net.advance(Duration::from_millis(150));
    net.client.handle_timeout(net.now).unwrap();
    let resend1 = net.pump_client();
    assert_eq!(resend1.len(), 1);
    assert_epochs_and_seq_increased(&initial_headers, &collect_headers(&resend1));
    assert_eq!(collect_handshake_types(&resend1), vec![CLIENT_HELLO]);
    net.to_server.clear();

    // The interval doubles: nothing at +600 ms, resend at +1000 ms.
    net.advance(Duration::from_millis(600));
    net.client.handle_timeout(net.now).unwrap();
    assert!(net.pump_client().is_empty());

    net.advance(Duration::from_millis(500));
    net.client.handle_timeout(net.now).unwrap();
    let resend2 = net.pump_client();
    assert_eq!(resend2.len(), 1);
    assert_epochs_and_seq_increased(&collect_headers(&resend1), &collect_headers(&resend2));
    net.to_server.clear();

    // max_retransmissions = 2 -> three sends total, then the handshake
    // fails with the distinct timeout cause.
    net.advance(Duration::from_millis(2100));
    let result = net.client.handle_timeout(net.now);
    assert!(matches!(result, Err(Error::HandshakeTimeout)));
}

#[test]
fn reply_before_timeout_cancels_retransmission() {
    let mut net = TestNet::psk();

    // Run the cookie exchange promptly.
    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap(); // flight 4 arrives in time

    // Well past the original timeout, the client must not resend its
    // ClientHello: the reply cancelled the timer.
    net.pump_server();
    net.deliver_to_client().unwrap();
    net.advance(Duration::from_millis(2000));
    net.client.handle_timeout(net.now).unwrap();

    let packets = net.pump_client();
    let types = collect_handshake_types(&packets);
    assert!(
        !types.contains(&CLIENT_HELLO),
        "no ClientHello retransmission after the reply arrived"
    );
}

#[test]
fn slow_psk_lookup_does_not_retransmit_server_flight() {
    // The server's PSK store stalls longer than the retransmission
    // timeout. Receiving the ClientKeyExchange must cancel the flight
    // timer before the lookup runs, so no spurious resend of flight 4
    // happens afterwards.
    let client_creds = Arc::new(InMemoryCredentialStore::new());
    client_creds.add_psk("Client_identity", "secretPSK");
    client_creds.set_client_identity("Client_identity");

    let server_creds = Arc::new(InMemoryCredentialStore::new());
    server_creds.add_psk("Client_identity", "secretPSK");
    server_creds.set_lookup_delay(Duration::from_millis(100));

    let config = Config::builder()
        .cipher_suites(vec![CipherSuite::PSK_AES128_CCM_8])
        .retransmit_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let mut net = TestNet::new(
        config.clone(),
        config,
        client_creds,
        server_creds,
    );

    // Up to flight 5.
    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    net.pump_client();
    net.deliver_to_server().unwrap();
    net.pump_server();
    net.deliver_to_client().unwrap();
    net.pump_client();

    // Flight 5 reaches the server; processing blocks ~100 ms in the PSK
    // lookup, far beyond the 50 ms retransmission timeout.
    net.deliver_to_server().unwrap();

    // The timer was cancelled when the ClientKeyExchange arrived; a
    // late handle_timeout produces no flight 4 resend.
    net.advance(Duration::from_millis(500));
    net.server.as_mut().unwrap().handle_timeout(net.now).unwrap();

    let packets = net.pump_server();
    let types = collect_handshake_types(&packets);
    assert!(
        !types.contains(&SERVER_HELLO),
        "flight 4 must not be retransmitted after flight 5 arrived"
    );

    // The handshake still completes.
    net.run_handshake();
}

#[test]
fn duplicate_client_hello_retransmits_server_flight_only() {
    let mut net = TestNet::psk();

    // Through the cookie exchange.
    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    let cookied_hello = net.pump_client();
    assert_eq!(cookied_hello.len(), 1);
    net.deliver_to_server().unwrap();

    // Flight 4 goes out.
    let flight4 = net.pump_server();
    let flight4_headers = collect_headers(&flight4);
    net.to_client.clear(); // lost

    // The client retransmits its cookied ClientHello (fresh record
    // sequence number, same message_seq); the server must answer by
    // resending flight 4 without restarting the handshake.
    net.to_server.push(bump_record_seqs(&cookied_hello[0], 1));
    net.deliver_to_server().unwrap();

    let resend = net.pump_server();
    let resend_headers = collect_headers(&resend);
    assert_eq!(
        collect_handshake_types(&resend),
        vec![SERVER_HELLO, SERVER_HELLO_DONE]
    );
    assert_epochs_and_seq_increased(&flight4_headers, &resend_headers);

    // Handshake message sequence numbers are unchanged on the resend.
    assert_eq!(
        handshake_seqs(&flight4),
        handshake_seqs(&resend),
        "message_seq must not change on retransmission"
    );

    // And the handshake still completes normally afterwards.
    net.deliver_to_client().unwrap();
    net.run_handshake();
    net.exchange_app_data();
}

/// Extract (message_seq) values of plaintext handshake records.
fn handshake_seqs(datagrams: &[Vec<u8>]) -> Vec<u16> {
    let mut out = Vec::new();
    for datagram in datagrams {
        let mut i = 0usize;
        while i + 13 <= datagram.len() {
            let ctype = datagram[i];
            let epoch = u16::from_be_bytes([datagram[i + 3], datagram[i + 4]]);
            let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;
            if ctype == HANDSHAKE && epoch == 0 && i + 13 + 12 <= datagram.len() {
                out.push(u16::from_be_bytes([datagram[i + 17], datagram[i + 18]]));
            }
            i += 13 + len;
        }
    }
    out
}

#[test]
fn duplicate_triggered_resends_share_the_retry_budget() {
    let (client_creds, server_creds) = psk_credentials();
    let mut net = TestNet::new(
        short_timeout_config(CipherSuite::PSK_AES128_CCM_8),
        short_timeout_config(CipherSuite::PSK_AES128_CCM_8),
        client_creds,
        server_creds,
    );

    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    let cookied_hello = net.pump_client();
    net.deliver_to_server().unwrap();
    net.pump_server();
    net.to_client.clear();

    // Two retransmitted hellos consume the two-retry budget.
    for delta in 1..=2 {
        net.to_server.push(bump_record_seqs(&cookied_hello[0], delta));
        net.deliver_to_server().unwrap();
        assert!(!net.pump_server().is_empty());
        net.to_client.clear();
    }

    // A third one produces no further resend.
    net.to_server.push(bump_record_seqs(&cookied_hello[0], 3));
    net.deliver_to_server().unwrap();
    assert!(
        net.pump_server().is_empty(),
        "retry budget exhausted, no more resends"
    );

    // A byte-identical replay likewise yields nothing.
    net.to_server.push(cookied_hello[0].clone());
    net.deliver_to_server().unwrap();
    assert!(net.pump_server().is_empty());
}
