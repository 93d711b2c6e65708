//! Handshake message fragmentation and out-of-order delivery.

use std::sync::Arc;

use cadmium::certificate::generate_self_signed_certificate;
use cadmium::credentials::InMemoryCredentialStore;
use cadmium::message::CipherSuite;
use cadmium::Config;

use crate::common::*;

fn small_mtu_config(mtu: usize) -> Config {
    Config::builder()
        .cipher_suites(vec![CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256])
        .mtu(mtu)
        .build()
        .unwrap()
}

fn cert_net(mtu: usize) -> TestNet {
    let identity = generate_self_signed_certificate().unwrap();

    let client_creds = Arc::new(InMemoryCredentialStore::new());
    client_creds.trust_any_certificate();

    let server_creds = Arc::new(InMemoryCredentialStore::new());
    server_creds.set_own_certificate(vec![identity.certificate.clone()], identity.private_key);

    TestNet::new(
        small_mtu_config(mtu),
        small_mtu_config(mtu),
        client_creds,
        server_creds,
    )
}

#[test]
fn certificate_is_fragmented_under_small_mtu() {
    let mut net = cert_net(280);

    // Walk to flight 4.
    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    net.pump_client();
    net.deliver_to_server().unwrap();

    let flight4 = net.pump_server();

    // Every datagram respects the MTU, and the Certificate spans
    // multiple records (fragments share a message_seq).
    for datagram in &flight4 {
        assert!(datagram.len() <= 280, "datagram exceeds MTU");
    }
    let certificate_fragments = count_fragments_of(&flight4, CERTIFICATE);
    assert!(
        certificate_fragments > 1,
        "certificate must be fragmented, got {} fragment(s)",
        certificate_fragments
    );

    // Reassembly on the client side completes the handshake.
    net.run_handshake();
    net.exchange_app_data();
}

#[test]
fn fragments_delivered_in_reverse_order_reassemble() {
    let mut net = cert_net(280);

    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    net.pump_client();
    net.deliver_to_server().unwrap();

    // Reverse the order of flight 4's datagrams before delivery.
    net.pump_server();
    net.to_client.reverse();
    net.deliver_to_client().unwrap();

    net.run_handshake();
    net.exchange_app_data();
}

#[test]
fn duplicated_datagrams_are_harmless() {
    let mut net = cert_net(280);

    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    net.pump_client();
    net.deliver_to_server().unwrap();

    // Deliver flight 4 twice.
    net.pump_server();
    let copies: Vec<Vec<u8>> = net.to_client.clone();
    net.to_client.extend(copies);
    net.deliver_to_client().unwrap();

    net.run_handshake();
    net.exchange_app_data();
}

/// Count the records carrying fragments of the given plaintext handshake
/// message type.
fn count_fragments_of(datagrams: &[Vec<u8>], msg_type: u8) -> usize {
    let mut count = 0;
    for datagram in datagrams {
        let mut i = 0usize;
        while i + 13 <= datagram.len() {
            let ctype = datagram[i];
            let epoch = u16::from_be_bytes([datagram[i + 3], datagram[i + 4]]);
            let len = u16::from_be_bytes([datagram[i + 11], datagram[i + 12]]) as usize;
            if ctype == HANDSHAKE && epoch == 0 && datagram[i + 13] == msg_type {
                count += 1;
            }
            i += 13 + len;
        }
    }
    count
}
