//! Full and abbreviated handshakes across the supported cipher suites.

use std::sync::Arc;

use cadmium::certificate::generate_self_signed_certificate;
use cadmium::credentials::InMemoryCredentialStore;
use cadmium::crypto::spki_of_private_key;
use cadmium::message::{AlertDescription, CipherSuite};

use crate::common::*;

#[test]
fn full_psk_handshake_flights() {
    let mut net = TestNet::psk();

    // Flight 1: ClientHello with an empty cookie.
    let flight1 = net.pump_client();
    assert_eq!(collect_handshake_types(&flight1), vec![CLIENT_HELLO]);

    // Flight 2: HelloVerifyRequest, statelessly; no server endpoint yet.
    net.deliver_to_server().unwrap();
    assert!(net.server.is_none(), "no state before cookie verification");
    let flight2: Vec<Vec<u8>> = net.to_client.clone();
    assert_eq!(collect_handshake_types(&flight2), vec![HELLO_VERIFY_REQUEST]);
    net.deliver_to_client().unwrap();

    // Flight 3: ClientHello echoing the cookie.
    let flight3 = net.pump_client();
    assert_eq!(collect_handshake_types(&flight3), vec![CLIENT_HELLO]);
    net.deliver_to_server().unwrap();
    assert!(net.server.is_some(), "cookie verified, handshake begins");

    // Flight 4: ServerHello straight to ServerHelloDone for plain PSK.
    let flight4 = net.pump_server();
    assert_eq!(
        collect_handshake_types(&flight4),
        vec![SERVER_HELLO, SERVER_HELLO_DONE]
    );
    net.deliver_to_client().unwrap();

    // Flight 5: ClientKeyExchange, ChangeCipherSpec, Finished.
    let flight5 = net.pump_client();
    let headers = collect_headers(&flight5);
    assert_eq!(collect_handshake_types(&flight5), vec![CLIENT_KEY_EXCHANGE]);
    assert!(headers.iter().any(|h| h.ctype == CCS && h.epoch == 0));
    assert!(headers.iter().any(|h| h.ctype == HANDSHAKE && h.epoch == 1));
    net.deliver_to_server().unwrap();

    // Flight 6: ChangeCipherSpec, Finished.
    let flight6 = net.pump_server();
    let headers = collect_headers(&flight6);
    assert!(headers.iter().any(|h| h.ctype == CCS && h.epoch == 0));
    assert!(headers.iter().any(|h| h.ctype == HANDSHAKE && h.epoch == 1));
    assert!(net.server_connected);
    net.deliver_to_client().unwrap();
    net.pump_client();
    assert!(net.client_connected);

    assert!(net.client.is_established());
    assert!(net.server.as_ref().unwrap().is_established());

    // A 1-byte payload flows both ways on the established session.
    net.exchange_app_data();
}

fn run_suite(suite: CipherSuite) {
    let (client_creds, server_creds) = psk_credentials();
    let mut net = TestNet::new(
        config_with_suite(suite),
        config_with_suite(suite),
        client_creds,
        server_creds,
    );
    net.run_handshake();
    net.exchange_app_data();
}

#[test]
fn psk_gcm_handshake() {
    run_suite(CipherSuite::PSK_AES128_GCM_SHA256);
}

#[test]
fn psk_cbc_handshake() {
    run_suite(CipherSuite::PSK_AES128_CBC_SHA256);
}

#[test]
fn psk_ccm_handshake() {
    run_suite(CipherSuite::PSK_AES128_CCM);
}

#[test]
fn ecdhe_psk_handshake_includes_server_key_exchange() {
    let (client_creds, server_creds) = psk_credentials();
    let mut net = TestNet::new(
        config_with_suite(CipherSuite::ECDHE_PSK_AES128_CBC_SHA256),
        config_with_suite(CipherSuite::ECDHE_PSK_AES128_CBC_SHA256),
        client_creds,
        server_creds,
    );

    // Walk to flight 4 and confirm the ServerKeyExchange is present.
    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    net.pump_client();
    net.deliver_to_server().unwrap();
    let flight4 = net.pump_server();
    assert_eq!(
        collect_handshake_types(&flight4),
        vec![SERVER_HELLO, SERVER_KEY_EXCHANGE, SERVER_HELLO_DONE]
    );

    net.run_handshake();
    net.exchange_app_data();
}

#[test]
fn ecdhe_ecdsa_x509_handshake() {
    let identity = generate_self_signed_certificate().unwrap();

    let client_creds = Arc::new(InMemoryCredentialStore::new());
    client_creds.trust_any_certificate();

    let server_creds = Arc::new(InMemoryCredentialStore::new());
    server_creds.set_own_certificate(vec![identity.certificate.clone()], identity.private_key);

    let mut net = TestNet::new(
        config_with_suite(CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256),
        config_with_suite(CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256),
        client_creds,
        server_creds,
    );

    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    net.pump_client();
    net.deliver_to_server().unwrap();
    let flight4 = net.pump_server();
    assert_eq!(
        collect_handshake_types(&flight4),
        vec![
            SERVER_HELLO,
            CERTIFICATE,
            SERVER_KEY_EXCHANGE,
            SERVER_HELLO_DONE
        ]
    );

    net.run_handshake();
    net.exchange_app_data();
}

#[test]
fn ecdhe_ecdsa_rpk_handshake() {
    let identity = generate_self_signed_certificate().unwrap();
    let spki = spki_of_private_key(&identity.private_key).unwrap();

    let client_creds = Arc::new(InMemoryCredentialStore::new());
    client_creds.add_trusted_rpk(spki);

    let server_creds = Arc::new(InMemoryCredentialStore::new());
    server_creds.set_own_certificate(vec![identity.certificate.clone()], identity.private_key);

    let mut net = TestNet::new(
        config_with_suite(CipherSuite::ECDHE_ECDSA_AES128_CCM_8),
        config_with_suite(CipherSuite::ECDHE_ECDSA_AES128_CCM_8),
        client_creds,
        server_creds,
    );

    net.run_handshake();
    net.exchange_app_data();
}

#[test]
fn untrusted_rpk_rejected() {
    let identity = generate_self_signed_certificate().unwrap();
    let other = generate_self_signed_certificate().unwrap();

    let client_creds = Arc::new(InMemoryCredentialStore::new());
    // Trust a different key than the one the server presents.
    client_creds.add_trusted_rpk(spki_of_private_key(&other.private_key).unwrap());

    let server_creds = Arc::new(InMemoryCredentialStore::new());
    server_creds.set_own_certificate(vec![identity.certificate.clone()], identity.private_key);

    let mut net = TestNet::new(
        config_with_suite(CipherSuite::ECDHE_ECDSA_AES128_CCM_8),
        config_with_suite(CipherSuite::ECDHE_ECDSA_AES128_CCM_8),
        client_creds,
        server_creds,
    );

    let result = net.settle();
    assert!(result.is_err(), "handshake must fail on untrusted key");
    assert!(!net.client.is_established());
}

#[test]
fn unknown_psk_identity_fails_at_finished() {
    let client_creds = Arc::new(InMemoryCredentialStore::new());
    client_creds.add_psk("ghost", "secretPSK");
    client_creds.set_client_identity("ghost");

    let server_creds = Arc::new(InMemoryCredentialStore::new());
    server_creds.add_psk("Client_identity", "secretPSK");

    let mut net = TestNet::new(
        config_with_suite(CipherSuite::PSK_AES128_CCM_8),
        config_with_suite(CipherSuite::PSK_AES128_CCM_8),
        client_creds,
        server_creds,
    );

    // The server must not reject the identity eagerly; the handshake
    // proceeds and fails at Finished verification with decrypt_error.
    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    net.pump_client();
    net.deliver_to_server().unwrap();
    net.pump_server();
    assert!(net.server.is_some());
    net.deliver_to_client().unwrap();
    net.pump_client();

    let result = net.deliver_to_server();
    assert!(result.is_err(), "server must fail the handshake");

    // The server's alert is a fatal decrypt_error, the same as for a
    // wrong key.
    let mut server = net.server.take().unwrap();
    server.fail(&result.unwrap_err());
    let drained = drain(&mut server);
    assert!(!drained.packets.is_empty());
    let alert_record = &drained.packets[0];
    assert_eq!(parse_records(alert_record)[0].ctype, ALERT);
}

#[test]
fn wrong_psk_secret_fails_at_finished() {
    let client_creds = Arc::new(InMemoryCredentialStore::new());
    client_creds.add_psk("Client_identity", "wrongPSK");
    client_creds.set_client_identity("Client_identity");

    let server_creds = Arc::new(InMemoryCredentialStore::new());
    server_creds.add_psk("Client_identity", "secretPSK");

    let mut net = TestNet::new(
        config_with_suite(CipherSuite::PSK_AES128_CCM_8),
        config_with_suite(CipherSuite::PSK_AES128_CCM_8),
        client_creds,
        server_creds,
    );

    let result = net.settle();
    assert!(result.is_err());
    assert!(!net.client_connected);
    assert!(!net.server_connected);
}

#[test]
fn session_resumption_abbreviated_flow() {
    // Full handshake first, to capture the session parameters.
    let mut net = TestNet::psk();
    net.run_handshake();

    let client_resume = net.client.resumption().expect("client resumption");
    let server_resume = net
        .server
        .as_ref()
        .unwrap()
        .resumption()
        .expect("server resumption");
    assert_eq!(client_resume.id, server_resume.id);

    // New association offering the stored session id.
    let (client_creds, server_creds) = psk_credentials();
    let mut net = TestNet::with_resumption(
        config_with_suite(CipherSuite::PSK_AES128_CCM_8),
        config_with_suite(CipherSuite::PSK_AES128_CCM_8),
        client_creds,
        server_creds,
        Some(client_resume.clone()),
        Some(server_resume),
    );

    // Cookie exchange, then the cookied ClientHello.
    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    net.pump_client();
    net.deliver_to_server().unwrap();

    // The abbreviated server flight: ServerHello, CCS, Finished; no
    // key exchange messages.
    let flight = net.pump_server();
    assert_eq!(collect_handshake_types(&flight), vec![SERVER_HELLO]);
    let headers = collect_headers(&flight);
    assert!(headers.iter().any(|h| h.ctype == CCS));

    net.run_handshake();
    net.exchange_app_data();

    // Same session id as the original.
    assert_eq!(
        net.client.resumption().unwrap().id,
        client_resume.id,
        "resumed session keeps its id"
    );
}

#[test]
fn resumption_with_unknown_id_falls_back_to_full_handshake() {
    let mut net = TestNet::psk();
    net.run_handshake();
    let client_resume = net.client.resumption().unwrap();

    // The server has no matching session (restarted, evicted...).
    let (client_creds, server_creds) = psk_credentials();
    let mut net = TestNet::with_resumption(
        config_with_suite(CipherSuite::PSK_AES128_CCM_8),
        config_with_suite(CipherSuite::PSK_AES128_CCM_8),
        client_creds,
        server_creds,
        Some(client_resume.clone()),
        None,
    );

    net.run_handshake();
    net.exchange_app_data();

    // A fresh session id was assigned.
    assert_ne!(net.client.resumption().unwrap().id, client_resume.id);
}

#[test]
fn no_common_cipher_suite_fails() {
    let (client_creds, server_creds) = psk_credentials();
    let mut net = TestNet::new(
        config_with_suite(CipherSuite::PSK_AES128_CCM_8),
        config_with_suite(CipherSuite::PSK_AES128_GCM_SHA256),
        client_creds,
        server_creds,
    );

    let result = net.settle();
    assert!(result.is_err());
    assert!(!net.client.is_established());

    let failure = result.unwrap_err();
    assert!(matches!(
        failure,
        cadmium::Error::HandshakeFailure(alert)
            if alert.description == AlertDescription::HandshakeFailure
    ));
}
