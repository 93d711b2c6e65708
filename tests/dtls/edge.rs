//! Out-of-order epochs, deferred records, alerts, and replay handling.

use cadmium::message::AlertDescription;
use cadmium::Error;

use crate::common::*;

#[test]
fn next_epoch_record_before_ccs_is_deferred_not_dropped() {
    let mut net = TestNet::psk();

    // Up to flight 5 arriving at the server.
    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    net.pump_client();
    net.deliver_to_server().unwrap();
    net.pump_server();
    net.deliver_to_client().unwrap();
    net.pump_client();
    net.deliver_to_server().unwrap();

    // Flight 6 is one datagram: [CCS, Finished(epoch 1)]. Split it and
    // deliver the Finished BEFORE the CCS: it must be buffered and
    // replayed once the epoch advances.
    let flight6 = net.pump_server();
    assert_eq!(flight6.len(), 1);
    let records = split_records(&flight6[0]);
    assert_eq!(records.len(), 2);
    assert_eq!(parse_records(&records[0])[0].ctype, CCS);
    assert_eq!(parse_records(&records[1])[0].epoch, 1);

    net.to_client.clear();
    net.to_client.push(records[1].clone()); // Finished first
    net.to_client.push(records[0].clone()); // CCS second
    net.deliver_to_client().unwrap();
    net.pump_client();

    assert!(net.client.is_established(), "deferred Finished was replayed");
    assert!(net.client_connected);
}

#[test]
fn record_two_epochs_ahead_is_discarded() {
    let mut net = TestNet::psk();

    net.pump_client();
    net.deliver_to_server().unwrap();
    net.deliver_to_client().unwrap();
    net.pump_client();
    net.deliver_to_server().unwrap();

    // Forge an epoch-2 record; the client must silently discard it and
    // the handshake must continue unscathed.
    let forged = vec![
        23u8, // application data
        0xFE, 0xFD, 0x00, 0x02, // epoch 2
        0x00, 0x00, 0x00, 0x00, 0x00, 0x01, // seq
        0x00, 0x03, // length
        0xAA, 0xBB, 0xCC,
    ];
    net.client.handle_datagram(&forged, net.now).unwrap();
    net.run_handshake();
    net.exchange_app_data();
}

#[test]
fn close_notify_surfaces_as_peer_closed() {
    let mut net = TestNet::psk();
    net.run_handshake();

    // The server says goodbye.
    net.server.as_mut().unwrap().queue_close_notify().unwrap();
    net.pump_server();

    let datagrams: Vec<Vec<u8>> = net.to_client.drain(..).collect();
    let mut last = Ok(());
    for datagram in datagrams {
        last = net.client.handle_datagram(&datagram, net.now);
    }

    assert!(matches!(
        last,
        Err(Error::PeerClosed(alert)) if alert.description == AlertDescription::CloseNotify
    ));

    // The client surfaced the alert to its handler.
    net.pump_client();
    assert!(net
        .client_alerts
        .iter()
        .any(|a| a.description == AlertDescription::CloseNotify));
}

#[test]
fn replayed_application_data_is_delivered_once() {
    let mut net = TestNet::psk();
    net.run_handshake();

    net.client.send_application_data(&[0x42]).unwrap();
    let packets = net.pump_client();
    assert_eq!(packets.len(), 1);

    // Deliver the same record three times; the replay window admits it
    // once.
    for _ in 0..3 {
        net.to_server.push(packets[0].clone());
    }
    net.deliver_to_server().unwrap();
    net.pump_server();

    assert_eq!(net.server_app_data.len(), 1);
    assert_eq!(net.server_app_data[0], vec![0x42]);
}

#[test]
fn garbage_datagram_is_rejected_without_state_change() {
    let mut net = TestNet::psk();
    net.run_handshake();

    // Truncated record header.
    let result = net.client.handle_datagram(&[0x16, 0xFE], net.now);
    assert!(matches!(result, Err(Error::Decode { .. })));

    // The session is unaffected.
    net.exchange_app_data();
}
