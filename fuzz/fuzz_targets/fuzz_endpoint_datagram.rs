#![no_main]

//! Fuzz target for the endpoint datagram path.
//!
//! Feeds arbitrary bytes to a client endpoint mid-handshake, looking for
//! panics in record routing, reassembly and decryption.

use libfuzzer_sys::fuzz_target;
use std::sync::Arc;
use std::time::Instant;

use cadmium::credentials::InMemoryCredentialStore;
use cadmium::{Config, Endpoint};

fuzz_target!(|data: &[u8]| {
    let credentials = Arc::new(InMemoryCredentialStore::new());
    credentials.add_psk("fuzz", "fuzz-secret");
    credentials.set_client_identity("fuzz");

    let config = Arc::new(Config::default());
    let now = Instant::now();

    let mut endpoint = Endpoint::client(
        config,
        credentials,
        "127.0.0.1:5684".parse().unwrap(),
        None,
        now,
    )
    .expect("client endpoint");

    // Drain the initial flight, then feed the input. Errors are fine;
    // panics are not.
    while let Some(_) = endpoint.poll_output() {}
    let _ = endpoint.handle_datagram(data, now);
    while let Some(_) = endpoint.poll_output() {}
});
