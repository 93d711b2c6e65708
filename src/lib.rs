//! cadmium — a DTLS 1.2 (RFC 6347) connector over UDP.
//!
//! cadmium provides authenticated, confidential datagram transport for
//! constrained peers, the kind of link a CoAPS stack sits on. It
//! implements the DTLS 1.2 handshake with PSK, ECDHE_PSK and
//! ECDHE_ECDSA key exchanges, raw-public-key (RFC 7250) and X.509
//! server authentication, the stateless cookie exchange, and full and
//! abbreviated (session-resumption) flows.
//!
//! # Architecture
//!
//! Two layers:
//!
//! - A **sans-IO protocol core** ([`Endpoint`]): one per peer, driven by
//!   feeding datagrams ([`Endpoint::handle_datagram`]), timers
//!   ([`Endpoint::handle_timeout`]) and draining
//!   [`Endpoint::poll_output`]. The core owns the handshake state
//!   machine, the record layer (epochs, anti-replay, fragmentation,
//!   flight retransmission, deferred out-of-order records) and the
//!   established [`Session`].
//! - A **connector shell** ([`Connector`]): owns the UDP socket, one
//!   receiver thread, a shared worker pool and a timer service. Inbound
//!   datagrams resolve to a [`Connection`] by source address and are
//!   processed on that connection's serial executor, so no two tasks
//!   for the same peer ever run concurrently while different peers
//!   proceed in parallel. A bounded LRU [`ConnectionStore`] holds the
//!   per-peer state.
//!
//! # Example (connector)
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use cadmium::credentials::InMemoryCredentialStore;
//! use cadmium::{Config, Connector, NoopCallback};
//!
//! let credentials = Arc::new(InMemoryCredentialStore::new());
//! credentials.add_psk("Client_identity", "secretPSK");
//! credentials.set_client_identity("Client_identity");
//!
//! let connector = Connector::new(
//!     Config::default(),
//!     credentials,
//!     "0.0.0.0:0".parse().unwrap(),
//! );
//! connector.set_raw_data_receiver(Box::new(|peer, data| {
//!     println!("{} sent {} bytes", peer, data.len());
//! }));
//! connector.start().unwrap();
//!
//! // The first send to a peer triggers the handshake; the message is
//! // queued and flushed once the session establishes.
//! connector
//!     .send(vec![0x01], "198.51.100.7:5684".parse().unwrap(), Arc::new(NoopCallback))
//!     .unwrap();
//! ```
//!
//! # Non-goals
//!
//! - DTLS 1.3
//! - Renegotiation (refused with a no_renegotiation warning)
//! - Compression (NULL only)
//! - Explicit-prime / char2 ECC curves (named curves only)
//!
//! Session resumption is opportunistic and in-memory; nothing is
//! persisted.

#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::upper_case_acronyms)]
#![allow(clippy::len_without_is_empty)]

// Full DTLS 1.2 handshake flow:
//
// Client                                               Server
//
// 1     ClientHello                  -------->
//
// 2                                  <--------   HelloVerifyRequest
//                                                 (contains cookie)
//
// 3     ClientHello                  -------->
//       (with cookie)
// 4                                                     ServerHello
//                                                      Certificate*
//                                                ServerKeyExchange*
//                                    <--------      ServerHelloDone
// 5     ClientKeyExchange
//       [ChangeCipherSpec]
//       Finished                     -------->
// 6                                              [ChangeCipherSpec]
//                                    <--------             Finished
//       Application Data             <------->     Application Data

#[macro_use]
extern crate log;

mod buffer;
mod util;
mod window;

mod timer;

mod error;
pub use error::Error;

mod config;
pub use config::{Config, ConfigBuilder};

pub mod certificate;
pub mod credentials;
pub mod crypto;
pub mod message;

mod session;
pub use session::{PeerIdentity, Session};

pub mod handshake;
pub use handshake::{Endpoint, Output, Resumption};

mod connection;
pub use connection::Connection;

mod store;
pub use store::ConnectionStore;

mod executor;
mod time;
pub use time::{Clock, SystemClock};

mod connector;
pub use connector::{
    AlertHandler, Connector, MessageCallback, NoopCallback, RawDataReceiver, SessionListener,
};
