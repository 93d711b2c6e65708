//! Sans-IO handshake tests: both endpoints driven directly, datagrams
//! shuttled through an in-memory network.

mod common;
mod edge;
mod fragmentation;
mod handshake;
mod retransmit;
