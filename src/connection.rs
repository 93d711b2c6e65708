//! Per-peer connection: endpoint state, pending sends and the serial
//! executor binding.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, MutexGuard};

use crate::connector::MessageCallback;
use crate::executor::{SerialExecutor, TimerHandle};
use crate::handshake::Endpoint;

/// Application data queued behind an in-progress handshake.
pub(crate) struct PendingSend {
    pub data: Vec<u8>,
    pub callback: Arc<dyn MessageCallback>,
}

/// Endpoint state of one connection. Mutated only from tasks on the
/// connection's serial executor, so the mutex is never contended; it
/// exists to move the state between worker threads.
#[derive(Default)]
pub(crate) struct ConnectionState {
    /// The endpoint carrying the established session, if any.
    pub established: Option<Endpoint>,
    /// An in-progress handshake. May coexist with an established session
    /// until its Finished verifies (RFC 6347 section 4.2.8).
    pub handshake: Option<Endpoint>,
    /// Messages awaiting session establishment. The first entry is the
    /// send that triggered the handshake; its callback observes
    /// `on_connect`.
    pub pending_sends: Vec<PendingSend>,
    /// Outstanding retransmission timer for the handshake.
    pub timer: Option<TimerHandle>,
}

/// One peer's connection, owned by the connection store.
pub struct Connection {
    peer: SocketAddr,
    executor: SerialExecutor,
    last_activity: Mutex<Instant>,
    state: Mutex<ConnectionState>,
}

impl Connection {
    pub(crate) fn new(peer: SocketAddr, executor: SerialExecutor, now: Instant) -> Connection {
        Connection {
            peer,
            executor,
            last_activity: Mutex::new(now),
            state: Mutex::new(ConnectionState::default()),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn executor(&self) -> &SerialExecutor {
        &self.executor
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    pub fn touch(&self, now: Instant) {
        *self.last_activity.lock() = now;
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock()
    }

    /// Does this connection hold an established session?
    pub fn has_established_session(&self) -> bool {
        self.state.lock().established.is_some()
    }

    /// The established session's id, if any. Exposed for tests asserting
    /// session preservation across re-handshakes.
    pub fn established_session_id(&self) -> Option<crate::message::SessionId> {
        self.state
            .lock()
            .established
            .as_ref()
            .map(|e| e.session().id().clone())
    }

    /// A connection with neither a session nor an ongoing handshake holds
    /// nothing worth keeping.
    pub fn is_garbage(&self) -> bool {
        let state = self.state.lock();
        state.established.is_none() && state.handshake.is_none()
    }
}
