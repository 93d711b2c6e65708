//! The UDP connector: socket pump, record dispatch, connection
//! lifecycle, and the outbound send path.
//!
//! One receiver thread pulls datagrams off the socket and resolves the
//! source address to a [`Connection`]; all further processing for that
//! peer runs as tasks on the connection's serial executor over the
//! shared worker pool. The stateless cookie exchange happens before a
//! connection exists, directly on the receiver thread.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::connection::{Connection, PendingSend};
use crate::credentials::CredentialStore;
use crate::executor::{SerialExecutor, TimerService, WorkerPool};
use crate::handshake::{
    parse_initial_client_hello, Endpoint, HelloVerifyResponder, Output,
};
use crate::message::{Alert, ContentType, DtlsRecord, DtlsRecordSlice};
use crate::store::ConnectionStore;
use crate::time::{Clock, SystemClock};
use crate::{Config, Error};

/// Per-message callbacks observed by the application.
pub trait MessageCallback: Send + Sync {
    /// The send triggered a new handshake.
    fn on_connecting(&self) {}
    /// The triggering handshake completed; fired once, for the first
    /// message queued behind it.
    fn on_connect(&self) {}
    /// The message was encrypted and handed to the socket.
    fn on_sent(&self) {}
    /// The message could not be delivered.
    fn on_error(&self, error: &Error) {
        let _ = error;
    }
}

/// Callback for fire-and-forget sends.
pub struct NoopCallback;

impl MessageCallback for NoopCallback {}

/// Receives decrypted application data.
pub type RawDataReceiver = Box<dyn Fn(SocketAddr, Vec<u8>) + Send + Sync>;

/// Observes alerts received from peers.
pub type AlertHandler = Box<dyn Fn(SocketAddr, Alert) + Send + Sync>;

/// Observes session lifecycle per peer.
pub trait SessionListener: Send + Sync {
    fn session_established(&self, peer: SocketAddr) {
        let _ = peer;
    }
    fn session_failed(&self, peer: SocketAddr, error: &Error) {
        let _ = (peer, error);
    }
}

/// DTLS 1.2 connector over a UDP socket.
pub struct Connector {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<Config>,
    credentials: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    store: Arc<ConnectionStore>,
    responder: Mutex<HelloVerifyResponder>,
    raw_data_receiver: Mutex<Option<RawDataReceiver>>,
    alert_handler: Mutex<Option<AlertHandler>>,
    session_listener: Mutex<Option<Arc<dyn SessionListener>>>,
    running: Mutex<Option<Running>>,
    bind_address: Mutex<SocketAddr>,
}

struct Running {
    socket: Arc<UdpSocket>,
    receiver: Option<JoinHandle<()>>,
    pool: Arc<WorkerPool>,
    timers: Arc<TimerService>,
    shutdown: Arc<AtomicBool>,
}

impl Connector {
    /// Create a connector bound (once started) to `bind_address`.
    pub fn new(
        config: Config,
        credentials: Arc<dyn CredentialStore>,
        bind_address: SocketAddr,
    ) -> Connector {
        Self::with_clock(config, credentials, bind_address, Arc::new(SystemClock))
    }

    /// Create a connector with a custom clock, for deterministic tests.
    pub fn with_clock(
        config: Config,
        credentials: Arc<dyn CredentialStore>,
        bind_address: SocketAddr,
        clock: Arc<dyn Clock>,
    ) -> Connector {
        let now = clock.now();
        let config = Arc::new(config);

        Connector {
            inner: Arc::new(Inner {
                store: Arc::new(ConnectionStore::new(config.max_connections())),
                responder: Mutex::new(HelloVerifyResponder::new(
                    config.cookie_secret_lifetime(),
                    now,
                )),
                raw_data_receiver: Mutex::new(None),
                alert_handler: Mutex::new(None),
                session_listener: Mutex::new(None),
                running: Mutex::new(None),
                bind_address: Mutex::new(bind_address),
                credentials,
                clock,
                config,
            }),
        }
    }

    /// Register the handler receiving decrypted application data.
    pub fn set_raw_data_receiver(&self, receiver: RawDataReceiver) {
        *self.inner.raw_data_receiver.lock() = Some(receiver);
    }

    /// Register the handler observing peer alerts.
    pub fn set_alert_handler(&self, handler: AlertHandler) {
        *self.inner.alert_handler.lock() = Some(handler);
    }

    /// Register the session lifecycle listener.
    pub fn set_session_listener(&self, listener: Arc<dyn SessionListener>) {
        *self.inner.session_listener.lock() = Some(listener);
    }

    /// Bind the socket and start the receiver thread, worker pool and
    /// timer service.
    pub fn start(&self) -> Result<(), Error> {
        let mut running = self.inner.running.lock();
        if running.is_some() {
            return Ok(());
        }

        let bind_address = *self.inner.bind_address.lock();
        let socket = UdpSocket::bind(bind_address)?;
        socket.set_read_timeout(Some(Duration::from_millis(50)))?;

        // Remember the concrete address so restart() rebinds it.
        *self.inner.bind_address.lock() = socket.local_addr()?;

        let socket = Arc::new(socket);
        let pool = WorkerPool::new(self.inner.config.worker_threads());
        let timers = TimerService::new();
        let shutdown = Arc::new(AtomicBool::new(false));

        let receiver = {
            let inner = Arc::clone(&self.inner);
            let socket = Arc::clone(&socket);
            let pool = Arc::clone(&pool);
            let timers = Arc::clone(&timers);
            let shutdown = Arc::clone(&shutdown);

            std::thread::Builder::new()
                .name("cadmium-receiver".to_string())
                .spawn(move || {
                    let mut buf = vec![0u8; 65535];
                    while !shutdown.load(Ordering::Acquire) {
                        match socket.recv_from(&mut buf) {
                            Ok((len, peer)) => {
                                let datagram = buf[..len].to_vec();
                                Inner::dispatch(&inner, &socket, &pool, &timers, datagram, peer);
                            }
                            Err(e)
                                if e.kind() == std::io::ErrorKind::WouldBlock
                                    || e.kind() == std::io::ErrorKind::TimedOut =>
                            {
                                continue;
                            }
                            Err(e) => {
                                if shutdown.load(Ordering::Acquire) {
                                    break;
                                }
                                // Transient receive failures keep the loop alive.
                                warn!("receive error: {}", e);
                            }
                        }
                    }
                })
                .expect("spawn receiver thread")
        };

        info!("connector started on {}", socket.local_addr()?);

        *running = Some(Running {
            socket,
            receiver: Some(receiver),
            pool,
            timers,
            shutdown,
        });

        Ok(())
    }

    /// Stop the receiver, cancel timers and drain the worker pool.
    ///
    /// The connection store is preserved so `restart` reuses established
    /// sessions.
    pub fn stop(&self) {
        let Some(mut running) = self.inner.running.lock().take() else {
            return;
        };

        running.shutdown.store(true, Ordering::Release);
        if let Some(receiver) = running.receiver.take() {
            let _ = receiver.join();
        }
        running.timers.shutdown();
        running.pool.shutdown(self.inner.config.drain_timeout());

        // Clear stale timer handles; their service is gone.
        for connection in self.inner.store.connections() {
            connection.state().timer = None;
        }

        info!("connector stopped");
    }

    /// Stop and start again on the same local address if possible, a new
    /// port otherwise. Established sessions survive.
    pub fn restart(&self) -> Result<(), Error> {
        self.stop();

        match self.start() {
            Ok(()) => Ok(()),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::AddrInUse => {
                let mut addr = *self.inner.bind_address.lock();
                addr.set_port(0);
                *self.inner.bind_address.lock() = addr;
                self.start()
            }
            Err(e) => Err(e),
        }
    }

    /// Stop and discard all connection state.
    pub fn destroy(&self) {
        self.stop();
        self.inner.store.clear();
    }

    /// The local socket address, when started.
    pub fn local_address(&self) -> Option<SocketAddr> {
        let running = self.inner.running.lock();
        running.as_ref().and_then(|r| r.socket.local_addr().ok())
    }

    /// The connection store, exposed for capacity inspection in tests.
    pub fn connection_store(&self) -> &Arc<ConnectionStore> {
        &self.inner.store
    }

    /// Largest datagram this connector will emit.
    pub fn maximum_transmission_unit(&self) -> usize {
        self.inner.config.mtu()
    }

    /// Largest application payload a single record to `peer` can carry.
    pub fn maximum_fragment_length(&self, peer: SocketAddr) -> usize {
        let mtu = self.inner.config.mtu();
        let overhead = self
            .inner
            .store
            .get(peer)
            .and_then(|c| {
                let state = c.state();
                state
                    .established
                    .as_ref()
                    .map(|e| e.session().cipher_suite().max_expansion())
            })
            .unwrap_or(0);
        mtu - DtlsRecord::HEADER_LEN - overhead
    }

    /// Send application data to `peer`, establishing a session first if
    /// none exists. Progress is reported through `callback`.
    pub fn send(
        &self,
        data: Vec<u8>,
        peer: SocketAddr,
        callback: Arc<dyn MessageCallback>,
    ) -> Result<(), Error> {
        let (socket, pool, timers) = {
            let running = self.inner.running.lock();
            let Some(running) = running.as_ref() else {
                callback.on_error(&Error::NotRunning);
                return Err(Error::NotRunning);
            };
            (
                Arc::clone(&running.socket),
                Arc::clone(&running.pool),
                Arc::clone(&running.timers),
            )
        };

        let now = self.inner.clock.now();

        let connection = match self.inner.store.get(peer) {
            Some(connection) => connection,
            None => {
                let connection = Arc::new(Connection::new(
                    peer,
                    SerialExecutor::new(Arc::clone(&pool)),
                    now,
                ));
                if let Err(e) = self.inner.store.put(
                    Arc::clone(&connection),
                    now,
                    self.inner.config.connection_idle_threshold(),
                ) {
                    callback.on_error(&e);
                    return Err(Error::StoreFull);
                }
                connection
            }
        };

        let inner = Arc::clone(&self.inner);
        let task_connection = Arc::clone(&connection);
        connection.executor().submit(Box::new(move || {
            inner.send_task(&task_connection, &socket, &timers, data, callback);
        }));

        Ok(())
    }

    /// Send a close_notify and drop the connection to `peer`.
    pub fn close(&self, peer: SocketAddr) {
        let Some(socket) = self
            .inner
            .running
            .lock()
            .as_ref()
            .map(|r| Arc::clone(&r.socket))
        else {
            return;
        };

        let Some(connection) = self.inner.store.get(peer) else {
            return;
        };

        let inner = Arc::clone(&self.inner);
        let task_connection = Arc::clone(&connection);
        connection.executor().submit(Box::new(move || {
            {
                let mut state = task_connection.state();
                if let Some(endpoint) = state.established.as_mut() {
                    let _ = endpoint.queue_close_notify();
                    while let Some(Output::Packet(packet)) = endpoint.poll_output() {
                        let _ = socket.send_to(&packet, task_connection.peer());
                    }
                }
            }
            inner.store.remove(task_connection.peer());
        }));
    }
}

impl Inner {
    /// Receiver-thread entry: resolve the connection and hand the
    /// datagram to its serial executor. Uncookied ClientHellos are
    /// answered statelessly here; no connection is created for them.
    fn dispatch(
        inner: &Arc<Inner>,
        socket: &Arc<UdpSocket>,
        pool: &Arc<WorkerPool>,
        timers: &Arc<TimerService>,
        datagram: Vec<u8>,
        peer: SocketAddr,
    ) {
        let now = inner.clock.now();

        let connection = match inner.store.get(peer) {
            Some(connection) => connection,
            None => {
                // Only a cookie-bearing ClientHello may create state.
                let initial = match parse_initial_client_hello(&datagram) {
                    Ok(Some(initial)) => initial,
                    Ok(None) => {
                        trace!("no connection for {}, dropping datagram", peer);
                        return;
                    }
                    Err(e) => {
                        debug!("malformed datagram from {}: {}", peer, e);
                        return;
                    }
                };

                let mut responder = inner.responder.lock();
                if !responder.cookie_valid(now, peer, &initial.hello) {
                    let hvr = responder.hello_verify_datagram(now, peer, &initial);
                    drop(responder);
                    trace!("answering {} with HelloVerifyRequest", peer);
                    let _ = socket.send_to(&hvr, peer);
                    return;
                }
                drop(responder);

                let connection = Arc::new(Connection::new(
                    peer,
                    SerialExecutor::new(Arc::clone(pool)),
                    now,
                ));
                match inner.store.put(
                    Arc::clone(&connection),
                    now,
                    inner.config.connection_idle_threshold(),
                ) {
                    Ok(()) => connection,
                    Err(_) => {
                        // RFC 6347 4.2.8: abort silently, no alert.
                        debug!("connection store full, dropping handshake from {}", peer);
                        return;
                    }
                }
            }
        };

        connection.touch(now);

        let inner = Arc::clone(inner);
        let socket = Arc::clone(socket);
        let timers = Arc::clone(timers);
        let task_connection = Arc::clone(&connection);
        connection.executor().submit(Box::new(move || {
            inner.process_datagram(&task_connection, &socket, &timers, &datagram);
        }));
    }

    /// Worker-task entry: route each record of the datagram to the
    /// handshaker or the established endpoint and drive the outcome.
    fn process_datagram(
        self: &Arc<Inner>,
        connection: &Arc<Connection>,
        socket: &Arc<UdpSocket>,
        timers: &Arc<TimerService>,
        datagram: &[u8],
    ) {
        let now = self.clock.now();
        let peer = connection.peer();

        let mut state = connection.state();

        let mut rest = &datagram[..];
        loop {
            let slice = match DtlsRecordSlice::try_read(rest) {
                Ok(Some(slice)) => slice,
                Ok(None) => break,
                Err(e) => {
                    debug!("malformed record from {}: {}", peer, e);
                    break;
                }
            };
            let record_bytes = slice.slice;
            rest = slice.rest;

            let content_type = ContentType::from_u8(record_bytes[0]);
            let epoch = u16::from_be_bytes([record_bytes[3], record_bytes[4]]);

            let result = match content_type {
                ContentType::Handshake | ContentType::ChangeCipherSpec => {
                    if epoch == 0
                        && state.handshake.is_none()
                        && is_client_hello(record_bytes)
                    {
                        self.start_server_handshake(&mut state, peer, record_bytes, socket, now)
                    } else if let Some(endpoint) = state.handshake.as_mut() {
                        endpoint.handle_datagram(record_bytes, now)
                    } else if let Some(endpoint) = state.established.as_mut() {
                        endpoint.handle_datagram(record_bytes, now)
                    } else {
                        trace!("no endpoint for handshake record from {}", peer);
                        Ok(())
                    }
                }
                ContentType::ApplicationData => {
                    if let Some(endpoint) = state.established.as_mut() {
                        endpoint.handle_datagram(record_bytes, now)
                    } else if let Some(endpoint) = state.handshake.as_mut() {
                        endpoint.handle_datagram(record_bytes, now)
                    } else {
                        Ok(())
                    }
                }
                _ => {
                    // Alerts and unknown types go to whichever endpoint is
                    // most advanced for this record's epoch.
                    if let Some(endpoint) = state.handshake.as_mut().filter(|_| epoch == 0) {
                        endpoint.handle_datagram(record_bytes, now)
                    } else if let Some(endpoint) = state.established.as_mut() {
                        endpoint.handle_datagram(record_bytes, now)
                    } else if let Some(endpoint) = state.handshake.as_mut() {
                        endpoint.handle_datagram(record_bytes, now)
                    } else {
                        Ok(())
                    }
                }
            };

            if let Err(e) = result {
                self.handle_endpoint_error(connection, &mut state, socket, e);
            }
        }

        self.drive(connection, &mut state, socket, timers, now);
    }

    /// Create a server handshaker from a cookie-verified ClientHello.
    ///
    /// An established session is left untouched; it is only replaced
    /// once the new handshake's Finished verifies (RFC 6347 4.2.8).
    fn start_server_handshake(
        self: &Arc<Inner>,
        state: &mut crate::connection::ConnectionState,
        peer: SocketAddr,
        record_bytes: &[u8],
        socket: &Arc<UdpSocket>,
        now: Instant,
    ) -> Result<(), Error> {
        let Some(initial) = parse_initial_client_hello(record_bytes)? else {
            return Ok(());
        };

        {
            let mut responder = self.responder.lock();
            if !responder.cookie_valid(now, peer, &initial.hello) {
                let hvr = responder.hello_verify_datagram(now, peer, &initial);
                drop(responder);
                let _ = socket.send_to(&hvr, peer);
                return Ok(());
            }
        }

        let resumable = state.established.as_ref().and_then(|e| e.resumption());

        let endpoint = Endpoint::server(
            Arc::clone(&self.config),
            Arc::clone(&self.credentials),
            peer,
            initial.hello,
            initial.raw,
            initial.message_seq,
            initial.record_sequence,
            resumable,
            now,
        )?;

        state.handshake = Some(endpoint);
        Ok(())
    }

    /// The send path body, running on the connection's executor.
    fn send_task(
        self: &Arc<Inner>,
        connection: &Arc<Connection>,
        socket: &Arc<UdpSocket>,
        timers: &Arc<TimerService>,
        data: Vec<u8>,
        callback: Arc<dyn MessageCallback>,
    ) {
        let now = self.clock.now();
        let peer = connection.peer();
        connection.touch(now);

        let mut state = connection.state();

        if let Some(endpoint) = state.established.as_mut() {
            match endpoint.send_application_data(&data) {
                Ok(()) => {
                    // Drain directly so a socket failure reaches this
                    // message's callback.
                    let mut io_error: Option<std::io::Error> = None;
                    while let Some(output) = endpoint.poll_output() {
                        match output {
                            Output::Packet(packet) => {
                                if let Err(e) = socket.send_to(&packet, peer) {
                                    io_error = Some(e);
                                }
                            }
                            Output::ApplicationData(incoming) => self.deliver(peer, incoming),
                            Output::PeerAlert(alert) => self.notify_alert(peer, alert),
                            Output::Connected => {}
                        }
                    }
                    match io_error {
                        None => callback.on_sent(),
                        Some(e) => callback.on_error(&Error::Io(e)),
                    }
                }
                Err(e) => {
                    callback.on_error(&e);
                }
            }
            return;
        }

        state.pending_sends.push(PendingSend { data, callback });

        if state.handshake.is_none() {
            let resume = None;
            match Endpoint::client(
                Arc::clone(&self.config),
                Arc::clone(&self.credentials),
                peer,
                resume,
                now,
            ) {
                Ok(endpoint) => {
                    state.handshake = Some(endpoint);
                    if let Some(pending) = state.pending_sends.first() {
                        pending.callback.on_connecting();
                    }
                    self.drive(connection, &mut state, socket, timers, now);
                }
                Err(e) => {
                    for pending in state.pending_sends.drain(..) {
                        pending.callback.on_error(&e);
                    }
                    drop(state);
                    self.store.remove(peer);
                }
            }
        }
    }

    /// Timer-fired retransmission, on the connection's executor.
    fn timeout_task(
        self: &Arc<Inner>,
        connection: &Arc<Connection>,
        socket: &Arc<UdpSocket>,
        timers: &Arc<TimerService>,
    ) {
        let now = self.clock.now();
        let mut state = connection.state();
        state.timer = None;

        let Some(endpoint) = state.handshake.as_mut() else {
            return;
        };

        match endpoint.handle_timeout(now) {
            Ok(()) => {
                self.drive(connection, &mut state, socket, timers, now);
            }
            Err(e) => {
                self.fail_handshake(connection, &mut state, socket, e);
            }
        }
    }

    /// Drain endpoint outputs: packets to the socket, events to the
    /// application, and the retransmission timer rescheduled.
    fn drive(
        self: &Arc<Inner>,
        connection: &Arc<Connection>,
        state: &mut crate::connection::ConnectionState,
        socket: &Arc<UdpSocket>,
        timers: &Arc<TimerService>,
        now: Instant,
    ) {
        let peer = connection.peer();
        let mut promote = false;

        if let Some(endpoint) = state.handshake.as_mut() {
            while let Some(output) = endpoint.poll_output() {
                match output {
                    Output::Packet(packet) => {
                        if let Err(e) = socket.send_to(&packet, peer) {
                            warn!("send to {} failed: {}", peer, e);
                        }
                    }
                    Output::Connected => promote = true,
                    Output::ApplicationData(data) => self.deliver(peer, data),
                    Output::PeerAlert(alert) => self.notify_alert(peer, alert),
                }
            }
        }

        if promote {
            // Only now does a re-handshake replace the old session.
            let endpoint = state.handshake.take().expect("endpoint just polled");
            state.established = Some(endpoint);

            if let Some(listener) = self.session_listener.lock().clone() {
                listener.session_established(peer);
            }

            let pending: Vec<PendingSend> = state.pending_sends.drain(..).collect();
            let endpoint = state.established.as_mut().expect("just placed");
            for (i, send) in pending.into_iter().enumerate() {
                match endpoint.send_application_data(&send.data) {
                    Ok(()) => {
                        if i == 0 {
                            send.callback.on_connect();
                        }
                        send.callback.on_sent();
                    }
                    Err(e) => send.callback.on_error(&e),
                }
            }
        }

        if let Some(endpoint) = state.established.as_mut() {
            while let Some(output) = endpoint.poll_output() {
                match output {
                    Output::Packet(packet) => {
                        if let Err(e) = socket.send_to(&packet, peer) {
                            warn!("send to {} failed: {}", peer, e);
                        }
                    }
                    Output::ApplicationData(data) => self.deliver(peer, data),
                    Output::PeerAlert(alert) => self.notify_alert(peer, alert),
                    Output::Connected => {}
                }
            }
        }

        // Reschedule the handshake retransmission timer.
        if let Some(handle) = state.timer.take() {
            timers.cancel(handle);
        }
        if let Some(at) = state.handshake.as_ref().and_then(|h| h.next_timeout()) {
            let delay = at.saturating_duration_since(now);
            let inner = Arc::clone(self);
            let timer_connection = Arc::clone(connection);
            let timer_socket = Arc::clone(socket);
            let timer_timers = Arc::clone(timers);

            state.timer = Some(timers.schedule_after(
                delay,
                Box::new(move || {
                    let task_inner = Arc::clone(&inner);
                    let task_connection = Arc::clone(&timer_connection);
                    let task_socket = Arc::clone(&timer_socket);
                    let task_timers = Arc::clone(&timer_timers);
                    timer_connection.executor().submit(Box::new(move || {
                        task_inner.timeout_task(&task_connection, &task_socket, &task_timers);
                    }));
                }),
            ));
        }
    }

    fn handle_endpoint_error(
        self: &Arc<Inner>,
        connection: &Arc<Connection>,
        state: &mut crate::connection::ConnectionState,
        socket: &Arc<UdpSocket>,
        error: Error,
    ) {
        let peer = connection.peer();

        match error {
            Error::PeerClosed(alert) => {
                // close_notify or fatal alert: tear the connection down.
                // The alert itself reaches the handler when the endpoint's
                // PeerAlert event is drained.
                debug!("peer {} closed: {}", peer, alert);
                self.store.remove(peer);
            }
            error if state.handshake.is_some() => {
                self.fail_handshake(connection, state, socket, error);
            }
            error => {
                // Errors on an established session's traffic are logged;
                // the session survives forged or malformed records.
                debug!("record error from {}: {}", peer, error);
            }
        }
    }

    /// Abort the in-progress handshake: send its alert, fail pending
    /// sends with the cause, and drop the connection if nothing remains.
    fn fail_handshake(
        self: &Arc<Inner>,
        connection: &Arc<Connection>,
        state: &mut crate::connection::ConnectionState,
        socket: &Arc<UdpSocket>,
        error: Error,
    ) {
        let peer = connection.peer();
        debug!("handshake with {} failed: {}", peer, error);

        if let Some(mut endpoint) = state.handshake.take() {
            endpoint.fail(&error);
            while let Some(Output::Packet(packet)) = endpoint.poll_output() {
                let _ = socket.send_to(&packet, peer);
            }
        }

        for pending in state.pending_sends.drain(..) {
            pending.callback.on_error(&error);
        }

        if let Some(listener) = self.session_listener.lock().clone() {
            listener.session_failed(peer, &error);
        }

        if state.established.is_none() {
            self.store.remove(peer);
        }
    }

    fn deliver(&self, peer: SocketAddr, data: Vec<u8>) {
        if let Some(receiver) = self.raw_data_receiver.lock().as_ref() {
            receiver(peer, data);
        }
    }

    fn notify_alert(&self, peer: SocketAddr, alert: Alert) {
        if let Some(handler) = self.alert_handler.lock().as_ref() {
            handler(peer, alert);
        }
    }
}

/// Is this record a ClientHello? Peeks the handshake type byte behind
/// the 13-byte record header without a full parse.
fn is_client_hello(record_bytes: &[u8]) -> bool {
    record_bytes.first() == Some(&ContentType::Handshake.as_u8())
        && record_bytes.get(DtlsRecord::HEADER_LEN)
            == Some(&crate::message::MessageType::ClientHello.as_u8())
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.stop();
    }
}
