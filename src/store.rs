//! Bounded, least-recently-used connection store keyed by peer address.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::connection::Connection;
use crate::Error;

/// Address-keyed connection store with a fixed capacity.
///
/// When full, `put` evicts the least-recently-used entry whose last
/// activity exceeds the staleness threshold; if every entry is fresh the
/// put fails and the caller aborts the new handshake silently
/// (RFC 6347 section 4.2.8).
pub struct ConnectionStore {
    capacity: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    map: HashMap<SocketAddr, Arc<Connection>>,
    /// Access order, least recently used first.
    order: Vec<SocketAddr>,
}

impl ConnectionStore {
    pub fn new(capacity: usize) -> ConnectionStore {
        ConnectionStore {
            capacity,
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Fetch a connection and mark it most recently used.
    pub fn get(&self, peer: SocketAddr) -> Option<Arc<Connection>> {
        let mut inner = self.inner.lock();
        let connection = inner.map.get(&peer).cloned()?;
        touch(&mut inner.order, peer);
        Some(connection)
    }

    /// Insert a connection, evicting one stale entry if at capacity.
    pub fn put(
        &self,
        connection: Arc<Connection>,
        now: Instant,
        staleness: Duration,
    ) -> Result<(), Error> {
        let peer = connection.peer();
        let mut inner = self.inner.lock();

        if inner.map.contains_key(&peer) {
            inner.map.insert(peer, connection);
            touch(&mut inner.order, peer);
            return Ok(());
        }

        if inner.map.len() >= self.capacity {
            let stale = inner
                .order
                .iter()
                .copied()
                .find(|addr| {
                    inner
                        .map
                        .get(addr)
                        .map(|c| now.duration_since(c.last_activity()) >= staleness)
                        .unwrap_or(true)
                });

            match stale {
                Some(victim) => {
                    debug!("evicting stale connection {}", victim);
                    inner.map.remove(&victim);
                    inner.order.retain(|a| *a != victim);
                }
                None => return Err(Error::StoreFull),
            }
        }

        inner.map.insert(peer, connection);
        inner.order.push(peer);
        Ok(())
    }

    pub fn remove(&self, peer: SocketAddr) -> Option<Arc<Connection>> {
        let mut inner = self.inner.lock();
        inner.order.retain(|a| *a != peer);
        inner.map.remove(&peer)
    }

    pub fn remaining_capacity(&self) -> usize {
        let inner = self.inner.lock();
        self.capacity - inner.map.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.map.clear();
        inner.order.clear();
    }

    /// All stored connections, for shutdown sweeps.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner.lock().map.values().cloned().collect()
    }
}

fn touch(order: &mut Vec<SocketAddr>, peer: SocketAddr) {
    order.retain(|a| *a != peer);
    order.push(peer);
}
