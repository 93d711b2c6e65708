use std::time::Duration;

use crate::message::CipherSuite;
use crate::Error;

/// Connector configuration.
#[derive(Clone, Debug)]
pub struct Config {
    mtu: usize,
    retransmit_timeout: Duration,
    max_retransmissions: usize,
    connection_idle_threshold: Duration,
    cookie_secret_lifetime: Duration,
    max_connections: usize,
    max_deferred_records: usize,
    max_fragmented_handshake_length: usize,
    worker_threads: usize,
    drain_timeout: Duration,
    cipher_suites: Vec<CipherSuite>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder {
            mtu: 1280,
            retransmit_timeout: Duration::from_millis(500),
            max_retransmissions: 2,
            connection_idle_threshold: Duration::from_secs(60),
            cookie_secret_lifetime: Duration::from_secs(60),
            max_connections: 150_000,
            max_deferred_records: 16,
            max_fragmented_handshake_length: 8192,
            worker_threads: 2,
            drain_timeout: Duration::from_millis(100),
            cipher_suites: CipherSuite::default_suites(),
        }
    }

    /// Max transmission unit.
    ///
    /// The largest size UDP datagrams we will produce.
    #[inline(always)]
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Initial retransmission timeout for a handshake flight.
    ///
    /// Doubled on every retransmission.
    #[inline(always)]
    pub fn retransmit_timeout(&self) -> Duration {
        self.retransmit_timeout
    }

    /// Max number of retransmissions per flight.
    ///
    /// A flight is sent at most `max_retransmissions + 1` times.
    #[inline(always)]
    pub fn max_retransmissions(&self) -> usize {
        self.max_retransmissions
    }

    /// Inactivity threshold after which a connection may be evicted from a
    /// full connection store.
    #[inline(always)]
    pub fn connection_idle_threshold(&self) -> Duration {
        self.connection_idle_threshold
    }

    /// Rotation interval for the HelloVerifyRequest cookie secret.
    ///
    /// The current and the previous secret generation are both accepted.
    #[inline(always)]
    pub fn cookie_secret_lifetime(&self) -> Duration {
        self.cookie_secret_lifetime
    }

    /// Capacity of the connection store.
    #[inline(always)]
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Max number of next-epoch records buffered while waiting for the
    /// peer's ChangeCipherSpec.
    #[inline(always)]
    pub fn max_deferred_records(&self) -> usize {
        self.max_deferred_records
    }

    /// Max reassembled length of a fragmented handshake message.
    #[inline(always)]
    pub fn max_fragmented_handshake_length(&self) -> usize {
        self.max_fragmented_handshake_length
    }

    /// Number of worker threads processing connection tasks.
    #[inline(always)]
    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// How long `stop()` waits for in-flight tasks to drain.
    #[inline(always)]
    pub fn drain_timeout(&self) -> Duration {
        self.drain_timeout
    }

    /// Cipher suites offered (client) or accepted (server), in preference
    /// order.
    #[inline(always)]
    pub fn cipher_suites(&self) -> &[CipherSuite] {
        &self.cipher_suites
    }
}

/// Builder for connector configuration.
pub struct ConfigBuilder {
    mtu: usize,
    retransmit_timeout: Duration,
    max_retransmissions: usize,
    connection_idle_threshold: Duration,
    cookie_secret_lifetime: Duration,
    max_connections: usize,
    max_deferred_records: usize,
    max_fragmented_handshake_length: usize,
    worker_threads: usize,
    drain_timeout: Duration,
    cipher_suites: Vec<CipherSuite>,
}

impl ConfigBuilder {
    /// Set the max transmission unit (MTU). Defaults to 1280.
    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// Set the initial flight retransmission timeout. Defaults to 500 ms.
    pub fn retransmit_timeout(mut self, timeout: Duration) -> Self {
        self.retransmit_timeout = timeout;
        self
    }

    /// Set the max number of retransmissions per flight. Defaults to 2.
    pub fn max_retransmissions(mut self, count: usize) -> Self {
        self.max_retransmissions = count;
        self
    }

    /// Set the idle threshold for stale-connection eviction. Defaults to 60 s.
    pub fn connection_idle_threshold(mut self, threshold: Duration) -> Self {
        self.connection_idle_threshold = threshold;
        self
    }

    /// Set the cookie secret rotation interval. Defaults to 60 s.
    pub fn cookie_secret_lifetime(mut self, lifetime: Duration) -> Self {
        self.cookie_secret_lifetime = lifetime;
        self
    }

    /// Set the connection store capacity. Defaults to 150 000.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the max number of deferred next-epoch records. Defaults to 16.
    pub fn max_deferred_records(mut self, max: usize) -> Self {
        self.max_deferred_records = max;
        self
    }

    /// Set the max reassembled handshake message length. Defaults to 8192.
    pub fn max_fragmented_handshake_length(mut self, max: usize) -> Self {
        self.max_fragmented_handshake_length = max;
        self
    }

    /// Set the worker pool size. Defaults to 2.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Set the stop() drain timeout. Defaults to 100 ms.
    pub fn drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Set the cipher suites, in preference order.
    pub fn cipher_suites(mut self, suites: Vec<CipherSuite>) -> Self {
        self.cipher_suites = suites;
        self
    }

    /// Build the configuration, validating field ranges.
    pub fn build(self) -> Result<Config, Error> {
        if self.mtu < 256 {
            return Err(Error::Config(format!("mtu {} too small", self.mtu)));
        }
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be > 0".into()));
        }
        if self.worker_threads == 0 {
            return Err(Error::Config("worker_threads must be > 0".into()));
        }
        if self.cipher_suites.is_empty() {
            return Err(Error::Config("no cipher suites configured".into()));
        }
        if self.retransmit_timeout.is_zero() {
            return Err(Error::Config("retransmit_timeout must be > 0".into()));
        }

        Ok(Config {
            mtu: self.mtu,
            retransmit_timeout: self.retransmit_timeout,
            max_retransmissions: self.max_retransmissions,
            connection_idle_threshold: self.connection_idle_threshold,
            cookie_secret_lifetime: self.cookie_secret_lifetime,
            max_connections: self.max_connections,
            max_deferred_records: self.max_deferred_records,
            max_fragmented_handshake_length: self.max_fragmented_handshake_length,
            worker_threads: self.worker_threads,
            drain_timeout: self.drain_timeout,
            cipher_suites: self.cipher_suites,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::builder()
            .build()
            .expect("Default config should always validate")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = Config::default();
        assert_eq!(config.mtu(), 1280);
        assert_eq!(config.retransmit_timeout(), Duration::from_millis(500));
        assert_eq!(config.max_retransmissions(), 2);
        assert_eq!(
            config.connection_idle_threshold(),
            Duration::from_secs(60)
        );
        assert!(!config.cipher_suites().is_empty());
    }

    #[test]
    fn rejects_tiny_mtu() {
        assert!(Config::builder().mtu(100).build().is_err());
    }

    #[test]
    fn rejects_empty_suites() {
        assert!(Config::builder().cipher_suites(vec![]).build().is_err());
    }
}
