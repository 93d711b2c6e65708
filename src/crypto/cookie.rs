use std::net::SocketAddr;
use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::message::{ClientHello, Cookie};

type HmacSha256 = Hmac<Sha256>;

const SECRET_LEN: usize = 32;

/// Stateless HelloVerifyRequest cookie generator (RFC 6347 section 4.2.1).
///
/// Cookie = HMAC-SHA256(secret, client_addr || client_hello fields). The
/// secret rotates on a fixed interval; verification accepts the current
/// and the previous generation so in-flight handshakes survive a rotation.
pub struct CookieGenerator {
    current: [u8; SECRET_LEN],
    previous: [u8; SECRET_LEN],
    rotated_at: Instant,
    lifetime: Duration,
}

impl CookieGenerator {
    pub fn new(lifetime: Duration, now: Instant) -> Self {
        CookieGenerator {
            current: fresh_secret(),
            previous: fresh_secret(),
            rotated_at: now,
            lifetime,
        }
    }

    /// Generate the cookie for this peer's ClientHello.
    pub fn generate(&mut self, now: Instant, peer: SocketAddr, hello: &ClientHello) -> Cookie {
        self.maybe_rotate(now);
        let mac = self.compute(&self.current, peer, hello);
        Cookie::try_new(&mac).unwrap()
    }

    /// Verify a cookie echoed in a ClientHello, statelessly.
    pub fn verify(&mut self, now: Instant, peer: SocketAddr, hello: &ClientHello) -> bool {
        self.maybe_rotate(now);

        if hello.cookie.is_empty() {
            return false;
        }

        let current = self.compute(&self.current, peer, hello);
        let previous = self.compute(&self.previous, peer, hello);

        let cookie = hello.cookie.as_slice();
        bool::from(current[..].ct_eq(cookie)) || bool::from(previous[..].ct_eq(cookie))
    }

    fn maybe_rotate(&mut self, now: Instant) {
        if now.duration_since(self.rotated_at) >= self.lifetime {
            self.previous = self.current;
            self.current = fresh_secret();
            self.rotated_at = now;
        }
    }

    fn compute(&self, secret: &[u8; SECRET_LEN], peer: SocketAddr, hello: &ClientHello) -> [u8; 32] {
        // HMAC-SHA256 accepts keys of any length.
        let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");

        match peer {
            SocketAddr::V4(a) => mac.update(&a.ip().octets()),
            SocketAddr::V6(a) => mac.update(&a.ip().octets()),
        }
        mac.update(&peer.port().to_be_bytes());
        mac.update(&hello.cookie_input());

        mac.finalize().into_bytes().into()
    }
}

fn fresh_secret() -> [u8; SECRET_LEN] {
    let mut secret = [0u8; SECRET_LEN];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    secret
}
