//! Write tokens handed out on reads and redeemed by writes.

use std::{
    fmt::{self, Debug, Formatter},
    net::SocketAddr,
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use crc::{Crc, CRC_32_ISCSI};
use lru::LruCache;
use tracing::trace;

use crate::common::Id;

/// Default lifetime of an issued token.
pub const TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

const SECRET_SIZE: usize = 20;
/// Size of a token in bytes.
pub const TOKEN_SIZE: usize = 4;
/// Outstanding tokens kept before the least recently issued ones are dropped.
const MAX_OUTSTANDING_TOKENS: usize = 10_000;
const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Opaque proof of a recent read, required to write the same target.
pub type Token = [u8; TOKEN_SIZE];

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// No matching token was issued to this address for this target,
    /// or it was already redeemed.
    #[error("Write token required")]
    TokenRequired,

    #[error("Write token expired")]
    TokenExpired,
}

impl TokenError {
    /// KRPC error code sent to remote writers.
    pub fn code(&self) -> i32 {
        match self {
            TokenError::TokenRequired => 203,
            TokenError::TokenExpired => 209,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Issued {
    token: Token,
    issued_at: Instant,
}

/// Tokens generator and ledger.
///
/// Unlike [BEP_0005](https://www.bittorrent.org/beps/bep_0005.html)'s stateless tokens,
/// every token is remembered until it is redeemed by an accepted write or expires.
pub struct Tokens {
    secret: [u8; SECRET_SIZE],
    ttl: Duration,
    issued: LruCache<(SocketAddr, Id), Issued>,
    counter: u64,
}

impl Debug for Tokens {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Tokens ({} outstanding)", self.issued.len())
    }
}

impl Tokens {
    /// Create a Tokens generator.
    pub fn new(ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(MAX_OUTSTANDING_TOKENS).unwrap_or(NonZeroUsize::MIN);

        Tokens {
            secret: rand::random(),
            ttl,
            issued: LruCache::new(capacity),
            counter: 0,
        }
    }

    // === Getters ===

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of issued tokens not yet redeemed or pruned.
    pub fn outstanding(&self) -> usize {
        self.issued.len()
    }

    // === Public Methods ===

    /// Issue a fresh token for `address` to write `target`, replacing any older one.
    pub fn issue(&mut self, address: SocketAddr, target: &Id, now: Instant) -> Token {
        self.counter = self.counter.wrapping_add(1);

        let token = self.generate(address, target);
        self.issued.put(
            (address, *target),
            Issued {
                token,
                issued_at: now,
            },
        );

        token
    }

    /// Check a token without consuming it.
    pub fn validate(
        &self,
        token: &[u8],
        address: SocketAddr,
        target: &Id,
        now: Instant,
    ) -> Result<(), TokenError> {
        let issued = self
            .issued
            .peek(&(address, *target))
            .filter(|issued| issued.token == token)
            .ok_or(TokenError::TokenRequired)?;

        if now.saturating_duration_since(issued.issued_at) > self.ttl {
            return Err(TokenError::TokenExpired);
        }

        Ok(())
    }

    /// Validate and consume a token, it can't be redeemed twice.
    pub fn redeem(
        &mut self,
        token: &[u8],
        address: SocketAddr,
        target: &Id,
        now: Instant,
    ) -> Result<(), TokenError> {
        let result = self.validate(token, address, target, now);

        if !matches!(result, Err(TokenError::TokenRequired)) {
            self.issued.pop(&(address, *target));
        }

        result
    }

    /// Forget expired tokens.
    pub fn prune(&mut self, now: Instant) {
        let ttl = self.ttl;

        let expired: Vec<(SocketAddr, Id)> = self
            .issued
            .iter()
            .filter(|(_, issued)| now.saturating_duration_since(issued.issued_at) > ttl)
            .map(|(key, _)| *key)
            .collect();

        if !expired.is_empty() {
            trace!(count = expired.len(), "Pruning expired tokens");
        }

        for key in expired {
            self.issued.pop(&key);
        }
    }

    // === Private Methods ===

    fn generate(&self, address: SocketAddr, target: &Id) -> Token {
        let mut digest = CASTAGNOLI.digest();

        match address {
            SocketAddr::V4(address) => digest.update(&address.ip().octets()),
            SocketAddr::V6(address) => digest.update(&address.ip().octets()),
        }

        digest.update(&address.port().to_be_bytes());
        digest.update(target.as_bytes());
        digest.update(&self.counter.to_be_bytes());
        digest.update(&self.secret);

        digest.finalize().to_be_bytes()
    }
}

impl Default for Tokens {
    fn default() -> Self {
        Self::new(TOKEN_TTL)
    }
}
