use std::{net::SocketAddr, time::Duration};

use crate::common::Id;
use crate::core::{DEFAULT_MAX_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT, MAX_VALUES, TOKEN_TTL};

#[derive(Debug, Clone)]
/// Dht Configurations
pub struct Config {
    /// This node's [Id].
    ///
    /// Defaults to a random Id.
    pub id: Option<Id>,
    /// Addresses to send a `find_node` for our own id when the routing table is empty.
    ///
    /// Defaults to none.
    pub bootstrap: Vec<SocketAddr>,
    /// How long to wait for a reply before retrying a request.
    ///
    /// Defaults to [DEFAULT_REQUEST_TIMEOUT]
    pub request_timeout: Duration,
    /// How many times a request is sent before it fails with [crate::JobError::Timeout].
    ///
    /// Defaults to [DEFAULT_MAX_ATTEMPTS]
    pub max_attempts: u8,
    /// Lifetime of the write tokens this node issues.
    ///
    /// Defaults to [TOKEN_TTL]
    pub token_ttl: Duration,
    /// Maximum number of items to store for other nodes and ourselves.
    ///
    /// Defaults to [MAX_VALUES]
    pub max_values: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: None,
            bootstrap: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            token_ttl: TOKEN_TTL,
            max_values: MAX_VALUES,
        }
    }
}
