//! Core DHT logic - pure state machines with no direct I/O.
//!
//! Contains the request [job] state, the [search] and [distribute] drivers,
//! the [server] request handler and the [storage] and [tokens] it owns.
//! The engine in `dht` owns all of them and feeds them datagrams and time.

pub(crate) mod distribute;
pub(crate) mod job;
pub(crate) mod search;
pub(crate) mod server;
pub(crate) mod storage;
pub(crate) mod tokens;

pub use distribute::{DistributeError, DistributeId, DistributeReport};
pub use job::{
    FindNodeReply, GetReply, JobError, JobId, JobState, Reply, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use search::{Responder, SearchId, SearchKind, SearchResult, ALPHA};
pub use server::Server;
pub use storage::{
    check_limits, Storage, StorageError, StoreOutcome, MAX_SALT_SIZE, MAX_VALUES, MAX_VALUE_SIZE,
};
pub use tokens::{Token, TokenError, Tokens, TOKEN_SIZE, TOKEN_TTL};
