#![doc = include_str!("../README.md")]

// Public modules
mod common;

pub mod core;
mod dht;
pub mod error;
pub mod testnet;
pub mod transport;

pub use crate::common::{
    closer, distance, AddressFamily, Distance, Id, ImmutableItem, InsertOutcome, MutableError,
    MutableItem, Node, NodeQuality, Rejection, RoutingTable, StorageItem, MAX_BUCKET_SIZE_K,
};
pub use crate::core::{
    DistributeError, DistributeId, DistributeReport, FindNodeReply, GetReply, JobError, JobId,
    Reply, Responder, SearchId, SearchKind, SearchResult, StorageError, StoreOutcome, TokenError,
};
pub use crate::error::Error;
pub use crate::testnet::Testnet;
pub use crate::transport::{MemoryNetwork, MemoryTransport, Transport, TransportError, UdpTransport};
pub use dht::{Config, Dht, EndpointHandle, Info};

pub use bytes::Bytes;
pub use ed25519_dalek::SigningKey;
