//! Datagram transports the engine sends and receives KRPC messages through.

mod memory;
mod udp;

use std::net::SocketAddr;

pub use crate::common::AddressFamily;
pub use memory::{MemoryNetwork, MemoryTransport};
pub use udp::UdpTransport;

/// A non-blocking, unreliable datagram endpoint.
///
/// Implementations never block: [Transport::send_to] only enqueues,
/// and [Transport::recv_from] returns `None` once nothing is pending.
pub trait Transport {
    /// The address peers see datagrams coming from.
    fn local_addr(&self) -> SocketAddr;

    /// Enqueue a datagram, dropping it silently if the peer is unreachable.
    fn send_to(&mut self, address: SocketAddr, bytes: &[u8]) -> Result<(), TransportError>;

    /// Take the next pending datagram if any.
    fn recv_from(&mut self) -> Option<(Vec<u8>, SocketAddr)>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn local_addr(&self) -> SocketAddr {
        (**self).local_addr()
    }

    fn send_to(&mut self, address: SocketAddr, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).send_to(address, bytes)
    }

    fn recv_from(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        (**self).recv_from()
    }
}

#[derive(thiserror::Error, Debug)]
/// Errors sending a datagram.
pub enum TransportError {
    #[error(transparent)]
    /// Transparent [std::io::Error]
    Io(#[from] std::io::Error),

    #[error("No endpoint bound for {0:?} addresses")]
    NoEndpoint(AddressFamily),

    #[error("Transport disconnected")]
    Disconnected,
}

/// Lazily drains a [Transport], yielding at most `limit` datagrams.
pub struct Incoming<'a> {
    transport: &'a mut dyn Transport,
    remaining: usize,
}

impl<'a> Incoming<'a> {
    pub fn new(transport: &'a mut dyn Transport, limit: usize) -> Self {
        Self {
            transport,
            remaining: limit,
        }
    }
}

impl Iterator for Incoming<'_> {
    type Item = (Vec<u8>, SocketAddr);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        self.remaining -= 1;
        self.transport.recv_from()
    }
}
