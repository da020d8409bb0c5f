//! In-process network, for tests and simulations.

use std::{
    collections::HashMap,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::{Arc, Mutex, MutexGuard},
};

use flume::{Receiver, Sender};
use tracing::trace;

use super::{Transport, TransportError};

type Datagram = (Vec<u8>, SocketAddr);

#[derive(Debug, Default)]
struct Registry {
    next_port: u16,
    endpoints: HashMap<SocketAddr, Sender<Datagram>>,
}

#[derive(Debug, Clone, Default)]
/// A lossless switch between [MemoryTransport]s, datagrams to unknown addresses vanish.
pub struct MemoryNetwork {
    registry: Arc<Mutex<Registry>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a new endpoint on `127.0.0.1` with the next free port.
    pub fn bind_v4(&self) -> MemoryTransport {
        let port = self.next_port();
        self.bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
    }

    /// Bind a new endpoint on `::1` with the next free port.
    pub fn bind_v6(&self) -> MemoryTransport {
        let port = self.next_port();
        self.bind(SocketAddr::from((Ipv6Addr::LOCALHOST, port)))
    }

    /// Bind an endpoint at an explicit address, replacing any previous one.
    pub fn bind(&self, address: SocketAddr) -> MemoryTransport {
        let (sender, receiver) = flume::unbounded();

        self.lock().endpoints.insert(address, sender);

        MemoryTransport {
            address,
            receiver,
            network: self.clone(),
        }
    }

    /// Unplug an endpoint, datagrams sent to it are dropped from now on.
    pub fn disconnect(&self, address: &SocketAddr) {
        self.lock().endpoints.remove(address);
    }

    pub fn is_connected(&self, address: &SocketAddr) -> bool {
        self.lock().endpoints.contains_key(address)
    }

    fn next_port(&self) -> u16 {
        let mut registry = self.lock();
        registry.next_port = registry.next_port.wrapping_add(1).max(1);
        registry.next_port
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // A panic elsewhere can't leave the registry half updated.
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug)]
/// An endpoint on a [MemoryNetwork].
pub struct MemoryTransport {
    address: SocketAddr,
    receiver: Receiver<Datagram>,
    network: MemoryNetwork,
}

impl Transport for MemoryTransport {
    fn local_addr(&self) -> SocketAddr {
        self.address
    }

    fn send_to(&mut self, address: SocketAddr, bytes: &[u8]) -> Result<(), TransportError> {
        let registry = self.network.lock();

        if !registry.endpoints.contains_key(&self.address) {
            return Err(TransportError::Disconnected);
        }

        match registry.endpoints.get(&address) {
            Some(sender) => {
                // The receiving side may be gone already, like any lost datagram.
                let _ = sender.send((bytes.to_vec(), self.address));
            }
            None => {
                trace!(from = ?self.address, to = ?address, "Dropped datagram to unknown address");
            }
        }

        Ok(())
    }

    fn recv_from(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        self.receiver.try_recv().ok()
    }
}
