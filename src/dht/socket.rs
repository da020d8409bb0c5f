//! KRPC framing over the bound transports.

use std::fmt::{self, Debug, Formatter};
use std::io::ErrorKind;
use std::net::SocketAddr;

use tracing::{debug, trace};

use crate::common::{
    AddressFamily, ErrorSpecific, Message, MessageType, RequestSpecific, ResponseSpecific,
};
use crate::transport::{Incoming, Transport, TransportError};

const VERSION: [u8; 4] = [83, 68, 0, 1]; // "SD" version 01

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A transport bound to a [crate::Dht].
pub struct EndpointHandle(pub(crate) usize);

struct Endpoint {
    handle: EndpointHandle,
    family: AddressFamily,
    transport: Box<dyn Transport>,
}

/// Formats outgoing KRPC messages and decodes incoming ones.
pub(crate) struct KrpcSocket {
    next_tid: u32,
    endpoints: Vec<Endpoint>,
}

impl Debug for KrpcSocket {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("KrpcSocket")
            .field("next_tid", &self.next_tid)
            .field("endpoints", &self.local_addrs())
            .finish()
    }
}

impl KrpcSocket {
    pub fn new() -> Self {
        Self {
            next_tid: rand::random(),
            endpoints: Vec::new(),
        }
    }

    // === Getters ===

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.endpoints
            .iter()
            .map(|endpoint| endpoint.transport.local_addr())
            .collect()
    }

    pub fn local_addr(&self, handle: EndpointHandle) -> Option<SocketAddr> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.handle == handle)
            .map(|endpoint| endpoint.transport.local_addr())
    }

    // === Public Methods ===

    pub fn bind(&mut self, transport: Box<dyn Transport>) -> EndpointHandle {
        let handle = EndpointHandle(self.endpoints.len());
        let family = AddressFamily::of(&transport.local_addr());

        debug!(address = ?transport.local_addr(), ?family, "Bound endpoint");

        self.endpoints.push(Endpoint {
            handle,
            family,
            transport,
        });

        handle
    }

    /// Send a request with a fresh transaction id and return that id.
    pub fn request(
        &mut self,
        address: SocketAddr,
        request: RequestSpecific,
    ) -> Result<u32, TransportError> {
        let message = Message {
            transaction_id: self.tid(),
            version: Some(VERSION.to_vec()),
            message_type: MessageType::Request(request),
        };

        let tid = message.transaction_id;
        self.send(address, message)?;

        Ok(tid)
    }

    /// Send a response to the given address.
    pub fn response(
        &mut self,
        address: SocketAddr,
        transaction_id: u32,
        response: ResponseSpecific,
    ) {
        let message = Message {
            transaction_id,
            version: Some(VERSION.to_vec()),
            message_type: MessageType::Response(response),
        };

        let _ = self.send(address, message).map_err(|error| {
            debug!(?error, ?address, "Error sending response message");
        });
    }

    /// Send an error to the given address.
    pub fn error(&mut self, address: SocketAddr, transaction_id: u32, error: ErrorSpecific) {
        let message = Message {
            transaction_id,
            version: Some(VERSION.to_vec()),
            message_type: MessageType::Error(error),
        };

        let _ = self.send(address, message).map_err(|error| {
            debug!(?error, ?address, "Error sending error message");
        });
    }

    /// Drain up to `limit` datagrams from each endpoint, dropping undecodable ones.
    pub fn recv(&mut self, limit: usize) -> Vec<(Message, SocketAddr)> {
        let mut messages = Vec::new();

        for endpoint in self.endpoints.iter_mut() {
            for (bytes, from) in Incoming::new(endpoint.transport.as_mut(), limit) {
                match Message::from_bytes(&bytes) {
                    Ok(message) => {
                        trace!(context = "socket_message_receiving", ?message, ?from);
                        messages.push((message, from));
                    }
                    Err(error) => {
                        trace!(
                            context = "socket_error",
                            ?error,
                            ?from,
                            "Dropped undecodable datagram"
                        );
                    }
                }
            }
        }

        messages
    }

    // === Private Methods ===

    /// Increments self.next_tid and returns the previous value.
    fn tid(&mut self) -> u32 {
        let tid = self.next_tid;
        self.next_tid = self.next_tid.wrapping_add(1);
        tid
    }

    fn send(&mut self, address: SocketAddr, message: Message) -> Result<(), TransportError> {
        let family = AddressFamily::of(&address);

        let endpoint = self
            .endpoints
            .iter_mut()
            .find(|endpoint| endpoint.family == family)
            .ok_or(TransportError::NoEndpoint(family))?;

        trace!(context = "socket_message_sending", ?message, ?address);

        let bytes = message
            .to_bytes()
            .map_err(|error| std::io::Error::new(ErrorKind::InvalidData, error))?;

        endpoint.transport.send_to(address, &bytes)
    }
}
