//! Non-blocking UDP socket transport.

use std::{
    io::ErrorKind,
    net::{SocketAddr, ToSocketAddrs, UdpSocket},
};

use tracing::{trace, warn};

use super::{Transport, TransportError};

const MTU: usize = 2048;

#[derive(Debug)]
/// A [Transport] over a non-blocking [UdpSocket].
pub struct UdpTransport {
    socket: UdpSocket,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind a UDP socket and switch it to non-blocking mode.
    pub fn bind<A: ToSocketAddrs>(address: A) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind(address)?;
        socket.set_nonblocking(true)?;

        let local_addr = socket.local_addr()?;

        Ok(Self { socket, local_addr })
    }
}

impl Transport for UdpTransport {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn send_to(&mut self, address: SocketAddr, bytes: &[u8]) -> Result<(), TransportError> {
        match self.socket.send_to(bytes, address) {
            Ok(_) => Ok(()),
            // A full send buffer drops the datagram, as UDP would.
            Err(error) if error.kind() == ErrorKind::WouldBlock => {
                trace!(?address, "Send buffer full, dropping datagram");
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }

    fn recv_from(&mut self) -> Option<(Vec<u8>, SocketAddr)> {
        let mut buf = [0_u8; MTU];

        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((_, from)) if from.port() == 0 => {
                    trace!(context = "socket_validation", ?from, "Datagram from port 0");
                }
                Ok((amt, from)) => return Some((buf[..amt].to_vec(), from)),
                Err(error) => {
                    match error.kind() {
                        ErrorKind::WouldBlock => {}
                        // ICMP port unreachable from an earlier send shows up here on some platforms.
                        ErrorKind::ConnectionReset => continue,
                        _ => warn!("IO error {error}"),
                    }

                    return None;
                }
            }
        }
    }
}
