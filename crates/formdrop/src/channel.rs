//! Datagram ingest channel between the HTTP front end and the collector.
//!
//! Delivery is at-most-once and unordered: the sender opens a fresh UDP
//! socket per submission, sends one datagram and drops the socket. There is
//! no acknowledgement and no retry. The receiver holds one socket for its
//! whole lifetime and reads one datagram at a time into a fixed-size buffer;
//! anything past `max_datagram_size` bytes is cut off.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::trace;

use crate::error::{Error, Result};

/// Sending side of the ingest channel.
#[derive(Debug, Clone, Copy)]
pub struct IngestSender {
    target: SocketAddr,
}

impl IngestSender {
    /// Create a sender that delivers to `target`.
    #[must_use]
    pub fn new(target: SocketAddr) -> Self {
        Self { target }
    }

    /// The address datagrams are sent to.
    #[must_use]
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send `payload` as one datagram from a fresh ephemeral socket.
    ///
    /// Returns the number of bytes sent. Success only means the datagram left
    /// this socket; nothing confirms that a receiver got it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelSend`] if the socket cannot be created or the
    /// send is rejected (for example a payload larger than the UDP limit).
    pub async fn send(&self, payload: &[u8]) -> Result<usize> {
        let local = SocketAddr::new(unspecified_for(self.target.ip()), 0);
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| self.send_error(source))?;

        let sent = socket
            .send_to(payload, self.target)
            .await
            .map_err(|source| self.send_error(source))?;

        trace!("Sent {sent} byte datagram to {}", self.target);
        Ok(sent)
    }

    fn send_error(&self, source: std::io::Error) -> Error {
        Error::ChannelSend {
            target: self.target,
            source,
        }
    }
}

/// One received datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Payload bytes, at most `max_datagram_size` long.
    pub payload: Vec<u8>,
    /// Address the datagram came from.
    pub peer: SocketAddr,
    /// Whether the datagram was longer than the receive buffer.
    pub truncated: bool,
}

/// Receiving side of the ingest channel.
#[derive(Debug)]
pub struct IngestReceiver {
    socket: UdpSocket,
    max_datagram_size: usize,
    // One spare byte lets truncation be detected.
    buf: Vec<u8>,
}

impl IngestReceiver {
    /// Bind the receiving socket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelBind`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, max_datagram_size: usize) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| Error::ChannelBind { addr, source })?;

        Ok(Self {
            socket,
            max_datagram_size,
            buf: vec![0; max_datagram_size + 1],
        })
    }

    /// The address the socket is actually bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be queried.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive buffer size in bytes.
    #[must_use]
    pub fn max_datagram_size(&self) -> usize {
        self.max_datagram_size
    }

    /// Wait for the next datagram. Blocks indefinitely.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket read fails.
    pub async fn recv(&mut self) -> Result<Datagram> {
        let (len, peer) = self.socket.recv_from(&mut self.buf).await?;
        let truncated = len > self.max_datagram_size;
        let len = len.min(self.max_datagram_size);

        Ok(Datagram {
            payload: self.buf[..len].to_vec(),
            peer,
            truncated,
        })
    }
}

/// Check whether something already holds the ingest address.
///
/// Used to report whether a collector is running; the probe socket is
/// released immediately.
#[must_use]
pub fn is_in_use(addr: SocketAddr) -> bool {
    matches!(
        std::net::UdpSocket::bind(addr),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse
    )
}

fn unspecified_for(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}
