//! Radio link emulated over UDP broadcast
//!
//! Lets several devices (one per process, possibly on one host) share a
//! broadcast domain on a LAN. Each UDP datagram carries one link frame:
//!
//! ```text
//! +----------+----------+------------------+
//! | dst (6B) | src (6B) | payload (<= MTU) |
//! +----------+----------+------------------+
//! ```
//!
//! All frames go to the broadcast target; receivers keep frames addressed
//! to them or to the broadcast address and drop their own echoes.

use crate::transport::error::{TransportError, TransportResult};
use crate::transport::radio::RadioLink;
use crate::transport::types::{Datagram, MacAddress, SharedKey, DEFAULT_MTU};
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

const FRAME_HEADER_LEN: usize = 2 * MacAddress::LEN;

pub struct UdpRadio {
    socket: UdpSocket,
    address: MacAddress,
    broadcast_target: SocketAddr,
    peers: HashMap<MacAddress, SharedKey>,
    mtu: usize,
    recv_buf: Vec<u8>,
}

impl UdpRadio {
    /// Bind the shared port with `SO_REUSEADDR` and broadcast enabled
    pub fn bind(address: MacAddress, port: u16) -> TransportResult<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port)).into())?;

        Ok(Self {
            socket: socket.into(),
            address,
            broadcast_target: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, port)),
            peers: HashMap::new(),
            mtu: DEFAULT_MTU,
            recv_buf: vec![0u8; FRAME_HEADER_LEN + DEFAULT_MTU],
        })
    }
}

/// Build one link frame
pub fn encode_frame(dest: MacAddress, source: MacAddress, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(dest.as_bytes());
    frame.extend_from_slice(source.as_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Split a link frame into (dest, source, payload)
pub fn decode_frame(frame: &[u8]) -> Option<(MacAddress, MacAddress, &[u8])> {
    if frame.len() < FRAME_HEADER_LEN {
        return None;
    }

    let dest = MacAddress::from_slice(&frame[..MacAddress::LEN])?;
    let source = MacAddress::from_slice(&frame[MacAddress::LEN..FRAME_HEADER_LEN])?;
    Some((dest, source, &frame[FRAME_HEADER_LEN..]))
}

impl RadioLink for UdpRadio {
    fn local_address(&self) -> MacAddress {
        self.address
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn add_peer(&mut self, peer: MacAddress, key: &SharedKey) -> TransportResult<()> {
        self.peers.insert(peer, *key);
        tracing::debug!(target: "meshrelay::transport", "Registered peer {}", peer);
        Ok(())
    }

    fn has_peer(&self, peer: &MacAddress) -> bool {
        self.peers.contains_key(peer)
    }

    fn send(&mut self, dest: MacAddress, payload: &[u8]) -> TransportResult<()> {
        if payload.len() > self.mtu {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                mtu: self.mtu,
            });
        }

        if !dest.is_broadcast() && !self.peers.contains_key(&dest) {
            return Err(TransportError::PeerNotRegistered(dest));
        }

        let frame = encode_frame(dest, self.address, payload);
        match self.socket.send_to(&frame, self.broadcast_target) {
            Ok(n) if n == frame.len() => Ok(()),
            Ok(n) => Err(TransportError::SendFailed(format!(
                "short write: {n}/{} bytes",
                frame.len()
            ))),
            Err(e) => Err(TransportError::SendFailed(e.to_string())),
        }
    }

    fn try_recv(&mut self) -> TransportResult<Option<Datagram>> {
        loop {
            let len = match self.socket.recv_from(&mut self.recv_buf) {
                Ok((len, _)) => len,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(TransportError::ReceiveFailed(e.to_string())),
            };

            let Some((dest, source, payload)) = decode_frame(&self.recv_buf[..len]) else {
                continue;
            };

            if source == self.address || (dest != self.address && !dest.is_broadcast()) {
                continue;
            }

            return Ok(Some(Datagram::new(source, Bytes::copy_from_slice(payload))));
        }
    }
}
