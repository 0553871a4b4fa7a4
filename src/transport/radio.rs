//! Capability traits for the radio link and the uplink network link

use crate::transport::error::TransportResult;
use crate::transport::types::{Datagram, MacAddress, SharedKey, DEFAULT_MTU};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Connectionless, addressed datagram link
///
/// Implementors deliver fixed-size datagrams between 6-byte addresses.
/// Unicast sends only succeed towards peers previously registered with
/// [`RadioLink::add_peer`]; broadcast sends need no registration.
pub trait RadioLink {
    /// Own link-layer address
    fn local_address(&self) -> MacAddress;

    /// Largest payload accepted by [`RadioLink::send`]
    fn mtu(&self) -> usize {
        DEFAULT_MTU
    }

    /// Register a unicast peer with the shared key
    fn add_peer(&mut self, peer: MacAddress, key: &SharedKey) -> TransportResult<()>;

    /// Whether `peer` is already registered
    fn has_peer(&self, peer: &MacAddress) -> bool;

    /// Send one datagram. `Ok` means the link accepted it, nothing more.
    fn send(&mut self, dest: MacAddress, payload: &[u8]) -> TransportResult<()>;

    /// Non-blocking receive of at most one datagram
    fn try_recv(&mut self) -> TransportResult<Option<Datagram>>;
}

/// Health of the station-mode uplink
pub trait LinkMonitor {
    fn is_connected(&self) -> bool;
}

/// Link state set from the outside; clones share the same flag
#[derive(Debug, Clone)]
pub struct StaticLink {
    connected: Arc<AtomicBool>,
}

impl StaticLink {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(connected)),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl LinkMonitor for StaticLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Host uplink: connected while a route to the broker host exists
///
/// Uses an unbound UDP "connect", which only consults the routing table
/// and sends nothing on the wire. The host name is resolved on the first
/// successful lookup and cached (shared between clones), so the per-tick
/// check never waits on DNS once resolved.
#[derive(Debug, Clone)]
pub struct HostLink {
    target: String,
    resolved: Arc<OnceLock<Vec<SocketAddr>>>,
}

impl HostLink {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            target: format!("{}:{}", host.into(), port),
            resolved: Arc::new(OnceLock::new()),
        }
    }

    /// Whether the broker host name has been resolved
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    fn addresses(&self) -> Option<&[SocketAddr]> {
        if let Some(addrs) = self.resolved.get() {
            return Some(addrs);
        }

        match self.target.to_socket_addrs() {
            Ok(addrs) => {
                let addrs: Vec<SocketAddr> = addrs.collect();
                if addrs.is_empty() {
                    return None;
                }
                Some(self.resolved.get_or_init(|| addrs))
            }
            Err(e) => {
                tracing::debug!(target: "meshrelay::link", "Cannot resolve {}: {}", self.target, e);
                None
            }
        }
    }

    fn route_exists(addr: &SocketAddr) -> bool {
        let bind: SocketAddr = if addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        UdpSocket::bind(bind)
            .and_then(|socket| socket.connect(addr))
            .is_ok()
    }
}

impl LinkMonitor for HostLink {
    fn is_connected(&self) -> bool {
        self.addresses()
            .is_some_and(|addrs| addrs.iter().any(Self::route_exists))
    }
}
