//! In-process radio medium
//!
//! Every [`MemoryRadio`] created from the same [`MemoryMesh`] shares one
//! broadcast domain. Frames are recorded with the (tokio) time they were
//! sent so tests can check cadence under a paused clock.

use crate::transport::error::{TransportError, TransportResult};
use crate::transport::radio::RadioLink;
use crate::transport::types::{Datagram, MacAddress, SharedKey, DEFAULT_MTU};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::time::Instant;

/// A frame that left a radio
#[derive(Debug, Clone)]
pub struct SentFrame {
    pub source: MacAddress,
    pub dest: MacAddress,
    pub payload: Bytes,
    pub at: Instant,
}

#[derive(Default)]
struct MeshInner {
    inboxes: HashMap<MacAddress, VecDeque<Datagram>>,
    unreachable: HashSet<MacAddress>,
    sent: Vec<SentFrame>,
    closed: bool,
}

/// Shared medium; clones refer to the same mesh
#[derive(Clone, Default)]
pub struct MemoryMesh {
    inner: Arc<Mutex<MeshInner>>,
}

impl MemoryMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a radio with the given address to the mesh
    pub fn radio(&self, address: MacAddress) -> MemoryRadio {
        self.inner.lock().inboxes.entry(address).or_default();

        MemoryRadio {
            address,
            mesh: self.clone(),
            peers: HashMap::new(),
            mtu: DEFAULT_MTU,
        }
    }

    /// Deliver a datagram to `dest` as if `source` had sent it
    pub fn inject(&self, dest: MacAddress, source: MacAddress, payload: impl Into<Bytes>) {
        let mut inner = self.inner.lock();
        inner
            .inboxes
            .entry(dest)
            .or_default()
            .push_back(Datagram::new(source, payload));
    }

    /// Unicast sends towards an unreachable address fail, and it stops
    /// hearing broadcasts
    pub fn set_reachable(&self, address: MacAddress, reachable: bool) {
        let mut inner = self.inner.lock();
        if reachable {
            inner.unreachable.remove(&address);
        } else {
            inner.unreachable.insert(address);
        }
    }

    /// Close the medium; every radio reports [`TransportError::Closed`]
    pub fn shutdown(&self) {
        self.inner.lock().closed = true;
    }

    /// All frames sent so far, in send order
    pub fn sent_frames(&self) -> Vec<SentFrame> {
        self.inner.lock().sent.clone()
    }

    /// Frames sent by one radio
    pub fn sent_from(&self, source: MacAddress) -> Vec<SentFrame> {
        self.inner
            .lock()
            .sent
            .iter()
            .filter(|f| f.source == source)
            .cloned()
            .collect()
    }

    /// Datagrams waiting in the inbox of `address`
    pub fn pending(&self, address: MacAddress) -> usize {
        self.inner
            .lock()
            .inboxes
            .get(&address)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Remove and return everything waiting for `address`
    pub fn drain_inbox(&self, address: MacAddress) -> Vec<Datagram> {
        self.inner
            .lock()
            .inboxes
            .get_mut(&address)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }
}

/// Radio endpoint attached to a [`MemoryMesh`]
pub struct MemoryRadio {
    address: MacAddress,
    mesh: MemoryMesh,
    peers: HashMap<MacAddress, SharedKey>,
    mtu: usize,
}

impl MemoryRadio {
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn mesh(&self) -> &MemoryMesh {
        &self.mesh
    }

    /// Registered peers
    pub fn peers(&self) -> Vec<MacAddress> {
        self.peers.keys().copied().collect()
    }
}

impl RadioLink for MemoryRadio {
    fn local_address(&self) -> MacAddress {
        self.address
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn add_peer(&mut self, peer: MacAddress, key: &SharedKey) -> TransportResult<()> {
        if self.mesh.inner.lock().closed {
            return Err(TransportError::Closed);
        }
        self.peers.insert(peer, *key);
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

        let mut inner = self.mesh.inner.lock();
        if inner.closed {
            return Err(TransportError::Closed);
        }

        let payload = Bytes::copy_from_slice(payload);
        let source = self.address;

        if dest.is_broadcast() {
            let listeners: Vec<MacAddress> = inner
                .inboxes
                .keys()
                .filter(|addr| **addr != source && !inner.unreachable.contains(*addr))
                .copied()
                .collect();

            for addr in listeners {
                if let Some(inbox) = inner.inboxes.get_mut(&addr) {
                    inbox.push_back(Datagram::new(source, payload.clone()));
                }
            }
        } else {
            if inner.unreachable.contains(&dest) {
                return Err(TransportError::SendFailed(format!("no ack from {dest}")));
            }

            match inner.inboxes.get_mut(&dest) {
                Some(inbox) => inbox.push_back(Datagram::new(source, payload.clone())),
                None => return Err(TransportError::SendFailed(format!("no ack from {dest}"))),
            }
        }

        inner.sent.push(SentFrame {
            source,
            dest,
            payload,
            at: Instant::now(),
        });

        Ok(())
    }

    fn try_recv(&mut self) -> TransportResult<Option<Datagram>> {
        let mut inner = self.mesh.inner.lock();
        if inner.closed {
            return Err(TransportError::Closed);
        }

        Ok(inner
            .inboxes
            .get_mut(&self.address)
            .and_then(VecDeque::pop_front))
    }
}
