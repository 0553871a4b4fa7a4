//! Seeded lossy radio for in-process testing
//!
//! Two kinds of loss are simulated. A *rejected* frame is refused by the link
//! layer and the sender sees `SendFailed`, like a missing ack. A *dropped*
//! frame is accepted but never delivered, which the sender cannot notice.

#![allow(dead_code)]

use meshrelay::transport::{
    Datagram, MacAddress, RadioLink, SharedKey, TransportError, TransportResult,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LossyRadioConfig {
    /// Chance (0.0 - 1.0) that a send is refused with an error
    pub reject_rate: f32,
    /// Chance (0.0 - 1.0) that an accepted send silently vanishes
    pub drop_rate: f32,
    /// Apply loss to broadcast frames too
    pub lossy_broadcast: bool,
    pub seed: u64,
}

impl Default for LossyRadioConfig {
    fn default() -> Self {
        Self {
            reject_rate: 0.0,
            drop_rate: 0.0,
            lossy_broadcast: false,
            seed: 42,
        }
    }
}

impl LossyRadioConfig {
    pub fn perfect() -> Self {
        Self::default()
    }

    pub fn with_rejects(reject_rate: f32, seed: u64) -> Self {
        Self {
            reject_rate,
            seed,
            ..Default::default()
        }
    }

    pub fn with_drops(drop_rate: f32, seed: u64) -> Self {
        Self {
            drop_rate,
            seed,
            ..Default::default()
        }
    }
}

/// Counters shared with the test body
#[derive(Debug, Default)]
pub struct RadioStats {
    pub frames_sent: AtomicU64,
    pub frames_rejected: AtomicU64,
    pub frames_dropped: AtomicU64,
}

impl RadioStats {
    pub fn loss_rate(&self) -> f32 {
        let sent = self.frames_sent.load(Ordering::Relaxed);
        let lost = self.frames_rejected.load(Ordering::Relaxed)
            + self.frames_dropped.load(Ordering::Relaxed);
        if sent > 0 {
            lost as f32 / sent as f32
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Sent: {}, Rejected: {}, Dropped: {} ({:.1}% lost)",
            self.frames_sent.load(Ordering::Relaxed),
            self.frames_rejected.load(Ordering::Relaxed),
            self.frames_dropped.load(Ordering::Relaxed),
            self.loss_rate() * 100.0
        )
    }
}

pub struct LossyRadio<R> {
    inner: R,
    config: LossyRadioConfig,
    rng: StdRng,
    stats: Arc<RadioStats>,
}

impl<R: RadioLink> LossyRadio<R> {
    pub fn new(inner: R, config: LossyRadioConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            inner,
            config,
            stats: Arc::new(RadioStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<RadioStats> {
        self.stats.clone()
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: RadioLink> RadioLink for LossyRadio<R> {
    fn local_address(&self) -> MacAddress {
        self.inner.local_address()
    }

    fn mtu(&self) -> usize {
        self.inner.mtu()
    }

    fn add_peer(&mut self, peer: MacAddress, key: &SharedKey) -> TransportResult<()> {
        self.inner.add_peer(peer, key)
    }

    fn has_peer(&self, peer: &MacAddress) -> bool {
        self.inner.has_peer(peer)
    }

    fn send(&mut self, dest: MacAddress, payload: &[u8]) -> TransportResult<()> {
        self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);

        if dest.is_broadcast() && !self.config.lossy_broadcast {
            return self.inner.send(dest, payload);
        }

        if self.rng.gen::<f32>() < self.config.reject_rate {
            self.stats.frames_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::SendFailed(format!("no ack from {dest}")));
        }

        if self.rng.gen::<f32>() < self.config.drop_rate {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        self.inner.send(dest, payload)
    }

    fn try_recv(&mut self) -> TransportResult<Option<Datagram>> {
        self.inner.try_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshrelay::transport::MemoryMesh;

    const KEY: SharedKey = *b"0123456789abcdef";

    fn pair() -> (MemoryMesh, MacAddress, MacAddress) {
        (
            MemoryMesh::new(),
            MacAddress::new([2, 0, 0, 0, 0, 1]),
            MacAddress::new([2, 0, 0, 0, 0, 2]),
        )
    }

    #[test]
    fn test_perfect_radio_passes_everything() {
        let (mesh, a, b) = pair();
        let _rx = mesh.radio(b);
        let mut radio = LossyRadio::new(mesh.radio(a), LossyRadioConfig::perfect());
        radio.add_peer(b, &KEY).unwrap();

        for _ in 0..50 {
            radio.send(b, b"x").unwrap();
        }
        assert_eq!(mesh.pending(b), 50);
        assert_eq!(radio.stats().loss_rate(), 0.0);
    }

    #[test]
    fn test_total_reject() {
        let (mesh, a, b) = pair();
        let _rx = mesh.radio(b);
        let mut radio = LossyRadio::new(mesh.radio(a), LossyRadioConfig::with_rejects(1.0, 1));
        radio.add_peer(b, &KEY).unwrap();

        assert!(matches!(
            radio.send(b, b"x"),
            Err(TransportError::SendFailed(_))
        ));
        assert_eq!(mesh.pending(b), 0);
    }

    #[test]
    fn test_drops_are_silent() {
        let (mesh, a, b) = pair();
        let _rx = mesh.radio(b);
        let mut radio = LossyRadio::new(mesh.radio(a), LossyRadioConfig::with_drops(0.5, 7));
        radio.add_peer(b, &KEY).unwrap();

        for _ in 0..1000 {
            radio.send(b, b"x").unwrap();
        }
        let delivered = mesh.pending(b) as f64 / 1000.0;
        assert!(delivered > 0.4 && delivered < 0.6);
    }
}
