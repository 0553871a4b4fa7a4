//! Node control loop
//!
//! Samples the sensor into the durable queue and drains the queue, oldest
//! first, towards the discovered gateway. Delivery is best-effort: a send
//! the radio accepts counts as delivered.

use crate::discovery::Discovery;
use crate::engine::error::RelayResult;
use crate::engine::types::{DiscoveryOutcome, EngineTimings, FailureCounter, KpiCounters, NodeStep};
use crate::fragment::encode;
use crate::metrics::recorder::{
    record_entry_discarded, record_gateway_lost, record_reading, record_send_failure, record_sent,
    set_queue_depth,
};
use crate::protocol::heartbeat;
use crate::queue::{DurableQueue, QueueStore};
use crate::sensor::{payload_for, SensorSource};
use crate::transport::{MacAddress, RadioLink, SharedKey, TransportError, TransportResult};
use bytes::Bytes;
use tokio::time::Instant;

pub struct NodeEngine<R, S, Q: QueueStore> {
    radio: R,
    sensor: S,
    queue: DurableQueue<Q>,
    key: SharedKey,
    timings: EngineTimings,
    discovery: Discovery,
    gateway: Option<MacAddress>,
    failures: FailureCounter,
    kpi: KpiCounters,
    last_read: Instant,
    last_heartbeat: Instant,
}

impl<R, S, Q> NodeEngine<R, S, Q>
where
    R: RadioLink,
    S: SensorSource,
    Q: QueueStore,
{
    pub fn new(
        radio: R,
        sensor: S,
        queue: DurableQueue<Q>,
        key: SharedKey,
        timings: EngineTimings,
    ) -> Self {
        let now = Instant::now();
        set_queue_depth(queue.len());

        Self {
            radio,
            sensor,
            queue,
            key,
            discovery: Discovery::new(timings.discovery_timeout, timings.discovery_poll),
            failures: FailureCounter::new(timings.max_failures),
            timings,
            gateway: None,
            kpi: KpiCounters::new(now),
            last_read: now,
            last_heartbeat: now,
        }
    }

    /// Loop until the radio is closed
    pub async fn run(&mut self) -> RelayResult<()> {
        tracing::info!(
            target: "meshrelay::node",
            "Node {} running with {} queued",
            self.radio.local_address(),
            self.queue.len()
        );

        loop {
            let step = self.step().await?;
            // A failed discovery already slept the backoff
            if step.discovery != DiscoveryOutcome::NotFound {
                tokio::time::sleep(self.timings.node_tick).await;
            }
        }
    }

    /// One loop iteration, without the trailing tick sleep
    pub async fn step(&mut self) -> RelayResult<NodeStep> {
        let reading_queued = self.sample();

        let (gateway, outcome) = match self.gateway {
            Some(gateway) => (gateway, DiscoveryOutcome::Cached),
            None => match self.discovery.probe(&mut self.radio, &self.key).await? {
                Some(gateway) => {
                    self.gateway = Some(gateway);
                    self.failures.reset();
                    (gateway, DiscoveryOutcome::Found(gateway))
                }
                None => {
                    tracing::info!(target: "meshrelay::node", "No gateway, retrying");
                    tokio::time::sleep(self.timings.discovery_backoff).await;
                    let mut step = NodeStep::new(DiscoveryOutcome::NotFound);
                    step.reading_queued = reading_queued;
                    return Ok(step);
                }
            },
        };

        let mut step = NodeStep::new(outcome);
        step.reading_queued = reading_queued;

        let fatal = self.drain(gateway, &mut step).await?;

        if let Err(e) = self.queue.persist() {
            tracing::warn!(target: "meshrelay::node", "Queue save failed: {}", e);
        }
        set_queue_depth(self.queue.len());

        if let Some(e) = fatal {
            return Err(e.into());
        }

        step.heartbeat_sent = self.maybe_heartbeat()?;
        Ok(step)
    }

    /// Take a reading if the interval elapsed; `Some(accepted)` if one was taken
    fn sample(&mut self) -> Option<bool> {
        let now = Instant::now();
        if now.saturating_duration_since(self.last_read) < self.timings.sensor_interval {
            return None;
        }
        self.last_read = now;

        let payload = payload_for(self.sensor.read().as_ref());
        let accepted = match self.queue.push(payload) {
            Ok(()) => {
                self.kpi.readings += 1;
                if let Err(e) = self.queue.persist() {
                    tracing::warn!(target: "meshrelay::node", "Queue save failed: {}", e);
                }
                true
            }
            Err(e) => {
                tracing::warn!(target: "meshrelay::node", "Dropping reading: {}", e);
                false
            }
        };

        record_reading(accepted);
        set_queue_depth(self.queue.len());
        Some(accepted)
    }

    /// Send queued entries in order until one fails; delivered entries and
    /// entries that can never fit a frame are removed. A closed radio is
    /// handed back so the caller can persist first.
    async fn drain(
        &mut self,
        gateway: MacAddress,
        step: &mut NodeStep,
    ) -> RelayResult<Option<TransportError>> {
        let mut consumed = 0;
        let mut fatal = None;

        while let Some(entry) = self.queue.get(consumed).cloned() {
            let chunks = encode(&entry, self.timings.fragment_size)?;

            match self.send_chunks(gateway, &chunks).await {
                Ok(()) => {
                    tracing::debug!(
                        target: "meshrelay::node",
                        "Sent {} bytes in {} chunk(s)",
                        entry.len(),
                        chunks.len()
                    );
                    consumed += 1;
                    self.failures.record_success();
                    self.kpi.sent += 1;
                    record_sent(chunks.len());
                }
                Err(TransportError::PayloadTooLarge { size, mtu }) => {
                    // Permanent: not retried, not counted against the gateway
                    tracing::warn!(
                        target: "meshrelay::node",
                        "Discarding {} byte entry: {} byte frame exceeds MTU of {}",
                        entry.len(),
                        size,
                        mtu
                    );
                    consumed += 1;
                    step.discarded += 1;
                    record_entry_discarded();
                }
                Err(e) => {
                    tracing::warn!(target: "meshrelay::node", "Send to {} failed: {}", gateway, e);
                    self.kpi.failures += 1;
                    record_send_failure();
                    step.send_failed = true;

                    if self.failures.record_failure() {
                        tracing::warn!(
                            target: "meshrelay::node",
                            "Lost gateway {} after {} failures, rediscovering",
                            gateway,
                            self.failures.count()
                        );
                        self.forget_gateway();
                        step.gateway_dropped = true;
                    }

                    if e.is_fatal() {
                        fatal = Some(e);
                    }
                    break;
                }
            }
        }

        self.queue.pop_front_prefix(consumed);
        step.sent = consumed - step.discarded;
        Ok(fatal)
    }

    async fn send_chunks(&mut self, gateway: MacAddress, chunks: &[Bytes]) -> TransportResult<()> {
        for (i, chunk) in chunks.iter().enumerate() {
            self.radio.send(gateway, chunk)?;
            if i + 1 < chunks.len() {
                tokio::time::sleep(self.timings.fragment_delay).await;
            }
        }
        Ok(())
    }

    fn maybe_heartbeat(&mut self) -> RelayResult<bool> {
        let now = Instant::now();
        if now.saturating_duration_since(self.last_heartbeat) < self.timings.heartbeat_interval {
            return Ok(false);
        }
        self.last_heartbeat = now;

        let body = self.kpi.snapshot(now).encode();
        let Some(gateway) = self.gateway else {
            tracing::info!(target: "meshrelay::node", "No gateway for heartbeat: {}", body);
            return Ok(false);
        };

        match self.radio.send(gateway, &heartbeat(&body)) {
            Ok(()) => {
                tracing::info!(target: "meshrelay::node", "Heartbeat: {}", body);
                Ok(true)
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                tracing::warn!(target: "meshrelay::node", "Heartbeat send failed: {}", e);
                Ok(false)
            }
        }
    }

    fn forget_gateway(&mut self) {
        self.gateway = None;
        self.discovery.reset();
        self.failures.reset();
        record_gateway_lost();
    }

    pub fn gateway(&self) -> Option<MacAddress> {
        self.gateway
    }

    pub fn queue(&self) -> &DurableQueue<Q> {
        &self.queue
    }

    pub fn kpi(&self) -> &KpiCounters {
        &self.kpi
    }

    pub fn failures(&self) -> FailureCounter {
        self.failures
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::RelayError;
    use crate::protocol::discovery_response;
    use crate::queue::MemoryQueueStore;
    use crate::sensor::{FixedSensor, Reading};
    use crate::transport::{MemoryMesh, MemoryRadio};
    use std::time::Duration;

    const KEY: SharedKey = *b"0123456789abcdef";

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0x02, 0, 0, 0, 0, last])
    }

    const NODE: u8 = 1;
    const GATEWAY: u8 = 9;

    type TestNode = NodeEngine<MemoryRadio, FixedSensor, MemoryQueueStore>;

    fn node(mesh: &MemoryMesh, store: MemoryQueueStore, timings: EngineTimings) -> TestNode {
        let queue = DurableQueue::load(store, timings.queue_capacity);
        NodeEngine::new(
            mesh.radio(mac(NODE)),
            FixedSensor::new(Some(Reading::Light { raw: 512 })),
            queue,
            KEY,
            timings,
        )
    }

    fn entries(n: usize) -> Vec<Bytes> {
        (0..n).map(|i| Bytes::from(format!("LDR={i}"))).collect()
    }

    fn announce_gateway(mesh: &MemoryMesh) {
        mesh.inject(mac(NODE), mac(GATEWAY), discovery_response(mac(GATEWAY)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovers_then_drains_in_order() {
        let mesh = MemoryMesh::new();
        let _gateway = mesh.radio(mac(GATEWAY));
        let store = MemoryQueueStore::with_entries(entries(3));
        let mut node = node(&mesh, store.clone(), EngineTimings::default());

        announce_gateway(&mesh);
        let step = node.step().await.unwrap();

        assert_eq!(step.discovery, DiscoveryOutcome::Found(mac(GATEWAY)));
        assert_eq!(step.sent, 3);
        assert!(!step.send_failed);
        assert!(node.queue().is_empty());
        assert!(store.saved().is_empty());
        assert_eq!(node.kpi().sent, 3);

        let delivered: Vec<Bytes> = mesh
            .drain_inbox(mac(GATEWAY))
            .into_iter()
            .filter(|d| d.source == mac(NODE))
            .map(|d| d.payload)
            .collect();
        assert_eq!(delivered[1..], entries(3)[..]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_gateway_backs_off_without_draining() {
        let mesh = MemoryMesh::new();
        let store = MemoryQueueStore::with_entries(entries(2));
        let mut node = node(&mesh, store.clone(), EngineTimings::default());

        let start = Instant::now();
        let step = node.step().await.unwrap();

        assert_eq!(step.discovery, DiscoveryOutcome::NotFound);
        assert_eq!(start.elapsed(), Duration::from_millis(8000));
        assert_eq!(node.queue().len(), 2);
        assert_eq!(store.saved(), entries(2));
        assert_eq!(node.gateway(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fragments_large_entry() {
        let mesh = MemoryMesh::new();
        let _gateway = mesh.radio(mac(GATEWAY));
        let big = Bytes::from(vec![b'z'; 500]);
        let mut node = node(
            &mesh,
            MemoryQueueStore::with_entries(vec![big]),
            EngineTimings::default(),
        );

        announce_gateway(&mesh);
        node.step().await.unwrap();

        let frames: Vec<_> = mesh
            .sent_from(mac(NODE))
            .into_iter()
            .filter(|f| f.dest == mac(GATEWAY))
            .collect();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].payload.starts_with(b"PART[1/3]|"));
        assert!(frames[1].payload.starts_with(b"PART[2/3]|"));
        assert!(frames[2].payload.starts_with(b"PART[3/3]|"));
        assert_eq!(frames[0].payload.len(), 250);
        assert_eq!(frames[2].payload.len(), 10 + 20);
        assert_eq!(frames[1].at - frames[0].at, Duration::from_millis(50));
        assert_eq!(frames[2].at - frames[1].at, Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_failures_drop_gateway() {
        let mesh = MemoryMesh::new();
        let _gateway = mesh.radio(mac(GATEWAY));
        let store = MemoryQueueStore::with_entries(entries(4));
        let mut node = node(&mesh, store, EngineTimings::default());

        announce_gateway(&mesh);
        mesh.set_reachable(mac(GATEWAY), false);

        for expected in 1..=2 {
            let step = node.step().await.unwrap();
            assert!(step.send_failed);
            assert!(!step.gateway_dropped);
            assert_eq!(node.failures().count(), expected);
            assert_eq!(node.gateway(), Some(mac(GATEWAY)));
        }

        let step = node.step().await.unwrap();
        assert!(step.gateway_dropped);
        assert_eq!(node.gateway(), None);
        assert_eq!(node.queue().len(), 4);
        assert_eq!(node.kpi().failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_entry_discarded_without_blocking_queue() {
        let mesh = MemoryMesh::new();
        let _gateway = mesh.radio(mac(GATEWAY));
        // Ten fragments: `PART[i/10]|` plus a 240-byte body overflows the MTU
        let oversized = Bytes::from(vec![b'a'; 2200]);
        let store = MemoryQueueStore::with_entries(vec![oversized, Bytes::from_static(b"LDR=1")]);
        let mut node = node(&mesh, store.clone(), EngineTimings::default());

        announce_gateway(&mesh);
        let step = node.step().await.unwrap();

        assert_eq!(step.discarded, 1);
        assert_eq!(step.sent, 1);
        assert!(!step.send_failed);
        assert!(!step.gateway_dropped);
        assert_eq!(node.failures().count(), 0);
        assert_eq!(node.gateway(), Some(mac(GATEWAY)));
        assert!(node.queue().is_empty());
        assert!(store.saved().is_empty());

        let delivered: Vec<Bytes> = mesh
            .sent_from(mac(NODE))
            .into_iter()
            .filter(|f| f.dest == mac(GATEWAY))
            .map(|f| f.payload)
            .collect();
        assert_eq!(delivered, vec![Bytes::from_static(b"LDR=1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_failure_streak() {
        let mesh = MemoryMesh::new();
        let _gateway = mesh.radio(mac(GATEWAY));
        let timings = EngineTimings {
            sensor_interval: Duration::from_secs(1),
            ..EngineTimings::default()
        };
        let mut node = node(&mesh, MemoryQueueStore::with_entries(entries(1)), timings);

        announce_gateway(&mesh);
        mesh.set_reachable(mac(GATEWAY), false);
        node.step().await.unwrap();
        node.step().await.unwrap();
        assert_eq!(node.failures().count(), 2);

        mesh.set_reachable(mac(GATEWAY), true);
        let step = node.step().await.unwrap();
        assert_eq!(step.sent, 1);
        assert_eq!(node.failures().count(), 0);

        mesh.set_reachable(mac(GATEWAY), false);
        tokio::time::advance(Duration::from_secs(1)).await;
        let step = node.step().await.unwrap();
        assert_eq!(step.reading_queued, Some(true));
        assert!(step.send_failed);
        assert!(!step.gateway_dropped);
        assert_eq!(node.failures().count(), 1);
        assert_eq!(node.gateway(), Some(mac(GATEWAY)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_full_drops_reading() {
        let mesh = MemoryMesh::new();
        let timings = EngineTimings {
            sensor_interval: Duration::from_secs(1),
            queue_capacity: 2,
            ..EngineTimings::default()
        };
        let mut node = node(&mesh, MemoryQueueStore::with_entries(entries(2)), timings);

        tokio::time::advance(Duration::from_secs(1)).await;
        let step = node.step().await.unwrap();

        assert_eq!(step.reading_queued, Some(false));
        assert_eq!(node.kpi().readings, 0);
        assert_eq!(node.queue().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_to_gateway() {
        let mesh = MemoryMesh::new();
        let _gateway = mesh.radio(mac(GATEWAY));
        let mut node = node(&mesh, MemoryQueueStore::new(), EngineTimings::default());

        announce_gateway(&mesh);
        node.step().await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        let step = node.step().await.unwrap();
        assert!(step.heartbeat_sent);
        assert_eq!(step.reading_queued, Some(true));
        assert_eq!(step.sent, 1);

        let last = mesh.sent_from(mac(NODE)).pop().unwrap();
        assert_eq!(last.dest, mac(GATEWAY));
        assert_eq!(
            last.payload.as_ref(),
            b"KPI|readings=1;sent=1;failures=0;uptime=60"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_radio_ends_loop() {
        let mesh = MemoryMesh::new();
        let mut node = node(&mesh, MemoryQueueStore::new(), EngineTimings::default());
        mesh.shutdown();

        let result = node.run().await;
        assert!(matches!(
            result,
            Err(RelayError::Transport(TransportError::Closed))
        ));
    }
}
