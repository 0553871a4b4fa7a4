//! Gateway control loop
//!
//! Bridges radio traffic to the broker. Each tick handles at most one
//! datagram, so a burst from many nodes is drained at the tick rate.

use crate::broker::Broker;
use crate::engine::error::{RelayError, RelayResult};
use crate::engine::types::{EngineTimings, GatewayStats};
use crate::fragment::{parse_header, ReassemblyTracker};
use crate::metrics::recorder::{
    record_fragment_dropped, record_publish_failure, record_published, record_reassembled,
};
use crate::protocol::{data_topic, discovery_response, kpi_topic, GatewayHeartbeat, WireMessage};
use crate::sensor::{payload_for, SensorSource};
use crate::transport::{Datagram, LinkMonitor, MacAddress, RadioLink, SharedKey, TransportError};
use bytes::Bytes;
use tokio::time::Instant;

const KIND_DATA: &str = "data";
const KIND_KPI: &str = "kpi";

pub struct GatewayEngine<R, B, S, L> {
    radio: R,
    broker: B,
    sensor: S,
    link: L,
    key: SharedKey,
    address: MacAddress,
    timings: EngineTimings,
    tracker: ReassemblyTracker,
    stats: GatewayStats,
    started_at: Instant,
    last_heartbeat: Instant,
    last_sensor: Instant,
}

impl<R, B, S, L> GatewayEngine<R, B, S, L>
where
    R: RadioLink,
    B: Broker,
    S: SensorSource,
    L: LinkMonitor,
{
    pub fn new(radio: R, broker: B, sensor: S, link: L, key: SharedKey, timings: EngineTimings) -> Self {
        let now = Instant::now();
        let address = radio.local_address();

        Self {
            radio,
            broker,
            sensor,
            link,
            key,
            address,
            timings,
            tracker: ReassemblyTracker::new(),
            stats: GatewayStats::default(),
            started_at: now,
            last_heartbeat: now,
            last_sensor: now,
        }
    }

    /// Connect to the broker and loop until the uplink or radio fails
    pub async fn run(&mut self) -> RelayResult<()> {
        self.broker.connect()?;
        tracing::info!(target: "meshrelay::gateway", "Gateway {} running", self.address);

        loop {
            self.tick()?;
            tokio::time::sleep(self.timings.gateway_tick).await;
        }
    }

    /// One loop iteration, without the trailing sleep
    pub fn tick(&mut self) -> RelayResult<()> {
        if !self.link.is_connected() {
            tracing::error!(target: "meshrelay::gateway", "Uplink lost");
            return Err(RelayError::LinkLost);
        }

        let datagram = match self.radio.try_recv() {
            Ok(datagram) => datagram,
            Err(TransportError::Closed) => return Err(TransportError::Closed.into()),
            Err(e) => {
                tracing::warn!(target: "meshrelay::gateway", "Receive failed: {}", e);
                None
            }
        };

        let now = Instant::now();
        if now.saturating_duration_since(self.last_heartbeat) >= self.timings.heartbeat_interval {
            self.publish_heartbeat(now);
            self.last_heartbeat = now;
        }

        if let Some(datagram) = datagram {
            self.handle(datagram, now)?;
        }

        let expired = self
            .tracker
            .evict_expired(Instant::now(), self.timings.reassembly_timeout);
        for sender in &expired {
            tracing::warn!(target: "meshrelay::gateway", "Dropping incomplete message from {}", sender);
        }
        if !expired.is_empty() {
            self.stats.dropped += expired.len() as u64;
            record_fragment_dropped("expired", expired.len());
        }

        let now = Instant::now();
        if now.saturating_duration_since(self.last_sensor) >= self.timings.sensor_interval {
            let payload = payload_for(self.sensor.read().as_ref());
            let topic = data_topic(&self.address);
            self.publish(&topic, &payload, KIND_DATA);
            self.last_sensor = now;
        }

        Ok(())
    }

    fn handle(&mut self, datagram: Datagram, now: Instant) -> RelayResult<()> {
        let source = datagram.source;
        let payload = datagram.payload;

        match WireMessage::classify(payload.clone()) {
            WireMessage::DiscoveryRequest => self.answer_discovery(source)?,
            WireMessage::Fragment(raw) => self.handle_fragment(source, &raw, now),
            WireMessage::Heartbeat(body) => {
                if self.publish(&kpi_topic(&source), &body, KIND_KPI) {
                    self.stats.forwarded += 1;
                }
            }
            WireMessage::DiscoveryResponse(_) | WireMessage::Data(_) => {
                if self.publish(&data_topic(&source), &payload, KIND_DATA) {
                    self.stats.forwarded += 1;
                }
            }
        }

        Ok(())
    }

    fn answer_discovery(&mut self, requester: MacAddress) -> RelayResult<()> {
        tracing::info!(target: "meshrelay::gateway", "Responding to discovery from {}", requester);

        if !self.radio.has_peer(&requester) {
            if let Err(e) = self.radio.add_peer(requester, &self.key) {
                if e.is_fatal() {
                    return Err(e.into());
                }
                tracing::warn!(target: "meshrelay::gateway", "Cannot add peer {}: {}", requester, e);
                return Ok(());
            }
        }

        match self.radio.send(requester, &discovery_response(self.address)) {
            Ok(()) => {
                self.stats.discovery_replies += 1;
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                tracing::warn!(target: "meshrelay::gateway", "Reply to {} failed: {}", requester, e);
                Ok(())
            }
        }
    }

    fn handle_fragment(&mut self, source: MacAddress, raw: &Bytes, now: Instant) {
        let parsed = match parse_header(raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(target: "meshrelay::gateway", "Malformed fragment from {}: {}", source, e);
                self.stats.dropped += 1;
                record_fragment_dropped("malformed", 1);
                return;
            }
        };

        let header = parsed.header;
        if let Err(e) = self
            .tracker
            .on_fragment(source, header.index, header.total, parsed.body, now)
        {
            tracing::warn!(target: "meshrelay::gateway", "Rejected fragment from {}: {}", source, e);
            self.stats.dropped += 1;
            record_fragment_dropped("malformed", 1);
            return;
        }

        tracing::debug!(
            target: "meshrelay::gateway",
            "Received part {}/{} from {}",
            header.index,
            header.total,
            source
        );

        let started_at = self.tracker.get(&source).map(|entry| entry.started_at());
        if let Some(message) = self.tracker.try_complete(&source) {
            self.stats.reassembled += 1;
            if let Some(started_at) = started_at {
                record_reassembled(now.saturating_duration_since(started_at));
            }
            if self.publish(&data_topic(&source), &message, KIND_DATA) {
                self.stats.forwarded += 1;
            }
        }
    }

    fn publish_heartbeat(&mut self, now: Instant) {
        let body = GatewayHeartbeat {
            device_id: self.address.node_id(),
            uptime_secs: now.saturating_duration_since(self.started_at).as_secs(),
            forwarded: self.stats.forwarded,
            reassembled: self.stats.reassembled,
            dropped: self.stats.dropped,
        }
        .encode();

        tracing::info!(target: "meshrelay::gateway", "Heartbeat: {}", body);
        let topic = kpi_topic(&self.address);
        self.publish(&topic, body.as_bytes(), KIND_KPI);
    }

    /// Publish once; failures are logged and counted, never retried
    fn publish(&mut self, topic: &str, payload: &[u8], kind: &'static str) -> bool {
        match self.broker.publish(topic, payload) {
            Ok(()) => {
                record_published(kind);
                true
            }
            Err(e) => {
                tracing::warn!(target: "meshrelay::gateway", "Publish to {} failed: {}", topic, e);
                self.stats.dropped += 1;
                record_publish_failure(kind);
                false
            }
        }
    }

    pub fn address(&self) -> MacAddress {
        self.address
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats
    }

    pub fn tracker(&self) -> &ReassemblyTracker {
        &self.tracker
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }
}
