use crate::protocol::KpiSnapshot;
use crate::transport::MacAddress;
use std::time::Duration;
use tokio::time::Instant;

/// Cadence and limits shared by both engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTimings {
    pub gateway_tick: Duration,
    pub node_tick: Duration,
    pub discovery_timeout: Duration,
    pub discovery_poll: Duration,
    pub discovery_backoff: Duration,
    pub fragment_delay: Duration,
    pub reassembly_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub sensor_interval: Duration,
    pub fragment_size: usize,
    pub queue_capacity: usize,
    pub max_failures: u32,
    /// Pause before the gateway restarts after losing its uplink
    pub link_loss_reboot_delay: Duration,
    /// Pause before a node whose loop ended starts over
    pub node_restart_delay: Duration,
}

impl Default for EngineTimings {
    fn default() -> Self {
        Self {
            gateway_tick: Duration::from_millis(100),
            node_tick: Duration::from_secs(1),
            discovery_timeout: Duration::from_millis(3000),
            discovery_poll: Duration::from_millis(50),
            discovery_backoff: Duration::from_secs(5),
            fragment_delay: Duration::from_millis(50),
            reassembly_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(60),
            sensor_interval: Duration::from_secs(30),
            fragment_size: 240,
            queue_capacity: 20,
            max_failures: 3,
            link_loss_reboot_delay: Duration::from_secs(2),
            node_restart_delay: Duration::from_secs(10),
        }
    }
}

/// Consecutive send failures towards the current gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCounter {
    count: u32,
    threshold: u32,
}

impl FailureCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    /// Count a failure; true once the threshold is reached
    pub fn record_failure(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.count >= self.threshold
    }

    pub fn record_success(&mut self) {
        self.count = 0;
    }

    pub fn reset(&mut self) {
        self.count = 0;
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

/// Node counters reported in heartbeats
#[derive(Debug, Clone, Copy)]
pub struct KpiCounters {
    pub readings: u64,
    pub sent: u64,
    pub failures: u64,
    started_at: Instant,
}

impl KpiCounters {
    pub fn new(started_at: Instant) -> Self {
        Self {
            readings: 0,
            sent: 0,
            failures: 0,
            started_at,
        }
    }

    pub fn snapshot(&self, now: Instant) -> KpiSnapshot {
        KpiSnapshot::new(
            self.readings,
            self.sent,
            self.failures,
            now.saturating_duration_since(self.started_at),
        )
    }
}

/// Result of the discovery phase of one node iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// A gateway was already known
    Cached,
    Found(MacAddress),
    /// Nobody answered; the node slept the backoff
    NotFound,
}

/// What one node iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStep {
    /// `Some(accepted)` when a reading was taken this iteration
    pub reading_queued: Option<bool>,
    pub discovery: DiscoveryOutcome,
    /// Queue entries delivered
    pub sent: usize,
    /// Entries dropped because a frame would exceed the radio MTU
    pub discarded: usize,
    /// Whether the drain stopped on a failed send
    pub send_failed: bool,
    /// Whether the failure threshold cleared the gateway
    pub gateway_dropped: bool,
    pub heartbeat_sent: bool,
}

impl NodeStep {
    pub(crate) fn new(discovery: DiscoveryOutcome) -> Self {
        Self {
            reading_queued: None,
            discovery,
            sent: 0,
            discarded: 0,
            send_failed: false,
            gateway_dropped: false,
            heartbeat_sent: false,
        }
    }
}

/// Gateway counters reported in its own heartbeat
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    /// Successful publishes of radio traffic
    pub forwarded: u64,
    /// Completed multi-part messages
    pub reassembled: u64,
    /// Malformed fragments, evicted entries and failed publishes
    pub dropped: u64,
    pub discovery_replies: u64,
}
