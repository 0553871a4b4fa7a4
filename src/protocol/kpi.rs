//! Heartbeat bodies
//!
//! Bodies are `key=value` pairs joined by `;`. Nodes send theirs over the
//! radio behind the `KPI|` prefix; the gateway publishes its own directly.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Node counters, monotonic since process start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KpiSnapshot {
    pub readings: u64,
    pub sent: u64,
    pub failures: u64,
    pub uptime_secs: u64,
}

impl KpiSnapshot {
    pub fn new(readings: u64, sent: u64, failures: u64, uptime: Duration) -> Self {
        Self {
            readings,
            sent,
            failures,
            uptime_secs: uptime.as_secs(),
        }
    }

    /// `readings=<n>;sent=<n>;failures=<n>;uptime=<secs>`
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse a body produced by [`KpiSnapshot::encode`]; unknown keys are
    /// ignored, missing keys are zero
    pub fn parse(body: &str) -> Option<Self> {
        let fields = parse_fields(body)?;
        let get = |key: &str| -> Option<u64> {
            match fields.get(key) {
                Some(v) => v.parse().ok(),
                None => Some(0),
            }
        };

        Some(Self {
            readings: get("readings")?,
            sent: get("sent")?,
            failures: get("failures")?,
            uptime_secs: get("uptime")?,
        })
    }
}

impl fmt::Display for KpiSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "readings={};sent={};failures={};uptime={}",
            self.readings, self.sent, self.failures, self.uptime_secs
        )
    }
}

/// Gateway self-report
///
/// Sent without the `KPI|` prefix and with the forwarding counters added;
/// the legacy firmware only reported `KPI|device_id=..;uptime=..`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayHeartbeat {
    pub device_id: String,
    pub uptime_secs: u64,
    pub forwarded: u64,
    pub reassembled: u64,
    pub dropped: u64,
}

impl GatewayHeartbeat {
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GatewayHeartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "device_id={};uptime={};forwarded={};reassembled={};dropped={}",
            self.device_id, self.uptime_secs, self.forwarded, self.reassembled, self.dropped
        )
    }
}

/// Split `k=v;k=v` into a map; `None` if any pair lacks `=`
pub fn parse_fields(body: &str) -> Option<BTreeMap<&str, &str>> {
    body.split(';')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('='))
        .collect()
}
