//! Startup role arbitration
//!
//! A device becomes the gateway when its uplink is up and the broker accepts
//! a connection; otherwise it runs as a node. The decision is made once per
//! process run.

use crate::broker::Broker;
use crate::transport::LinkMonitor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleDecision {
    Gateway,
    Node,
}

impl fmt::Display for RoleDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleDecision::Gateway => write!(f, "gateway"),
            RoleDecision::Node => write!(f, "node"),
        }
    }
}

/// Operator override of the arbitration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolePreference {
    #[default]
    Auto,
    Gateway,
    Node,
}

impl FromStr for RolePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(RolePreference::Auto),
            "gateway" => Ok(RolePreference::Gateway),
            "node" => Ok(RolePreference::Node),
            other => Err(format!("unknown role '{other}' (auto, gateway, node)")),
        }
    }
}

/// Decide the role from uplink health and broker reachability
///
/// The broker probe connects and immediately disconnects.
pub fn arbitrate<L: LinkMonitor, B: Broker>(link: &L, broker: &mut B) -> RoleDecision {
    if !link.is_connected() {
        tracing::info!(target: "meshrelay::role", "Uplink down, acting as node");
        return RoleDecision::Node;
    }

    match broker.connect() {
        Ok(()) => {
            if let Err(e) = broker.disconnect() {
                tracing::debug!(target: "meshrelay::role", "Probe disconnect failed: {}", e);
            }
            tracing::info!(target: "meshrelay::role", "Broker reachable, acting as gateway");
            RoleDecision::Gateway
        }
        Err(e) => {
            tracing::info!(target: "meshrelay::role", "Broker unreachable ({}), acting as node", e);
            RoleDecision::Node
        }
    }
}

/// Apply an operator preference; `Auto` falls through to [`arbitrate`]
pub fn resolve<L: LinkMonitor, B: Broker>(
    preference: RolePreference,
    link: &L,
    broker: &mut B,
) -> RoleDecision {
    match preference {
        RolePreference::Auto => arbitrate(link, broker),
        RolePreference::Gateway => RoleDecision::Gateway,
        RolePreference::Node => RoleDecision::Node,
    }
}

/// Poll the uplink once per `poll` for up to `timeout`; true if it came up
pub async fn wait_for_link<L: LinkMonitor>(link: &L, timeout: Duration, poll: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if link.is_connected() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!(target: "meshrelay::role", "Uplink not up after {:?}", timeout);
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}
