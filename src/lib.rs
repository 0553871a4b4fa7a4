//! meshrelay: store-and-forward sensor relay
//!
//! One device per site becomes the gateway and bridges a broadcast radio
//! link to an MQTT broker; every other device is a node that samples its
//! sensor into a durable queue and relays readings through the gateway.
//!
//! ```text
//!  node --PART[i/n]|..--> gateway --mesh/data/<id>--> broker
//!  node --KPI|..--------> gateway --mesh/kpi/<id>---> broker
//!  node --DISCOVER_GATEWAY (broadcast)--> gateway
//!  node <--I_AM_GATEWAY:<addr>----------- gateway
//! ```
//!
//! The engines only see capability traits ([`transport::RadioLink`],
//! [`transport::LinkMonitor`], [`broker::Broker`], [`sensor::SensorSource`],
//! [`queue::QueueStore`]); in-memory implementations of each make the whole
//! relay testable in one process.

pub mod broker;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod fragment;
pub mod metrics;
pub mod protocol;
pub mod queue;
pub mod role;
pub mod sensor;
pub mod transport;

pub use config::RelayConfig;
pub use engine::{EngineTimings, GatewayEngine, NodeEngine, RelayError, RelayResult};
pub use role::{RoleDecision, RolePreference};
