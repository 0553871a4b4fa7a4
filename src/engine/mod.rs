//! Role engines
//!
//! Exactly one engine runs per process: [`GatewayEngine`] bridges the radio
//! to the broker, [`NodeEngine`] buffers local readings and relays them
//! through the gateway. Both are single-task loops that own all of their
//! state.

pub mod error;
pub mod gateway;
pub mod node;
pub mod types;

pub use error::{RelayError, RelayResult};
pub use gateway::GatewayEngine;
pub use node::NodeEngine;
pub use types::{
    DiscoveryOutcome, EngineTimings, FailureCounter, GatewayStats, KpiCounters, NodeStep,
};
