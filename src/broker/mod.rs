//! Publish/subscribe broker uplink
//!
//! Only publishing is needed: the gateway forwards node traffic and its own
//! reports, at QoS 0, and never subscribes.

pub mod error;
pub mod memory;
pub mod mqtt;
pub mod packet;

pub use error::{BrokerError, BrokerResult};
pub use memory::{Published, RecordingBroker};
pub use mqtt::{MqttBroker, MqttOptions};

/// Broker capability consumed by the gateway
pub trait Broker {
    fn connect(&mut self) -> BrokerResult<()>;

    /// Fire-and-forget publish; an error means the message is lost
    fn publish(&mut self, topic: &str, payload: &[u8]) -> BrokerResult<()>;

    fn disconnect(&mut self) -> BrokerResult<()>;

    fn is_connected(&self) -> bool;
}
