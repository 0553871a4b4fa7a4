//! Device sensors and their payload format

pub mod reading;
pub mod source;

pub use reading::{payload_for, Reading};
pub use source::{FixedSensor, SensorSource, SensorWiring, SimulatedSensor};
