//! In-process radio simulation
//!
//! Wraps any [`meshrelay::transport::RadioLink`] with seeded frame loss so the
//! engines can be driven through a degraded link without real hardware.

pub mod lossy_radio;

pub use lossy_radio::{LossyRadio, LossyRadioConfig};

#[allow(unused_imports)]
pub use lossy_radio::RadioStats;
