use crate::sensor::reading::Reading;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A device's sensor capability
pub trait SensorSource {
    /// Sample once; `None` when no sensor is present or it produced nothing
    fn read(&mut self) -> Option<Reading>;
}

/// Which sensors are fitted, and where
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorWiring {
    pub use_ldr: bool,
    pub ldr_pin: u8,
    pub use_bme680: bool,
    pub sda_pin: u8,
    pub scl_pin: u8,
}

/// Host stand-in for the LDR and BME680
///
/// Produces a slow random walk so consecutive readings look plausible. The
/// LDR takes precedence when both are enabled.
pub struct SimulatedSensor {
    wiring: SensorWiring,
    rng: StdRng,
    light: u16,
    temperature: f64,
    humidity: f64,
    pressure: f64,
}

impl SimulatedSensor {
    pub fn new(wiring: SensorWiring) -> Self {
        Self::with_rng(wiring, StdRng::from_entropy())
    }

    pub fn seeded(wiring: SensorWiring, seed: u64) -> Self {
        Self::with_rng(wiring, StdRng::seed_from_u64(seed))
    }

    fn with_rng(wiring: SensorWiring, rng: StdRng) -> Self {
        if wiring.use_ldr {
            tracing::info!(target: "meshrelay::sensor", "LDR on pin {}", wiring.ldr_pin);
        }
        if wiring.use_bme680 {
            tracing::info!(
                target: "meshrelay::sensor",
                "BME680 on sda={} scl={}",
                wiring.sda_pin,
                wiring.scl_pin
            );
        }

        Self {
            wiring,
            rng,
            light: 2048,
            temperature: 21.5,
            humidity: 45.0,
            pressure: 1010.0,
        }
    }

    fn drift(&mut self, value: f64, step: f64, min: f64, max: f64) -> f64 {
        (value + self.rng.gen_range(-step..=step)).clamp(min, max)
    }
}

impl SensorSource for SimulatedSensor {
    fn read(&mut self) -> Option<Reading> {
        let reading = if self.wiring.use_ldr {
            let delta: i32 = self.rng.gen_range(-64..=64);
            self.light = (i32::from(self.light) + delta).clamp(0, 4095) as u16;
            Reading::Light { raw: self.light }
        } else if self.wiring.use_bme680 {
            self.temperature = self.drift(self.temperature, 0.3, -20.0, 50.0);
            self.humidity = self.drift(self.humidity, 1.0, 5.0, 95.0);
            self.pressure = self.drift(self.pressure, 0.5, 950.0, 1050.0);
            Reading::Environment {
                temperature: self.temperature,
                humidity: self.humidity,
                pressure: self.pressure,
            }
        } else {
            return None;
        };

        tracing::debug!(target: "meshrelay::sensor", "{}", reading);
        Some(reading)
    }
}

/// Replays a fixed sequence, repeating the last element forever
#[derive(Debug, Clone)]
pub struct FixedSensor {
    readings: Vec<Option<Reading>>,
    next: usize,
}

impl FixedSensor {
    pub fn new(reading: Option<Reading>) -> Self {
        Self::sequence(vec![reading])
    }

    pub fn sequence(readings: Vec<Option<Reading>>) -> Self {
        Self { readings, next: 0 }
    }

    /// Number of reads so far
    pub fn reads(&self) -> usize {
        self.next
    }
}

impl SensorSource for FixedSensor {
    fn read(&mut self) -> Option<Reading> {
        let index = self.next.min(self.readings.len().saturating_sub(1));
        self.next += 1;
        self.readings.get(index).copied().flatten()
    }
}
