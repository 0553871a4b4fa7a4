use crate::protocol::NO_DATA;
use bytes::Bytes;
use std::fmt;

/// One sample from a device sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Raw 12-bit ADC value of a light-dependent resistor
    Light { raw: u16 },
    /// BME680 sample: degrees Celsius, relative humidity %, hPa
    Environment {
        temperature: f64,
        humidity: f64,
        pressure: f64,
    },
}

impl Reading {
    /// `LDR=512` or `T=21.5C H=44.0% P=1009.3hPa`
    pub fn to_payload(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Light { raw } => write!(f, "LDR={raw}"),
            Reading::Environment {
                temperature,
                humidity,
                pressure,
            } => write!(
                f,
                "T={}C H={}% P={}hPa",
                Hundredths(*temperature),
                Hundredths(*humidity),
                Hundredths(*pressure)
            ),
        }
    }
}

/// Payload for an optional reading; nothing becomes `no_data`
pub fn payload_for(reading: Option<&Reading>) -> Bytes {
    match reading {
        Some(reading) => reading.to_payload(),
        None => Bytes::from_static(NO_DATA.as_bytes()),
    }
}

/// Rounded to two decimals, shortest form, always with a fractional part
struct Hundredths(f64);

impl fmt::Display for Hundredths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = (self.0 * 100.0).round() / 100.0;
        if rounded.fract() == 0.0 {
            write!(f, "{rounded:.1}")
        } else {
            write!(f, "{rounded}")
        }
    }
}
