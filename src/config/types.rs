//! Device configuration sections
//!
//! Every section and field has a default so a partial file is valid TOML;
//! [`super::RelayConfig::validate`] decides whether it is usable.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Link address; a random locally-administered one when absent
    pub address: Option<String>,
    /// Node queue file
    pub queue_path: PathBuf,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: None,
            queue_path: PathBuf::from("buffer.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    pub ssid: String,
    pub password: String,
    pub connect_timeout_secs: u64,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: String::new(),
            password: String::new(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub connect_timeout_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "broker.local".to_string(),
            port: 1883,
            user: None,
            password: None,
            client_id: "gateway".to_string(),
            connect_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub use_ldr: bool,
    pub ldr_pin: u8,
    pub use_bme680: bool,
    pub bme680_sda_pin: u8,
    pub bme680_scl_pin: u8,
    pub sensor_read_interval_secs: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            use_ldr: false,
            ldr_pin: 34,
            use_bme680: false,
            bme680_sda_pin: 21,
            bme680_scl_pin: 22,
            sensor_read_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KpiConfig {
    pub kpi_interval_secs: u64,
}

impl Default for KpiConfig {
    fn default() -> Self {
        Self {
            kpi_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EspNowConfig {
    /// Pre-shared peer key, exactly 16 bytes
    pub esp_key: String,
    /// Port of the UDP broadcast domain emulating the radio
    pub udp_port: u16,
}

impl Default for EspNowConfig {
    fn default() -> Self {
        Self {
            esp_key: String::new(),
            udp_port: 4210,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    /// Prometheus scrape address; exporter disabled when absent
    pub listen_addr: Option<SocketAddr>,
}
