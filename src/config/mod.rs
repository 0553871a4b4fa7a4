//! Device configuration
//!
//! Loaded once at boot from a TOML file. A file that cannot be read or a
//! peer key that is not 16 bytes long stops the device.

pub mod error;
pub mod types;

pub use error::{ConfigError, ConfigResult};
pub use types::{
    DeviceConfig, EspNowConfig, KpiConfig, MetricsSection, MqttConfig, SensorConfig, WifiConfig,
};

use crate::broker::MqttOptions;
use crate::engine::EngineTimings;
use crate::sensor::SensorWiring;
use crate::transport::{MacAddress, SharedKey, SHARED_KEY_LEN};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub device: DeviceConfig,
    pub wifi: WifiConfig,
    pub mqtt: MqttConfig,
    pub sensor: SensorConfig,
    pub kpi: KpiConfig,
    pub esp_now: EspNowConfig,
    pub metrics: MetricsSection,
}

impl RelayConfig {
    /// Load and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let key_len = self.esp_now.esp_key.len();
        if key_len != SHARED_KEY_LEN {
            return Err(ConfigError::Invalid(format!(
                "esp_key must be {} bytes, got {}",
                SHARED_KEY_LEN, key_len
            )));
        }

        if let Some(ref address) = self.device.address {
            address
                .parse::<MacAddress>()
                .map_err(|e| ConfigError::Invalid(format!("device.address: {e}")))?;
        }

        if self.mqtt.host.is_empty() {
            return Err(ConfigError::Invalid("mqtt.host is empty".into()));
        }

        if self.mqtt.client_id.is_empty() {
            return Err(ConfigError::Invalid("mqtt.client_id is empty".into()));
        }

        if self.sensor.sensor_read_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sensor.sensor_read_interval_secs must be positive".into(),
            ));
        }

        if self.kpi.kpi_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "kpi.kpi_interval_secs must be positive".into(),
            ));
        }

        Ok(())
    }

    pub fn shared_key(&self) -> ConfigResult<SharedKey> {
        self.esp_now
            .esp_key
            .as_bytes()
            .try_into()
            .map_err(|_| {
                ConfigError::Invalid(format!(
                    "esp_key must be {} bytes, got {}",
                    SHARED_KEY_LEN,
                    self.esp_now.esp_key.len()
                ))
            })
    }

    /// Configured address, or a fresh random one
    pub fn device_address(&self) -> ConfigResult<MacAddress> {
        match self.device.address {
            Some(ref address) => address
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("device.address: {e}"))),
            None => Ok(MacAddress::random_local()),
        }
    }

    pub fn timings(&self) -> EngineTimings {
        EngineTimings {
            heartbeat_interval: Duration::from_secs(self.kpi.kpi_interval_secs),
            sensor_interval: Duration::from_secs(self.sensor.sensor_read_interval_secs),
            ..EngineTimings::default()
        }
    }

    pub fn mqtt_options(&self) -> MqttOptions {
        MqttOptions::new(&self.mqtt.host, self.mqtt.port, &self.mqtt.client_id)
            .with_credentials(self.mqtt.user.clone(), self.mqtt.password.clone())
            .with_connect_timeout(Duration::from_secs(self.mqtt.connect_timeout_secs))
    }

    pub fn sensor_wiring(&self) -> SensorWiring {
        SensorWiring {
            use_ldr: self.sensor.use_ldr,
            ldr_pin: self.sensor.ldr_pin,
            use_bme680: self.sensor.use_bme680,
            sda_pin: self.sensor.bme680_sda_pin,
            scl_pin: self.sensor.bme680_scl_pin,
        }
    }

    /// A filled-in configuration suitable as a starting point
    pub fn example() -> Self {
        Self {
            device: DeviceConfig {
                address: Some("24:6f:28:aa:bb:01".into()),
                ..DeviceConfig::default()
            },
            wifi: WifiConfig {
                ssid: "sensors".into(),
                password: "changeme".into(),
                ..WifiConfig::default()
            },
            mqtt: MqttConfig {
                user: Some("mesh".into()),
                password: Some("changeme".into()),
                ..MqttConfig::default()
            },
            sensor: SensorConfig {
                use_ldr: true,
                ..SensorConfig::default()
            },
            kpi: KpiConfig::default(),
            esp_now: EspNowConfig {
                esp_key: "0123456789abcdef".into(),
                ..EspNowConfig::default()
            },
            metrics: MetricsSection {
                listen_addr: "127.0.0.1:9100".parse().ok(),
            },
        }
    }

    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
