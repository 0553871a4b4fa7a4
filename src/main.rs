//! meshrelay device binary
//!
//! Boots one device: loads the configuration, arbitrates the role and runs
//! the matching engine. When an engine stops it is restarted after a pause,
//! the way the firmware reboots.
//!
//! # Usage
//!
//! ```bash
//! # Run with a configuration file
//! meshrelay --config meshrelay.toml
//!
//! # Force a role instead of probing the broker
//! meshrelay --config meshrelay.toml --role node
//!
//! # Generate an example configuration
//! meshrelay gen-config --output meshrelay.toml
//!
//! # Check a configuration file
//! meshrelay validate --config meshrelay.toml
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use meshrelay::broker::MqttBroker;
use meshrelay::metrics::{start_metrics_server, MetricsConfig};
use meshrelay::queue::{DurableQueue, FileQueueStore};
use meshrelay::role::{resolve, wait_for_link};
use meshrelay::sensor::SimulatedSensor;
use meshrelay::transport::{HostLink, MacAddress, SharedKey, UdpRadio};
use meshrelay::{EngineTimings, GatewayEngine, NodeEngine, RelayConfig, RoleDecision, RolePreference};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Store-and-forward sensor relay
#[derive(Parser, Debug)]
#[command(name = "meshrelay")]
#[command(about = "Store-and-forward sensor relay between a radio mesh and an MQTT broker")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "meshrelay.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Role override (auto, gateway, node)
    #[arg(long, default_value = "auto")]
    role: RolePreference,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "meshrelay.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Everything fixed at boot and reused across restarts
struct Device {
    config: RelayConfig,
    address: MacAddress,
    key: SharedKey,
    timings: EngineTimings,
    preference: RolePreference,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = RelayConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let device = Device {
        address: config.device_address()?,
        key: config.shared_key()?,
        timings: config.timings(),
        preference: args.role,
        config,
    };

    tracing::info!(
        target: "meshrelay::boot",
        "Device {} ({}), radio on udp/{}",
        device.address,
        device.address.node_id(),
        device.config.esp_now.udp_port
    );

    if let Some(listen_addr) = device.config.metrics.listen_addr {
        start_metrics_server(MetricsConfig::with_addr(listen_addr))?;
    }

    tokio::select! {
        result = run_device(&device) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(target: "meshrelay::boot", "Shutting down");
            Ok(())
        }
    }
}

/// Boot, run a role, pause, repeat
async fn run_device(device: &Device) -> anyhow::Result<()> {
    let config = &device.config;

    loop {
        let link = HostLink::new(&config.mqtt.host, config.mqtt.port);
        wait_for_link(
            &link,
            Duration::from_secs(config.wifi.connect_timeout_secs),
            Duration::from_secs(1),
        )
        .await;

        let mut broker = MqttBroker::new(config.mqtt_options());
        let role = resolve(device.preference, &link, &mut broker);

        let radio = UdpRadio::bind(device.address, config.esp_now.udp_port)
            .with_context(|| format!("binding radio on udp/{}", config.esp_now.udp_port))?;
        let sensor = SimulatedSensor::new(config.sensor_wiring());

        tracing::info!(target: "meshrelay::boot", "Acting as {}", role);

        let delay = match role {
            RoleDecision::Gateway => {
                let mut engine =
                    GatewayEngine::new(radio, broker, sensor, link, device.key, device.timings);
                if let Err(e) = engine.run().await {
                    tracing::error!(target: "meshrelay::boot", "Gateway stopped: {}", e);
                }
                device.timings.link_loss_reboot_delay
            }
            RoleDecision::Node => {
                let store = FileQueueStore::new(&config.device.queue_path);
                let queue = DurableQueue::load(store, device.timings.queue_capacity);
                let mut engine = NodeEngine::new(radio, sensor, queue, device.key, device.timings);
                if let Err(e) = engine.run().await {
                    tracing::warn!(target: "meshrelay::boot", "Node stopped: {}", e);
                }
                device.timings.node_restart_delay
            }
        };

        tracing::info!(target: "meshrelay::boot", "Restarting in {:?}", delay);
        tokio::time::sleep(delay).await;
    }
}

fn cmd_gen_config(output: PathBuf) -> anyhow::Result<()> {
    let toml_str = RelayConfig::example().to_toml()?;

    let content = format!(
        r#"# meshrelay configuration
# Generated by meshrelay gen-config

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> anyhow::Result<()> {
    match RelayConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!(
                "Broker:   {}:{} (client id {})",
                config.mqtt.host, config.mqtt.port, config.mqtt.client_id
            );
            println!(
                "Radio:    udp/{}, address {}",
                config.esp_now.udp_port,
                config.device.address.as_deref().unwrap_or("random")
            );
            println!(
                "Sensors:  ldr={} bme680={} every {}s",
                config.sensor.use_ldr,
                config.sensor.use_bme680,
                config.sensor.sensor_read_interval_secs
            );
            println!("Queue:    {}", config.device.queue_path.display());
            println!("KPI:      every {}s", config.kpi.kpi_interval_secs);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
