//! Metrics and observability module
//!
//! Prometheus-compatible counters mirroring the node KPI heartbeat and the
//! gateway forwarding statistics.
//!
//! Key metrics exposed:
//! - Readings queued, delivered and failed on nodes
//! - Discovery attempts and gateway losses
//! - Broker publishes, reassembled messages and dropped fragments
//! - Node queue depth

pub mod exporter;
pub mod recorder;

pub use exporter::{render_metrics, start_metrics_server, MetricsConfig, MetricsError};
pub use recorder::init_metrics;
