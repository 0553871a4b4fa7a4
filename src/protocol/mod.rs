//! Relay wire protocol
//!
//! All radio messages are raw byte strings distinguished by prefix:
//!
//! | Message            | Format                               |
//! |--------------------|--------------------------------------|
//! | Discovery request  | `DISCOVER_GATEWAY`                   |
//! | Discovery response | `I_AM_GATEWAY:` + 6 address bytes    |
//! | Fragment           | `PART[<index>/<total>]\|` + chunk    |
//! | Heartbeat          | `KPI\|key=val;key=val`               |
//! | Data               | anything else                        |

pub mod kpi;
pub mod wire;

pub use kpi::{parse_fields, GatewayHeartbeat, KpiSnapshot};
pub use wire::{
    data_topic, discovery_response, heartbeat, kpi_topic, parse_discovery_response, WireMessage,
    DATA_TOPIC_ROOT, DISCOVERY_REQUEST, DISCOVERY_RESPONSE_PREFIX, HEARTBEAT_PREFIX,
    KPI_TOPIC_ROOT, NO_DATA,
};
