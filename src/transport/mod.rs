//! Link-layer radio transport
//!
//! The relay engines only see the [`RadioLink`] and [`LinkMonitor`]
//! capabilities. Two links ship with the crate:
//! - [`UdpRadio`]: the radio link emulated over UDP broadcast on a LAN
//! - [`MemoryMesh`]: an in-process medium with failure injection

pub mod error;
pub mod memory;
pub mod radio;
pub mod types;
pub mod udp;

pub use error::{TransportError, TransportResult};
pub use memory::{MemoryMesh, MemoryRadio, SentFrame};
pub use radio::{HostLink, LinkMonitor, RadioLink, StaticLink};
pub use types::{Datagram, MacAddress, SharedKey, DEFAULT_MTU, SHARED_KEY_LEN};
pub use udp::UdpRadio;
