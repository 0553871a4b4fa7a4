//! Radio wire messages and broker topic naming

use crate::fragment::{is_fragment, parse_header, FragmentResult, ParsedFragment};
use crate::transport::MacAddress;
use bytes::{BufMut, Bytes, BytesMut};

pub const DISCOVERY_REQUEST: &[u8] = b"DISCOVER_GATEWAY";
pub const DISCOVERY_RESPONSE_PREFIX: &[u8] = b"I_AM_GATEWAY:";
pub const HEARTBEAT_PREFIX: &[u8] = b"KPI|";

pub const DATA_TOPIC_ROOT: &str = "mesh/data";
pub const KPI_TOPIC_ROOT: &str = "mesh/kpi";

/// Payload a node reports when its sensor yields nothing
pub const NO_DATA: &str = "no_data";

/// Classification of an inbound radio datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// `DISCOVER_GATEWAY`
    DiscoveryRequest,
    /// `I_AM_GATEWAY:` + 6 address bytes
    DiscoveryResponse(MacAddress),
    /// `PART[i/n]|...`, still unparsed
    Fragment(Bytes),
    /// Body of a `KPI|...` message, prefix stripped
    Heartbeat(Bytes),
    /// Anything else
    Data(Bytes),
}

impl WireMessage {
    pub fn classify(payload: Bytes) -> Self {
        if payload.as_ref() == DISCOVERY_REQUEST {
            return WireMessage::DiscoveryRequest;
        }

        if let Some(address) = parse_discovery_response(&payload) {
            return WireMessage::DiscoveryResponse(address);
        }

        if is_fragment(&payload) {
            return WireMessage::Fragment(payload);
        }

        if payload.starts_with(HEARTBEAT_PREFIX) {
            return WireMessage::Heartbeat(payload.slice(HEARTBEAT_PREFIX.len()..));
        }

        WireMessage::Data(payload)
    }

    /// Parse the header of a [`WireMessage::Fragment`]
    pub fn parse_fragment(&self) -> Option<FragmentResult<ParsedFragment>> {
        match self {
            WireMessage::Fragment(payload) => Some(parse_header(payload)),
            _ => None,
        }
    }
}

/// `I_AM_GATEWAY:` followed by the raw address
pub fn discovery_response(address: MacAddress) -> Bytes {
    let mut buf = BytesMut::with_capacity(DISCOVERY_RESPONSE_PREFIX.len() + MacAddress::LEN);
    buf.put_slice(DISCOVERY_RESPONSE_PREFIX);
    buf.put_slice(address.as_bytes());
    buf.freeze()
}

/// Address carried by a discovery response, if `payload` is exactly one
pub fn parse_discovery_response(payload: &[u8]) -> Option<MacAddress> {
    let rest = payload.strip_prefix(DISCOVERY_RESPONSE_PREFIX)?;
    if rest.len() != MacAddress::LEN {
        return None;
    }
    MacAddress::from_slice(rest)
}

/// `KPI|` + body
pub fn heartbeat(body: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEARTBEAT_PREFIX.len() + body.len());
    buf.put_slice(HEARTBEAT_PREFIX);
    buf.put_slice(body.as_bytes());
    buf.freeze()
}

pub fn data_topic(node: &MacAddress) -> String {
    format!("{}/{}", DATA_TOPIC_ROOT, node.node_id())
}

pub fn kpi_topic(node: &MacAddress) -> String {
    format!("{}/{}", KPI_TOPIC_ROOT, node.node_id())
}
