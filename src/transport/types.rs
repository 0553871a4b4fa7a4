use crate::transport::error::TransportError;
use bytes::Bytes;
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// Maximum datagram payload on this link class
pub const DEFAULT_MTU: usize = 250;

/// Length of the pre-shared peer key
pub const SHARED_KEY_LEN: usize = 16;

pub type SharedKey = [u8; SHARED_KEY_LEN];

/// 6-byte link-layer address of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const LEN: usize = 6;

    /// Reserved address reaching every peer
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Build from a slice of exactly 6 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Random unicast, locally administered address
    pub fn random_local() -> Self {
        let mut bytes: [u8; 6] = rand::thread_rng().gen();
        bytes[0] = (bytes[0] & 0xfc) | 0x02;
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Lowercase hex rendering used as the stable node identifier
    pub fn node_id(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = TransportError;

    /// Accepts `aabbccddeeff`, `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();

        let bytes =
            hex::decode(&compact).map_err(|e| TransportError::InvalidAddress(format!("{s}: {e}")))?;

        Self::from_slice(&bytes)
            .ok_or_else(|| TransportError::InvalidAddress(format!("{s}: expected 6 bytes")))
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

/// A payload observed on the link together with its sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub source: MacAddress,
    pub payload: Bytes,
}

impl Datagram {
    pub fn new(source: MacAddress, payload: impl Into<Bytes>) -> Self {
        Self {
            source,
            payload: payload.into(),
        }
    }
}
