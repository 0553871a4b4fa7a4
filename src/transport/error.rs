use crate::transport::types::MacAddress;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Peer {0} is not registered")]
    PeerNotRegistered(MacAddress),

    #[error("Payload of {size} bytes exceeds MTU of {mtu} bytes")]
    PayloadTooLarge { size: usize, mtu: usize },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Transport closed")]
    Closed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the transport can no longer be used at all
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

pub type TransportResult<T> = Result<T, TransportError>;
