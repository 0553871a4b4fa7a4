use crate::broker::BrokerError;
use crate::config::ConfigError;
use crate::fragment::FragmentError;
use crate::queue::QueueError;
use crate::transport::TransportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Uplink lost")]
    LinkLost,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Fragment error: {0}")]
    Fragment(#[from] FragmentError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RelayError {
    /// Errors after which the device has to restart its role
    pub fn requires_restart(&self) -> bool {
        match self {
            RelayError::LinkLost | RelayError::Config(_) => true,
            RelayError::Transport(e) => e.is_fatal(),
            RelayError::Broker(_) => true,
            RelayError::Queue(_) | RelayError::Fragment(_) => false,
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restart_classification() {
        assert!(RelayError::LinkLost.requires_restart());
        assert!(RelayError::from(TransportError::Closed).requires_restart());
        assert!(!RelayError::from(TransportError::SendFailed("x".into())).requires_restart());
        assert!(!RelayError::from(FragmentError::InvalidFragmentSize(0)).requires_restart());
    }
}
