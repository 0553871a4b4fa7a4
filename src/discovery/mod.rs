//! Gateway discovery
//!
//! A node without a gateway broadcasts `DISCOVER_GATEWAY` and listens for an
//! `I_AM_GATEWAY:` reply for a bounded window:
//!
//! ```text
//! Unknown --probe--> Probing --reply--> Found(addr)
//!                       |
//!                       +--timeout--> Unknown
//! ```

use crate::metrics::recorder::record_discovery_attempt;
use crate::protocol::{WireMessage, DISCOVERY_REQUEST};
use crate::transport::{MacAddress, RadioLink, SharedKey, TransportError, TransportResult};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    Unknown,
    Probing,
    Found(MacAddress),
}

/// One node's view of the discovery handshake
#[derive(Debug)]
pub struct Discovery {
    timeout: Duration,
    poll_interval: Duration,
    state: DiscoveryState,
}

impl Discovery {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            state: DiscoveryState::Unknown,
        }
    }

    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Forget the gateway; the next probe starts from scratch
    pub fn reset(&mut self) {
        self.state = DiscoveryState::Unknown;
    }

    /// Broadcast a request and wait up to the timeout for a gateway reply
    ///
    /// The replying gateway is registered as a peer with `key` before it is
    /// returned. Unrelated datagrams arriving during the window are dropped.
    /// Only a closed transport is an error.
    pub async fn probe<R: RadioLink>(
        &mut self,
        radio: &mut R,
        key: &SharedKey,
    ) -> TransportResult<Option<MacAddress>> {
        self.state = DiscoveryState::Probing;

        if let Err(e) = radio.send(MacAddress::BROADCAST, DISCOVERY_REQUEST) {
            self.state = DiscoveryState::Unknown;
            if e.is_fatal() {
                return Err(e);
            }
            tracing::warn!(target: "meshrelay::discovery", "Broadcast failed: {}", e);
            record_discovery_attempt(false);
            return Ok(None);
        }

        let deadline = Instant::now() + self.timeout;

        while Instant::now() < deadline {
            match radio.try_recv() {
                Ok(Some(datagram)) => {
                    match WireMessage::classify(datagram.payload) {
                        WireMessage::DiscoveryResponse(gateway) => {
                            if let Err(e) = radio.add_peer(gateway, key) {
                                self.state = DiscoveryState::Unknown;
                                return Err(e);
                            }
                            tracing::info!(
                                target: "meshrelay::discovery",
                                "Found gateway {} (reply from {})",
                                gateway,
                                datagram.source
                            );
                            self.state = DiscoveryState::Found(gateway);
                            record_discovery_attempt(true);
                            return Ok(Some(gateway));
                        }
                        other => {
                            tracing::debug!(
                                target: "meshrelay::discovery",
                                "Ignoring {:?} from {} while probing",
                                other,
                                datagram.source
                            );
                            continue;
                        }
                    }
                }
                Ok(None) => {}
                Err(TransportError::Closed) => {
                    self.state = DiscoveryState::Unknown;
                    return Err(TransportError::Closed);
                }
                Err(e) => {
                    tracing::warn!(target: "meshrelay::discovery", "Receive failed: {}", e);
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }

        tracing::info!(
            target: "meshrelay::discovery",
            "No gateway answered within {:?}",
            self.timeout
        );
        self.state = DiscoveryState::Unknown;
        record_discovery_attempt(false);
        Ok(None)
    }
}
