use crate::broker::error::{BrokerError, BrokerResult};
use crate::broker::Broker;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;

/// A message accepted by [`RecordingBroker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug)]
struct RecorderInner {
    reachable: bool,
    connected: bool,
    published: Vec<Published>,
    rejected: usize,
}

/// In-memory broker that records every publish; clones share state
#[derive(Debug, Clone)]
pub struct RecordingBroker {
    inner: Arc<Mutex<RecorderInner>>,
}

impl Default for RecordingBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RecorderInner {
                reachable: true,
                connected: false,
                published: Vec::new(),
                rejected: 0,
            })),
        }
    }

    /// While unreachable, connects and publishes fail
    pub fn set_reachable(&self, reachable: bool) {
        let mut inner = self.inner.lock();
        inner.reachable = reachable;
        if !reachable {
            inner.connected = false;
        }
    }

    pub fn published(&self) -> Vec<Published> {
        self.inner.lock().published.clone()
    }

    /// Messages published on `topic`, in order
    pub fn on_topic(&self, topic: &str) -> Vec<Bytes> {
        self.inner
            .lock()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload.clone())
            .collect()
    }

    /// Publishes refused while unreachable
    pub fn rejected(&self) -> usize {
        self.inner.lock().rejected
    }
}

impl Broker for RecordingBroker {
    fn connect(&mut self) -> BrokerResult<()> {
        let mut inner = self.inner.lock();
        if !inner.reachable {
            return Err(BrokerError::ConnectionFailed("broker unreachable".into()));
        }
        inner.connected = true;
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> BrokerResult<()> {
        let mut inner = self.inner.lock();
        if !inner.reachable {
            inner.rejected += 1;
            return Err(BrokerError::PublishFailed("broker unreachable".into()));
        }

        inner.connected = true;
        inner.published.push(Published {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
        });
        Ok(())
    }

    fn disconnect(&mut self) -> BrokerResult<()> {
        self.inner.lock().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }
}
