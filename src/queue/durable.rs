use crate::queue::error::{QueueError, QueueResult};
use crate::queue::store::QueueStore;
use bytes::Bytes;

/// Capacity of the node's outbound queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 20;

/// Bounded FIFO of pending payloads mirrored to a [`QueueStore`]
///
/// Pushing into a full queue is refused rather than blocking; the refused
/// payload is not kept anywhere.
pub struct DurableQueue<S: QueueStore> {
    entries: Vec<Bytes>,
    capacity: usize,
    store: S,
}

impl<S: QueueStore> DurableQueue<S> {
    /// Empty queue that does not read the store
    pub fn new(store: S, capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            store,
        }
    }

    /// Restore unsent payloads from the store
    ///
    /// A missing or unreadable store yields an empty queue. At most
    /// `capacity` entries are restored.
    pub fn load(store: S, capacity: usize) -> Self {
        let mut queue = Self::new(store, capacity);

        match queue.store.load() {
            Ok(mut entries) => {
                if entries.len() > capacity {
                    tracing::warn!(
                        target: "meshrelay::queue",
                        "Store holds {} entries, keeping first {}",
                        entries.len(),
                        capacity
                    );
                    entries.truncate(capacity);
                }
                tracing::info!(target: "meshrelay::queue", "Loaded {} items", entries.len());
                queue.entries = entries;
            }
            Err(e) => {
                tracing::warn!(target: "meshrelay::queue", "Starting empty: {}", e);
            }
        }

        queue
    }

    /// Append `entry` if there is room
    ///
    /// Fails with [`QueueError::Full`] when at capacity and with
    /// [`QueueError::InvalidEntry`] when the entry contains a newline, which
    /// the line-based store cannot represent.
    pub fn push(&mut self, entry: Bytes) -> QueueResult<()> {
        if self.entries.len() >= self.capacity {
            return Err(QueueError::Full {
                capacity: self.capacity,
            });
        }

        if entry.contains(&b'\n') {
            return Err(QueueError::InvalidEntry(format!(
                "{} byte payload contains a newline",
                entry.len()
            )));
        }

        self.entries.push(entry);
        Ok(())
    }

    /// Remove the first `n` entries (already delivered); returns how many
    /// were removed
    pub fn pop_front_prefix(&mut self, n: usize) -> usize {
        let n = n.min(self.entries.len());
        self.entries.drain(..n);
        n
    }

    /// Overwrite the store with the current contents
    pub fn persist(&self) -> QueueResult<()> {
        self.store.save(&self.entries)?;
        tracing::debug!(target: "meshrelay::queue", "Saved {} items", self.entries.len());
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.entries.get(index)
    }

    pub fn front(&self) -> Option<&Bytes> {
        self.entries.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
