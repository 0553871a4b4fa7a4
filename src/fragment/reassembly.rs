//! Per-sender reassembly of fragmented payloads

use crate::fragment::error::{FragmentError, FragmentResult};
use crate::transport::MacAddress;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Incomplete entries older than this are dropped
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Partial message from one sender
///
/// Only exists while some, but not all, parts have arrived.
#[derive(Debug, Clone)]
pub struct ReassemblyEntry {
    total: u32,
    parts: HashMap<u32, Bytes>,
    started_at: Instant,
}

impl ReassemblyEntry {
    fn new(total: u32, started_at: Instant) -> Self {
        Self {
            total,
            parts: HashMap::with_capacity(total as usize),
            started_at,
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn received(&self) -> usize {
        self.parts.len()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn is_complete(&self) -> bool {
        self.parts.len() == self.total as usize
    }

    /// Indices still missing, ascending
    pub fn missing(&self) -> Vec<u32> {
        (1..=self.total)
            .filter(|i| !self.parts.contains_key(i))
            .collect()
    }

    fn concat(&self) -> Option<Bytes> {
        let size = self.parts.values().map(Bytes::len).sum();
        let mut out = BytesMut::with_capacity(size);
        for index in 1..=self.total {
            out.put_slice(self.parts.get(&index)?);
        }
        Some(out.freeze())
    }
}

/// Reassembly table keyed by sender address
#[derive(Debug, Default)]
pub struct ReassemblyTracker {
    entries: HashMap<MacAddress, ReassemblyEntry>,
}

impl ReassemblyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one fragment from `sender`
    ///
    /// The first fragment seen fixes `total` for the entry; later headers
    /// announcing a different total do not change it. A part already stored
    /// at `index` is overwritten.
    pub fn on_fragment(
        &mut self,
        sender: MacAddress,
        index: u32,
        total: u32,
        body: Bytes,
        now: Instant,
    ) -> FragmentResult<()> {
        if total == 0 || index == 0 || index > total {
            return Err(FragmentError::IndexOutOfRange { index, total });
        }

        let entry = self
            .entries
            .entry(sender)
            .or_insert_with(|| ReassemblyEntry::new(total, now));

        if entry.total != total {
            tracing::debug!(
                target: "meshrelay::reassembly",
                "Ignoring total {} from {}, keeping {}",
                total,
                sender,
                entry.total
            );

            if index > entry.total {
                return Err(FragmentError::IndexOutOfRange {
                    index,
                    total: entry.total,
                });
            }
        }

        entry.parts.insert(index, body);
        Ok(())
    }

    /// Concatenate and remove the entry for `sender` once every part is in
    pub fn try_complete(&mut self, sender: &MacAddress) -> Option<Bytes> {
        if !self.entries.get(sender)?.is_complete() {
            return None;
        }

        let entry = self.entries.remove(sender)?;
        entry.concat()
    }

    /// Drop every entry started more than `timeout` before `now`
    pub fn evict_expired(&mut self, now: Instant, timeout: Duration) -> Vec<MacAddress> {
        let expired: Vec<MacAddress> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.started_at) > timeout)
            .map(|(sender, _)| *sender)
            .collect();

        for sender in &expired {
            self.entries.remove(sender);
        }

        expired
    }

    pub fn get(&self, sender: &MacAddress) -> Option<&ReassemblyEntry> {
        self.entries.get(sender)
    }

    pub fn contains(&self, sender: &MacAddress) -> bool {
        self.entries.contains_key(sender)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
