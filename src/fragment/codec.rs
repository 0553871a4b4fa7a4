//! `PART[i/n]|` fragment codec
//!
//! Payloads that fit the fragment size travel bare. Larger payloads are cut
//! into contiguous slices, each prefixed with a textual header:
//!
//! ```text
//! PART[<index>/<total>]|<chunk bytes>
//! ```
//!
//! Indices are 1-based and contiguous.

use crate::fragment::error::{FragmentError, FragmentResult};
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

pub const FRAGMENT_PREFIX: &[u8] = b"PART[";
pub const FRAGMENT_TERMINATOR: &[u8] = b"]|";

/// Position of a chunk within a fragmented payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub index: u32,
    pub total: u32,
}

impl FragmentHeader {
    pub fn new(index: u32, total: u32) -> FragmentResult<Self> {
        if total == 0 || index == 0 || index > total {
            return Err(FragmentError::IndexOutOfRange { index, total });
        }
        Ok(Self { index, total })
    }

    /// Wire form, e.g. `PART[2/3]|`
    pub fn to_wire(&self) -> String {
        format!("PART[{}/{}]|", self.index, self.total)
    }
}

/// A fragment split into header and body (zero-copy view of the datagram)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFragment {
    pub header: FragmentHeader,
    pub body: Bytes,
}

/// Split `payload` into wire chunks of at most `max_size` body bytes
pub fn encode(payload: &[u8], max_size: usize) -> FragmentResult<Vec<Bytes>> {
    if max_size == 0 {
        return Err(FragmentError::InvalidFragmentSize(max_size));
    }

    if payload.len() <= max_size {
        return Ok(vec![Bytes::copy_from_slice(payload)]);
    }

    let total = payload.len().div_ceil(max_size);
    let total = u32::try_from(total).map_err(|_| FragmentError::InvalidFragmentSize(max_size))?;

    let chunks = payload
        .chunks(max_size)
        .zip(1..=total)
        .map(|(slice, index)| {
            let header = FragmentHeader { index, total }.to_wire();
            let mut buf = BytesMut::with_capacity(header.len() + slice.len());
            buf.put_slice(header.as_bytes());
            buf.put_slice(slice);
            buf.freeze()
        })
        .collect();

    Ok(chunks)
}

/// Structural check: starts with `PART[` and carries the `]|` terminator
pub fn is_fragment(payload: &[u8]) -> bool {
    payload.starts_with(FRAGMENT_PREFIX) && find_terminator(payload).is_some()
}

fn find_terminator(payload: &[u8]) -> Option<usize> {
    payload
        .windows(FRAGMENT_TERMINATOR.len())
        .position(|w| w == FRAGMENT_TERMINATOR)
}

fn parse_positive(digits: &[u8]) -> Option<u32> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value: u32 = std::str::from_utf8(digits).ok()?.parse().ok()?;
    (value > 0).then_some(value)
}

/// Parse the header of a fragment-shaped datagram
pub fn parse_header(payload: &Bytes) -> FragmentResult<ParsedFragment> {
    if !payload.starts_with(FRAGMENT_PREFIX) {
        return Err(FragmentError::MalformedFragment("missing PART[ prefix".into()));
    }

    let end = find_terminator(payload)
        .ok_or_else(|| FragmentError::MalformedFragment("missing ]| terminator".into()))?;

    if end < FRAGMENT_PREFIX.len() {
        return Err(FragmentError::MalformedFragment("truncated header".into()));
    }

    let fields = &payload[FRAGMENT_PREFIX.len()..end];
    let mut parts = fields.splitn(2, |b| *b == b'/');
    let (index, total) = match (parts.next(), parts.next()) {
        (Some(index), Some(total)) => (parse_positive(index), parse_positive(total)),
        _ => (None, None),
    };

    let (Some(index), Some(total)) = (index, total) else {
        return Err(FragmentError::MalformedFragment(format!(
            "bad header fields {:?}",
            String::from_utf8_lossy(fields)
        )));
    };

    let header = FragmentHeader::new(index, total)?;
    let body = payload.slice(end + FRAGMENT_TERMINATOR.len()..);

    Ok(ParsedFragment { header, body })
}

/// Rebuild a payload from its wire chunks, in any arrival order
///
/// [`encode`] never wraps a payload that fits in one chunk, so a lone chunk
/// is returned as is even when it happens to look like a fragment.
pub fn reassemble(chunks: &[Bytes]) -> FragmentResult<Bytes> {
    if let [single] = chunks {
        return Ok(single.clone());
    }

    let mut total = None;
    let mut parts = BTreeMap::new();

    for chunk in chunks {
        let parsed = parse_header(chunk)?;
        let expected = *total.get_or_insert(parsed.header.total);
        if parsed.header.total != expected {
            return Err(FragmentError::MalformedFragment(format!(
                "total changed from {expected} to {}",
                parsed.header.total
            )));
        }
        parts.insert(parsed.header.index, parsed.body);
    }

    let total = total.unwrap_or(0);
    if total == 0 || parts.len() as u32 != total {
        return Err(FragmentError::Incomplete {
            needed: total,
            available: parts.len() as u32,
        });
    }

    let mut out = BytesMut::with_capacity(parts.values().map(Bytes::len).sum());
    for body in parts.values() {
        out.put_slice(body);
    }
    Ok(out.freeze())
}
