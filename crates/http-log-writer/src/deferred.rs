// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Deferred retry buffer.
//!
//! Holds assembled batches whose delivery failed so a worker can send them
//! again later. The buffer is bounded: when full, the newest pack is
//! rejected and counted as dropped, the packs already waiting are kept.
//! A capacity of zero disables retries altogether.

use crate::batch::Batch;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

#[derive(Debug)]
pub struct DeferredBuffer {
    packs: Option<ArrayQueue<Batch>>,
    dropped_packs: AtomicU64,
    dropped_entries: AtomicU64,
}

impl DeferredBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        DeferredBuffer {
            // ArrayQueue does not support a zero capacity.
            packs: (capacity > 0).then(|| ArrayQueue::new(capacity)),
            dropped_packs: AtomicU64::new(0),
            dropped_entries: AtomicU64::new(0),
        }
    }

    /// Parks a failed batch. Returns `false` if it had to be dropped.
    pub fn push(&self, pack: Batch) -> bool {
        let Some(packs) = &self.packs else {
            self.discard(&pack, "deferred buffer is disabled");
            return false;
        };
        match packs.push(pack) {
            Ok(()) => true,
            Err(pack) => {
                self.discard(&pack, "deferred buffer is full");
                false
            }
        }
    }

    pub fn pop(&self) -> Option<Batch> {
        self.packs.as_ref().and_then(ArrayQueue::pop)
    }

    /// Drops every waiting pack, counting them. Returns how many were dropped.
    pub fn discard_all(&self) -> usize {
        let mut discarded = 0;
        while let Some(pack) = self.pop() {
            self.count_drop(&pack);
            discarded += 1;
        }
        discarded
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.packs.as_ref().map_or(0, ArrayQueue::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.packs.as_ref().map_or(0, ArrayQueue::capacity)
    }

    /// Packs dropped because the buffer was full, disabled or discarded.
    #[must_use]
    pub fn dropped_packs(&self) -> u64 {
        self.dropped_packs.load(Ordering::Relaxed)
    }

    /// Entries contained in the dropped packs.
    #[must_use]
    pub fn dropped_entries(&self) -> u64 {
        self.dropped_entries.load(Ordering::Relaxed)
    }

    /// Counts a pack that will never be delivered.
    pub(crate) fn discard(&self, pack: &Batch, reason: &str) {
        self.count_drop(pack);
        warn!(
            "HTTP_WRITER | Dropping batch of {} entries: {}",
            pack.entries(),
            reason
        );
    }

    fn count_drop(&self, pack: &Batch) {
        self.dropped_packs.fetch_add(1, Ordering::Relaxed);
        self.dropped_entries
            .fetch_add(pack.entries() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn pack(body: &'static [u8], entries: usize) -> Batch {
        Batch::new(Bytes::from_static(body), entries)
    }

    #[test]
    fn test_push_pop_fifo() {
        let buffer = DeferredBuffer::new(4);
        assert!(buffer.push(pack(b"[1]", 1)));
        assert!(buffer.push(pack(b"[2,3]", 2)));
        assert_eq!(buffer.len(), 2);

        assert_eq!(&buffer.pop().unwrap().body()[..], b"[1]");
        assert_eq!(&buffer.pop().unwrap().body()[..], b"[2,3]");
        assert!(buffer.pop().is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_full_buffer_rejects_newest() {
        let buffer = DeferredBuffer::new(1);
        assert!(buffer.push(pack(b"[old]", 1)));
        assert!(!buffer.push(pack(b"[a,b,c]", 3)));

        assert_eq!(buffer.dropped_packs(), 1);
        assert_eq!(buffer.dropped_entries(), 3);
        assert_eq!(&buffer.pop().unwrap().body()[..], b"[old]");
    }

    #[test]
    fn test_zero_capacity_drops_everything() {
        let buffer = DeferredBuffer::new(0);
        assert_eq!(buffer.capacity(), 0);
        assert!(!buffer.push(pack(b"[1]", 1)));
        assert!(buffer.pop().is_none());
        assert_eq!(buffer.dropped_packs(), 1);
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_discard_all() {
        let buffer = DeferredBuffer::new(8);
        buffer.push(pack(b"[1]", 1));
        buffer.push(pack(b"[2,3]", 2));

        assert_eq!(buffer.discard_all(), 2);
        assert!(buffer.is_empty());
        assert_eq!(buffer.dropped_packs(), 2);
        assert_eq!(buffer.dropped_entries(), 3);
    }
}
