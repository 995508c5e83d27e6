// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Entry queue shared by producers and workers.

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Outcome of a non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Accepted,
    /// The queue is at capacity; the entry was dropped and counted.
    Full,
    /// Every worker has exited.
    Closed,
}

/// Producer side: bounded, never blocks, counts what it drops.
#[derive(Debug, Clone)]
pub struct EntrySender {
    tx: flume::Sender<Bytes>,
    lost: Arc<AtomicU64>,
}

/// Consumer side, cloned into every worker.
pub type EntryReceiver = flume::Receiver<Bytes>;

#[must_use]
pub fn channel(capacity: usize) -> (EntrySender, EntryReceiver) {
    let (tx, rx) = flume::bounded(capacity);
    let sender = EntrySender {
        tx,
        lost: Arc::new(AtomicU64::new(0)),
    };
    (sender, rx)
}

impl EntrySender {
    pub fn push(&self, entry: Bytes) -> Push {
        match self.tx.try_send(entry) {
            Ok(()) => Push::Accepted,
            Err(flume::TrySendError::Full(_)) => {
                self.lost.fetch_add(1, Ordering::Relaxed);
                Push::Full
            }
            Err(flume::TrySendError::Disconnected(_)) => Push::Closed,
        }
    }

    /// Counts entries that were queued but will never reach a worker.
    pub fn record_lost(&self, entries: u64) {
        self.lost.fetch_add(entries, Ordering::Relaxed);
    }

    /// Entries dropped because the queue was full or discarded after a
    /// failed start. Never reset.
    #[must_use]
    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_until_full() {
        let (tx, rx) = channel(2);

        assert_eq!(tx.push(Bytes::from_static(b"a")), Push::Accepted);
        assert_eq!(tx.push(Bytes::from_static(b"b")), Push::Accepted);
        assert_eq!(tx.push(Bytes::from_static(b"c")), Push::Full);
        assert_eq!(tx.push(Bytes::from_static(b"d")), Push::Full);
        assert_eq!(tx.lost(), 2);
        assert_eq!(tx.len(), 2);

        assert_eq!(&rx.try_recv().unwrap()[..], b"a");
        assert_eq!(tx.push(Bytes::from_static(b"e")), Push::Accepted);
        assert_eq!(tx.lost(), 2);

        tx.record_lost(3);
        assert_eq!(tx.lost(), 5);
    }

    #[test]
    fn test_push_after_receivers_dropped() {
        let (tx, rx) = channel(4);
        drop(rx);
        assert_eq!(tx.push(Bytes::from_static(b"a")), Push::Closed);
        assert_eq!(tx.lost(), 0);
    }

    #[tokio::test]
    async fn test_each_entry_consumed_once() {
        let (tx, rx) = channel(16);
        let other = rx.clone();
        for i in 0..10u8 {
            assert_eq!(tx.push(Bytes::from(vec![i])), Push::Accepted);
        }

        let mut seen = Vec::new();
        while let Ok(entry) = rx.try_recv() {
            seen.push(entry[0]);
            if let Ok(entry) = other.recv_async().await {
                seen.push(entry[0]);
            }
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }
}
