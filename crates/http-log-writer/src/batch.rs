// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch assembly.
//!
//! A worker appends entries to one in-progress buffer laid out as
//!
//! ```text
//! prefix entry1 separator entry2 ... separator entryN suffix
//! ```
//!
//! and hands the finished buffer out as a [`Batch`] once it holds
//! `capacity` entries or when the worker decides to flush early.

use crate::config::Framing;
use bytes::{BufMut, Bytes, BytesMut};

/// A completed, framed batch. Cheap to clone; the body is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    body: Bytes,
    entries: usize,
}

impl Batch {
    #[must_use]
    pub fn new(body: Bytes, entries: usize) -> Self {
        Batch { body, entries }
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Number of entries framed into the body.
    #[must_use]
    pub fn entries(&self) -> usize {
        self.entries
    }
}

#[derive(Debug)]
pub struct BatchAssembler {
    framing: Framing,
    capacity: usize,
    buffer: BytesMut,
    entries: usize,
}

impl BatchAssembler {
    #[must_use]
    pub fn new(framing: Framing, capacity: usize) -> Self {
        BatchAssembler {
            framing,
            capacity: capacity.max(1),
            buffer: BytesMut::new(),
            entries: 0,
        }
    }

    /// Appends an entry. Returns `true` once the batch holds `capacity`
    /// entries and should be flushed.
    pub fn push(&mut self, entry: &[u8]) -> bool {
        if self.entries == 0 {
            self.buffer.put_slice(&self.framing.prefix);
        } else {
            self.buffer.put_slice(&self.framing.separator);
        }
        self.buffer.put_slice(entry);
        self.entries += 1;
        self.is_full()
    }

    /// Closes the batch with the suffix and resets the assembler.
    /// Returns `None` if no entry was added since the last flush.
    pub fn take(&mut self) -> Option<Batch> {
        if self.entries == 0 {
            return None;
        }
        self.buffer.put_slice(&self.framing.suffix);
        let entries = std::mem::take(&mut self.entries);
        let body = self.buffer.split().freeze();
        Some(Batch::new(body, entries))
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries >= self.capacity
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
    }
}
