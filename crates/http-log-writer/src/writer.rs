// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle controller and producer-facing writer.
//!
//! The writer starts on the first write (or an explicit [`HttpLogWriter::start`])
//! and moves through its states with compare-and-swap only:
//!
//! ```text
//!   Unconfigured ──► Initializing ──► Running ──► Disabled
//!        │                 │                         ▲
//!        └─────────────────┴─────────────────────────┘
//! ```
//!
//! `Disabled` is terminal. Writes are never blocked: they are queued,
//! rejected because the queue is full, or rejected because the writer is
//! not running.

use crate::config::{WriterConfig, DEFERRED_CAPACITY_RANGE};
use crate::error::{SendError, WriterError};
use crate::queue::{channel, EntryReceiver, EntrySender, Push};
use crate::transport::{HttpTransport, Transport};
use crate::worker::{supervise, Shared, Worker, WorkerSettings};
use bytes::Bytes;
use std::io;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    Unconfigured = 0,
    Initializing = 1,
    Running = 2,
    Disabled = 3,
}

impl From<u8> for LifecycleState {
    fn from(value: u8) -> Self {
        match value {
            0 => LifecycleState::Unconfigured,
            1 => LifecycleState::Initializing,
            2 => LifecycleState::Running,
            _ => LifecycleState::Disabled,
        }
    }
}

struct Inner {
    config: WriterConfig,
    sender: EntrySender,
    receiver: EntryReceiver,
    transport: Option<Arc<dyn Transport>>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inner")
            .field("config", &self.config)
            .field("sender", &self.sender)
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

/// Asynchronous batched HTTP log writer.
///
/// Dropping the writer closes the entry queue: workers ship what is already
/// queued and exit. Use [`HttpLogWriter::shutdown`] to wait for that.
#[derive(Debug)]
pub struct HttpLogWriter {
    inner: Arc<Inner>,
}

impl HttpLogWriter {
    /// Creates a writer sending through an HTTP client built from
    /// `config.provider`. Nothing is validated or spawned until it starts.
    #[must_use]
    pub fn new(config: WriterConfig) -> Self {
        let transport = config.provider.clone().map(|provider| {
            Arc::new(HttpTransport::new(
                provider,
                config.framing.empty_batch(),
                config.request_timeout(),
                config.https_proxy.as_deref(),
            )) as Arc<dyn Transport>
        });
        Self::build(config, transport)
    }

    /// Creates a writer sending through `transport`; `config.provider` is
    /// ignored.
    #[must_use]
    pub fn with_transport(config: WriterConfig, transport: Arc<dyn Transport>) -> Self {
        Self::build(config, Some(transport))
    }

    fn build(config: WriterConfig, transport: Option<Arc<dyn Transport>>) -> Self {
        let (sender, receiver) = channel(config.entries_capacity().max(1));
        // A child token: disabling the writer must not cancel the caller's token.
        let cancel_token = config
            .shutdown
            .cancel_token
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default();
        // Clamped so an out-of-range value fails validation instead of allocating.
        let deferred_capacity = config
            .deferred_capacity()
            .min(*DEFERRED_CAPACITY_RANGE.end());
        let shared = Arc::new(Shared::new(deferred_capacity, cancel_token));
        HttpLogWriter {
            inner: Arc::new(Inner {
                config,
                sender,
                receiver,
                transport,
                shared,
            }),
        }
    }

    /// Validates the configuration and spawns the worker pool.
    ///
    /// Returns `Ok` if the writer is already starting or running. A
    /// configuration error disables the writer for good.
    pub fn start(&self) -> Result<(), WriterError> {
        self.inner.start()
    }

    /// Queues one entry without blocking. Returns the number of bytes
    /// accepted; an empty entry is accepted as a no-op.
    pub fn write(&self, entry: &[u8]) -> Result<usize, WriterError> {
        if entry.is_empty() {
            return Ok(0);
        }
        self.inner.submit(Bytes::copy_from_slice(entry))
    }

    /// Like [`HttpLogWriter::write`], without copying an owned entry.
    pub fn write_bytes(&self, entry: Bytes) -> Result<usize, WriterError> {
        self.inner.submit(entry)
    }

    /// Sends an empty batch to check the endpoint. A successful manual ping
    /// replaces the one otherwise done before the first send.
    pub async fn ping(&self) -> Result<(), SendError> {
        let transport = self
            .inner
            .transport
            .as_ref()
            .ok_or_else(|| SendError::Request("provider is not set".to_string()))?;
        transport.ping().await?;
        self.inner.shared.pinged.store(true, Ordering::Release);
        Ok(())
    }

    /// Stops accepting entries and signals every worker to do its final
    /// flush. Returns immediately.
    pub fn disable(&self) {
        self.inner.disable();
    }

    /// [`HttpLogWriter::disable`], then waits until every worker has exited.
    pub async fn shutdown(&self) {
        self.inner.disable();
        self.inner.shared.stopped.cancelled().await;
    }

    /// A producer handle that does not keep the writer alive.
    #[must_use]
    pub fn handle(&self) -> WriterHandle {
        WriterHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.inner.shared.state()
    }

    /// Entries rejected because the queue was full, or queued before a
    /// failed start.
    #[must_use]
    pub fn lost_entries(&self) -> u64 {
        self.inner.sender.lost()
    }

    /// Batches that will never be delivered: rejected by the endpoint, not
    /// accepted by the deferred buffer, or discarded on shutdown.
    #[must_use]
    pub fn dropped_packs(&self) -> u64 {
        self.inner.shared.deferred.dropped_packs()
    }

    /// Batches currently waiting for a retry.
    #[must_use]
    pub fn deferred_len(&self) -> usize {
        self.inner.shared.deferred.len()
    }

    /// Entries waiting in the queue for a worker.
    #[must_use]
    pub fn queued_entries(&self) -> usize {
        self.inner.sender.len()
    }
}

impl Inner {
    fn start(&self) -> Result<(), WriterError> {
        let shared = &self.shared;
        if shared.transition(LifecycleState::Unconfigured, LifecycleState::Initializing) {
            return self.initialize();
        }
        match shared.state() {
            LifecycleState::Disabled => Err(WriterError::Disabled),
            _ => Ok(()),
        }
    }

    fn initialize(&self) -> Result<(), WriterError> {
        match self.spawn_workers() {
            Ok(workers) => {
                if self
                    .shared
                    .transition(LifecycleState::Initializing, LifecycleState::Running)
                {
                    info!("HTTP_WRITER | Started {} workers", workers);
                }
                Ok(())
            }
            Err(e) => {
                error!("HTTP_WRITER | Failed to start: {}", e);
                self.shared.disable();
                self.shared.cancel_token.cancel();
                // Producers that saw `Initializing` may have pushed already.
                while self.shared.submitters() > 0 {
                    std::thread::yield_now();
                }
                let discarded = self.receiver.drain().count();
                if discarded > 0 {
                    self.sender.record_lost(discarded as u64);
                }
                self.shared.stopped.cancel();
                Err(e)
            }
        }
    }

    fn spawn_workers(&self) -> Result<usize, WriterError> {
        let config = &self.config;
        config.validate()?;
        let transport = self
            .transport
            .clone()
            .ok_or_else(|| WriterError::Configuration("provider is not set".to_string()))?;
        let runtime = match &config.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|e| {
                WriterError::Configuration(format!("no Tokio runtime to spawn workers on: {e}"))
            })?,
        };

        let settings = WorkerSettings {
            framing: config.framing.clone(),
            batch_capacity: config.batch_capacity(),
            flush_delay: config.flush_delay(),
            deferred_per_iteration: config.deferred_per_iteration(),
        };
        let workers = config.workers();
        let tracker = TaskTracker::new();
        for id in 0..workers {
            let worker = Worker::new(
                id,
                self.receiver.clone(),
                Arc::clone(&transport),
                Arc::clone(&self.shared),
                &settings,
            );
            runtime.spawn(tracker.track_future(worker.run()));
        }
        tracker.close();

        let closer = Worker::new(
            workers,
            self.receiver.clone(),
            transport,
            Arc::clone(&self.shared),
            &settings,
        );
        let supervisor = supervise(tracker, closer);
        match &config.shutdown.tracker {
            Some(external) => runtime.spawn(external.track_future(supervisor)),
            None => runtime.spawn(supervisor),
        };
        Ok(workers)
    }

    fn submit(&self, entry: Bytes) -> Result<usize, WriterError> {
        if entry.is_empty() {
            return Ok(0);
        }
        if self.shared.state() == LifecycleState::Unconfigured {
            self.start()?;
        }
        // Held until the push is done; shutdown drains the queue only after
        // every registered producer has left.
        let _submitting = self.shared.begin_submit();
        if self.shared.state() == LifecycleState::Disabled || self.shared.cancel_token.is_cancelled()
        {
            return Err(WriterError::Disabled);
        }

        let len = entry.len();
        match self.sender.push(entry) {
            Push::Accepted => Ok(len),
            Push::Full => Err(WriterError::BufferFull),
            Push::Closed => Err(WriterError::Disabled),
        }
    }

    fn disable(&self) {
        let previous = self.shared.disable();
        self.shared.cancel_token.cancel();
        if previous == LifecycleState::Unconfigured {
            // No worker was ever spawned.
            self.shared.stopped.cancel();
        }
        if previous != LifecycleState::Disabled {
            debug!("HTTP_WRITER | Disabled");
        }
    }
}

/// Weak producer handle, see [`HttpLogWriter::handle`].
#[derive(Debug, Clone)]
pub struct WriterHandle {
    inner: Weak<Inner>,
}

impl WriterHandle {
    /// Fails with [`WriterError::NotInitialized`] once the writer is gone.
    pub fn write(&self, entry: &[u8]) -> Result<usize, WriterError> {
        let inner = self.inner.upgrade().ok_or(WriterError::NotInitialized)?;
        if entry.is_empty() {
            return Ok(0);
        }
        inner.submit(Bytes::copy_from_slice(entry))
    }
}

impl io::Write for &HttpLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        HttpLogWriter::write(self, buf).map_err(io::Error::from)
    }

    /// No-op: delivery is asynchronous, [`HttpLogWriter::shutdown`] is the
    /// point where queued entries are known to be flushed.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for HttpLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        HttpLogWriter::write(self, buf).map_err(io::Error::from)
    }

    /// No-op: delivery is asynchronous, [`HttpLogWriter::shutdown`] is the
    /// point where queued entries are known to be flushed.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for WriterHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        WriterHandle::write(self, buf).map_err(io::Error::from)
    }

    /// No-op: delivery is asynchronous, [`HttpLogWriter::shutdown`] is the
    /// point where queued entries are known to be flushed.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
