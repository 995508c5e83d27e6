// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Worker pool.
//!
//! Each worker owns one [`BatchAssembler`] and waits on three things at
//! once: the next entry, the flush deadline of its in-progress batch and
//! the shutdown signal. A periodic tick additionally retries deferred
//! batches so delivery resumes even when no new entries arrive.
//!
//! ```text
//!   ┌──────────── select ────────────┐
//!   │ cancelled   deadline   entry   │ retry tick
//!   └─────┬──────────┬─────────┬─────┘     │
//!         │          │         │           │
//!   final flush    flush    push, flush    retry up to quota
//!   + exit                  when full      deferred batches
//! ```

use crate::batch::{Batch, BatchAssembler};
use crate::config::Framing;
use crate::deferred::DeferredBuffer;
use crate::queue::EntryReceiver;
use crate::transport::Transport;
use crate::writer::LifecycleState;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// State shared by the writer handle and all of its workers.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: AtomicU8,
    pub(crate) deferred: DeferredBuffer,
    /// Level-triggered shutdown signal observed by every worker.
    pub(crate) cancel_token: CancellationToken,
    /// Cancelled once the writer is at rest: every worker has exited, or
    /// no worker was ever started.
    pub(crate) stopped: CancellationToken,
    pub(crate) pinged: AtomicBool,
    auto_ping: OnceCell<()>,
    /// Producers between their state check and their push.
    submitting: AtomicUsize,
}

/// Marks one producer as in flight until dropped.
pub(crate) struct SubmitGuard<'a>(&'a AtomicUsize);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Shared {
    pub(crate) fn new(deferred_capacity: usize, cancel_token: CancellationToken) -> Self {
        Shared {
            state: AtomicU8::new(LifecycleState::Unconfigured as u8),
            deferred: DeferredBuffer::new(deferred_capacity),
            cancel_token,
            stopped: CancellationToken::new(),
            pinged: AtomicBool::new(false),
            auto_ping: OnceCell::new(),
            submitting: AtomicUsize::new(0),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        LifecycleState::from(self.state.load(Ordering::SeqCst))
    }

    // SeqCst pairs the state with `submitting`: a producer registered before
    // the move to `Disabled` is waited for, a later one sees `Disabled`.
    pub(crate) fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Registers a producer about to push. The caller must check the state
    /// again after this, while holding the guard.
    pub(crate) fn begin_submit(&self) -> SubmitGuard<'_> {
        self.submitting.fetch_add(1, Ordering::SeqCst);
        SubmitGuard(&self.submitting)
    }

    pub(crate) fn submitters(&self) -> usize {
        self.submitting.load(Ordering::SeqCst)
    }

    /// Waits out producers that passed the state check before `Disabled`.
    /// Pushes never block, so this is short.
    async fn wait_for_submitters(&self) {
        while self.submitters() > 0 {
            tokio::task::yield_now().await;
        }
    }

    /// Moves to `Disabled` from whatever state the writer is in and returns
    /// the state it left.
    pub(crate) fn disable(&self) -> LifecycleState {
        loop {
            let current = self.state();
            if current == LifecycleState::Disabled || self.transition(current, LifecycleState::Disabled)
            {
                return current;
            }
        }
    }

    /// Pings once before the first real send, unless a manual ping already
    /// succeeded. A failed ping is only reported.
    async fn ensure_pinged(&self, transport: &dyn Transport) {
        self.auto_ping
            .get_or_init(|| async {
                if self.pinged.load(Ordering::Acquire) {
                    return;
                }
                match transport.ping().await {
                    Ok(()) => {
                        self.pinged.store(true, Ordering::Release);
                        debug!("HTTP_WRITER | Ping succeeded");
                    }
                    Err(e) => warn!(
                        "HTTP_WRITER | Ping failed: {}, undelivered batches will be deferred",
                        e
                    ),
                }
            })
            .await;
    }
}

/// Per-worker tunables, copied from the writer configuration.
#[derive(Debug, Clone)]
pub(crate) struct WorkerSettings {
    pub(crate) framing: Framing,
    pub(crate) batch_capacity: usize,
    pub(crate) flush_delay: Duration,
    pub(crate) deferred_per_iteration: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Empty,
    Sent,
    Deferred,
    Rejected,
}

pub(crate) struct Worker {
    id: usize,
    entries: EntryReceiver,
    assembler: BatchAssembler,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    flush_delay: Duration,
    deferred_per_iteration: usize,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        entries: EntryReceiver,
        transport: Arc<dyn Transport>,
        shared: Arc<Shared>,
        settings: &WorkerSettings,
    ) -> Self {
        Worker {
            id,
            entries,
            assembler: BatchAssembler::new(settings.framing.clone(), settings.batch_capacity),
            transport,
            shared,
            flush_delay: settings.flush_delay,
            deferred_per_iteration: settings.deferred_per_iteration,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("HTTP_WRITER | Worker {} started", self.id);

        let cancel_token = self.shared.cancel_token.clone();
        let mut deadline: Option<Instant> = None;
        let mut retry_interval = interval(self.flush_delay);
        retry_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        retry_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                biased;
                () = cancel_token.cancelled() => break,
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    self.flush_and_retry().await;
                }
                entry = self.entries.recv_async() => {
                    let Ok(entry) = entry else {
                        debug!("HTTP_WRITER | Worker {}: entry queue closed", self.id);
                        break;
                    };
                    if self.assembler.is_empty() {
                        deadline = Some(Instant::now() + self.flush_delay);
                    }
                    if self.assembler.push(&entry) {
                        deadline = None;
                        self.flush_and_retry().await;
                    }
                }
                _ = retry_interval.tick() => {
                    if !self.shared.deferred.is_empty() {
                        self.retry_deferred().await;
                    }
                }
            }
        }

        self.shutdown().await;
        debug!("HTTP_WRITER | Worker {} stopped", self.id);
    }

    /// Flushes the in-progress batch and, if the endpoint took it, retries
    /// deferred batches while it is known to be healthy.
    async fn flush_and_retry(&mut self) {
        if self.flush().await == Delivery::Sent {
            self.retry_deferred().await;
        }
    }

    async fn flush(&mut self) -> Delivery {
        match self.assembler.take() {
            Some(batch) => self.deliver(batch).await,
            None => Delivery::Empty,
        }
    }

    /// Retries at most `deferred_per_iteration` deferred batches, stopping
    /// at the first one that fails again.
    async fn retry_deferred(&self) {
        for _ in 0..self.deferred_per_iteration {
            let Some(pack) = self.shared.deferred.pop() else {
                break;
            };
            debug!(
                "HTTP_WRITER | Worker {}: retrying deferred batch of {} entries",
                self.id,
                pack.entries()
            );
            if self.deliver(pack).await != Delivery::Sent {
                break;
            }
        }
    }

    async fn deliver(&self, batch: Batch) -> Delivery {
        self.shared.ensure_pinged(self.transport.as_ref()).await;

        match self.transport.send(batch.body().clone()).await {
            Ok(()) => {
                debug!(
                    "HTTP_WRITER | Worker {}: flushed {} entries",
                    self.id,
                    batch.entries()
                );
                Delivery::Sent
            }
            Err(e) if e.is_retryable() => {
                debug!(
                    "HTTP_WRITER | Worker {}: failed to send {} entries, will retry later: {}",
                    self.id,
                    batch.entries(),
                    e
                );
                self.shared.deferred.push(batch);
                Delivery::Deferred
            }
            Err(e) => {
                error!(
                    "HTTP_WRITER | Worker {}: dropping {} entries: {}",
                    self.id,
                    batch.entries(),
                    e
                );
                self.shared.deferred.discard(&batch, "rejected by the endpoint");
                Delivery::Rejected
            }
        }
    }

    /// Final pass: ships what is still queued or in progress, then gives
    /// the deferred buffer one more bounded attempt.
    async fn shutdown(&mut self) {
        while let Ok(entry) = self.entries.try_recv() {
            if self.assembler.push(&entry) {
                self.flush().await;
            }
        }
        self.flush().await;
        self.retry_deferred().await;
    }
}

/// Waits for every worker, then ships entries pushed while they were
/// exiting, discards what could not be delivered and marks the writer as
/// stopped. `closer` is a worker that never ran.
pub(crate) async fn supervise(workers: tokio_util::task::TaskTracker, mut closer: Worker) {
    workers.wait().await;

    let shared = Arc::clone(&closer.shared);
    shared.disable();
    shared.wait_for_submitters().await;
    if !closer.entries.is_empty() {
        debug!(
            "HTTP_WRITER | {} entries arrived during shutdown",
            closer.entries.len()
        );
    }
    closer.shutdown().await;

    let discarded = shared.deferred.discard_all();
    if discarded > 0 {
        warn!(
            "HTTP_WRITER | Discarded {} undelivered batches on shutdown",
            discarded
        );
    }
    shared.stopped.cancel();
    debug!("HTTP_WRITER | All workers stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::SendError;
    use crate::queue::{channel, EntrySender};
    use async_trait::async_trait;
    use bytes::Bytes;
    use reqwest::StatusCode;
    use std::sync::Mutex;

    /// Fails the first `failures` sends with `error`, then succeeds.
    struct ScriptedTransport {
        sent: Mutex<Vec<Bytes>>,
        attempts: Mutex<usize>,
        failures: usize,
        error: fn() -> SendError,
    }

    impl ScriptedTransport {
        fn new(failures: usize, error: fn() -> SendError) -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                attempts: Mutex::new(0),
                failures,
                error,
            })
        }

        fn sent(&self) -> Vec<Bytes> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, batch: Bytes) -> Result<(), SendError> {
            let attempt = {
                let mut attempts = self.attempts.lock().unwrap();
                *attempts += 1;
                *attempts
            };
            if attempt <= self.failures {
                return Err((self.error)());
            }
            self.sent.lock().unwrap().push(batch);
            Ok(())
        }

        async fn ping(&self) -> Result<(), SendError> {
            Ok(())
        }
    }

    fn unavailable() -> SendError {
        SendError::Retryable(StatusCode::SERVICE_UNAVAILABLE)
    }

    fn forbidden() -> SendError {
        SendError::Rejected(StatusCode::FORBIDDEN)
    }

    fn worker(
        transport: Arc<ScriptedTransport>,
        batch_capacity: usize,
        deferred_capacity: usize,
    ) -> (Worker, EntrySender, Arc<Shared>) {
        let (tx, rx) = channel(256);
        let shared = Arc::new(Shared::new(deferred_capacity, CancellationToken::new()));
        let settings = WorkerSettings {
            framing: Framing::json_array(),
            batch_capacity,
            flush_delay: Duration::from_secs(3600),
            deferred_per_iteration: 8,
        };
        let worker = Worker::new(0, rx, transport, Arc::clone(&shared), &settings);
        (worker, tx, shared)
    }

    #[tokio::test]
    async fn test_failed_batch_is_deferred_unchanged() {
        let transport = ScriptedTransport::new(1, unavailable);
        let (mut worker, _tx, shared) = worker(Arc::clone(&transport), 10, 4);

        worker.assembler.push(b"1");
        worker.assembler.push(b"2");
        assert_eq!(worker.flush().await, Delivery::Deferred);
        assert_eq!(shared.deferred.len(), 1);

        worker.retry_deferred().await;
        assert!(shared.deferred.is_empty());
        assert_eq!(transport.sent(), vec![Bytes::from_static(b"[1,2]")]);
    }

    #[tokio::test]
    async fn test_rejected_batch_is_dropped() {
        let transport = ScriptedTransport::new(1, forbidden);
        let (mut worker, _tx, shared) = worker(Arc::clone(&transport), 10, 4);

        worker.assembler.push(b"1");
        assert_eq!(worker.flush().await, Delivery::Rejected);
        assert!(shared.deferred.is_empty());
        assert_eq!(shared.deferred.dropped_packs(), 1);
        assert_eq!(shared.deferred.dropped_entries(), 1);
    }

    #[tokio::test]
    async fn test_retry_stops_at_first_failure() {
        let transport = ScriptedTransport::new(usize::MAX, unavailable);
        let (worker, _tx, shared) = worker(Arc::clone(&transport), 10, 4);
        shared
            .deferred
            .push(Batch::new(Bytes::from_static(b"[1]"), 1));
        shared
            .deferred
            .push(Batch::new(Bytes::from_static(b"[2]"), 1));

        worker.retry_deferred().await;

        assert_eq!(*transport.attempts.lock().unwrap(), 1);
        assert_eq!(shared.deferred.len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue_and_batch() {
        let transport = ScriptedTransport::new(0, unavailable);
        let (worker, tx, shared) = worker(Arc::clone(&transport), 2, 4);
        for entry in ["a", "b", "c"] {
            tx.push(Bytes::from(entry));
        }

        shared.cancel_token.cancel();
        worker.run().await;

        assert_eq!(
            transport.sent(),
            vec![Bytes::from_static(b"[a,b]"), Bytes::from_static(b"[c]")]
        );
    }

    #[tokio::test]
    async fn test_worker_exits_when_queue_closes() {
        let transport = ScriptedTransport::new(0, unavailable);
        let (worker, tx, _shared) = worker(Arc::clone(&transport), 10, 4);
        tx.push(Bytes::from_static(b"x"));
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), worker.run())
            .await
            .expect("worker did not stop after the queue closed");

        assert_eq!(transport.sent(), vec![Bytes::from_static(b"[x]")]);
    }

    #[tokio::test]
    async fn test_supervisor_ships_entries_left_by_exited_workers() {
        let transport = ScriptedTransport::new(0, unavailable);
        let (closer, tx, shared) = worker(Arc::clone(&transport), 10, 4);
        shared.transition(LifecycleState::Unconfigured, LifecycleState::Running);
        // Pushed after every worker finished draining.
        tx.push(Bytes::from_static(b"late"));

        let workers = tokio_util::task::TaskTracker::new();
        workers.close();
        supervise(workers, closer).await;

        assert_eq!(transport.sent(), vec![Bytes::from_static(b"[late]")]);
        assert_eq!(shared.state(), LifecycleState::Disabled);
        assert!(shared.stopped.is_cancelled());
        assert!(tx.is_empty());
    }

    #[tokio::test]
    async fn test_supervisor_waits_for_in_flight_producers() {
        let transport = ScriptedTransport::new(0, unavailable);
        let (closer, tx, shared) = worker(Arc::clone(&transport), 10, 4);
        shared.transition(LifecycleState::Unconfigured, LifecycleState::Running);
        let guard = shared.begin_submit();

        let workers = tokio_util::task::TaskTracker::new();
        workers.close();
        let supervisor = tokio::spawn(supervise(workers, closer));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!supervisor.is_finished());
        assert_eq!(shared.state(), LifecycleState::Disabled);

        tx.push(Bytes::from_static(b"x"));
        drop(guard);
        supervisor.await.unwrap();

        assert_eq!(transport.sent(), vec![Bytes::from_static(b"[x]")]);
        assert_eq!(shared.submitters(), 0);
    }

    #[test]
    fn test_disable_from_any_state() {
        let shared = Shared::new(0, CancellationToken::new());
        assert_eq!(shared.disable(), LifecycleState::Unconfigured);
        assert_eq!(shared.state(), LifecycleState::Disabled);
        assert_eq!(shared.disable(), LifecycleState::Disabled);
        assert!(!shared.transition(LifecycleState::Disabled, LifecycleState::Running));
    }
}
