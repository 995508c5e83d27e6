// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Writer configuration.
//!
//! Every tunable is an `Option`: `None` selects the default, `Some` is
//! validated against the allowed range when the writer starts. The whole
//! configuration is moved into the writer on construction, so it can no
//! longer change once the writer leaves the unconfigured state.

use crate::error::WriterError;
use crate::provider::Provider;
use bytes::Bytes;
use std::ops::RangeInclusive;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub const DEFAULT_ENTRIES_CAPACITY: usize = 4_096;
pub const ENTRIES_CAPACITY_RANGE: RangeInclusive<usize> = (1 << 8)..=(1 << 20);

pub const DEFAULT_BATCH_CAPACITY: usize = 32;
pub const BATCH_CAPACITY_RANGE: RangeInclusive<usize> = 1..=16_384;

pub const DEFAULT_WORKERS: usize = 2;
pub const WORKERS_RANGE: RangeInclusive<usize> = 1..=32;

pub const DEFAULT_FLUSH_DELAY: Duration = Duration::from_secs(10);
pub const MIN_FLUSH_DELAY: Duration = Duration::from_millis(100);
pub const MAX_FLUSH_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Zero disables the deferred buffer: failed batches are dropped at once.
pub const DEFAULT_DEFERRED_CAPACITY: usize = 16_384;
pub const DEFERRED_CAPACITY_RANGE: RangeInclusive<usize> = 0..=(1 << 23);

pub const DEFAULT_DEFERRED_PER_ITERATION: usize = 16;
pub const DEFERRED_PER_ITERATION_RANGE: RangeInclusive<usize> = 1..=1_024;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes placed around and between the entries of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Framing {
    /// Emitted once before the first entry.
    pub prefix: Bytes,
    /// Emitted once after the last entry.
    pub suffix: Bytes,
    /// Emitted between two consecutive entries.
    pub separator: Bytes,
}

impl Framing {
    pub fn new(
        prefix: impl Into<Bytes>,
        suffix: impl Into<Bytes>,
        separator: impl Into<Bytes>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
            separator: separator.into(),
        }
    }

    /// `[entry,entry,...]`, for providers accepting a JSON array of records.
    #[must_use]
    pub fn json_array() -> Self {
        Self::new("[", "]", ",")
    }

    /// Splits one sequence into prefix, suffix and separator of equal length.
    ///
    /// `"[],"` becomes `"["`, `"]"`, `","`. Returns `None` when the input is
    /// empty or its length is not a multiple of three.
    #[must_use]
    pub fn split(data: impl Into<Bytes>) -> Option<Self> {
        let data = data.into();
        if data.is_empty() || data.len() % 3 != 0 {
            return None;
        }
        let n = data.len() / 3;
        Some(Self {
            prefix: data.slice(..n),
            suffix: data.slice(n..2 * n),
            separator: data.slice(2 * n..),
        })
    }

    /// The body of a batch holding no entries.
    #[must_use]
    pub fn empty_batch(&self) -> Bytes {
        let mut body = Vec::with_capacity(self.prefix.len() + self.suffix.len());
        body.extend_from_slice(&self.prefix);
        body.extend_from_slice(&self.suffix);
        Bytes::from(body)
    }
}

/// External shutdown coordination. Both parts are optional and independent.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHooks {
    /// Cancelling this token stops the writer; every worker does a final flush.
    pub cancel_token: Option<CancellationToken>,
    /// Tracks the worker pool; `tracker.wait()` returns once every worker has
    /// exited. The writer never closes it, that is left to the owner.
    pub tracker: Option<TaskTracker>,
}

#[derive(Debug, Clone, Default)]
pub struct WriterConfig {
    /// Where and how batches are sent. Required.
    pub provider: Option<Provider>,
    pub framing: Framing,
    /// Capacity of the shared entry queue.
    pub entries_capacity: Option<usize>,
    /// Entries per batch before a worker flushes without waiting for the timer.
    pub batch_capacity: Option<usize>,
    pub workers: Option<usize>,
    /// Longest time an entry waits in a non-full batch.
    pub flush_delay: Option<Duration>,
    /// Failed batches kept for a later retry.
    pub deferred_capacity: Option<usize>,
    /// Deferred batches a worker retries in one go.
    pub deferred_per_iteration: Option<usize>,
    pub request_timeout: Option<Duration>,
    pub https_proxy: Option<String>,
    pub shutdown: ShutdownHooks,
    /// Runtime the workers are spawned on. Defaults to the runtime of the
    /// thread that starts the writer.
    pub runtime: Option<Handle>,
}

impl WriterConfig {
    #[must_use]
    pub fn entries_capacity(&self) -> usize {
        self.entries_capacity.unwrap_or(DEFAULT_ENTRIES_CAPACITY)
    }

    #[must_use]
    pub fn batch_capacity(&self) -> usize {
        self.batch_capacity.unwrap_or(DEFAULT_BATCH_CAPACITY)
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.unwrap_or(DEFAULT_WORKERS)
    }

    #[must_use]
    pub fn flush_delay(&self) -> Duration {
        self.flush_delay.unwrap_or(DEFAULT_FLUSH_DELAY)
    }

    #[must_use]
    pub fn deferred_capacity(&self) -> usize {
        self.deferred_capacity.unwrap_or(DEFAULT_DEFERRED_CAPACITY)
    }

    #[must_use]
    pub fn deferred_per_iteration(&self) -> usize {
        self.deferred_per_iteration
            .unwrap_or(DEFAULT_DEFERRED_PER_ITERATION)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Checks every explicitly set value against its allowed range.
    ///
    /// The provider is not checked here: a writer may be given its own
    /// transport, in which case no provider is needed.
    pub fn validate(&self) -> Result<(), WriterError> {
        check_range(
            "entries_capacity",
            self.entries_capacity,
            &ENTRIES_CAPACITY_RANGE,
        )?;
        check_range("batch_capacity", self.batch_capacity, &BATCH_CAPACITY_RANGE)?;
        check_range("workers", self.workers, &WORKERS_RANGE)?;
        check_range(
            "deferred_capacity",
            self.deferred_capacity,
            &DEFERRED_CAPACITY_RANGE,
        )?;
        check_range(
            "deferred_per_iteration",
            self.deferred_per_iteration,
            &DEFERRED_PER_ITERATION_RANGE,
        )?;

        if let Some(delay) = self.flush_delay {
            if !(MIN_FLUSH_DELAY..=MAX_FLUSH_DELAY).contains(&delay) {
                return Err(WriterError::Configuration(format!(
                    "flush_delay must be within [{MIN_FLUSH_DELAY:?}, {MAX_FLUSH_DELAY:?}], got {delay:?}"
                )));
            }
        }

        if self.request_timeout == Some(Duration::ZERO) {
            return Err(WriterError::Configuration(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_range(
    name: &str,
    value: Option<usize>,
    range: &RangeInclusive<usize>,
) -> Result<(), WriterError> {
    match value {
        Some(v) if !range.contains(&v) => Err(WriterError::Configuration(format!(
            "{name} must be within [{}, {}], got {v}",
            range.start(),
            range.end()
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WriterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.entries_capacity(), 4_096);
        assert_eq!(config.batch_capacity(), 32);
        assert_eq!(config.workers(), 2);
        assert_eq!(config.flush_delay(), Duration::from_secs(10));
        assert_eq!(config.deferred_capacity(), 16_384);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_out_of_range() {
        let invalid = [
            WriterConfig {
                entries_capacity: Some(255),
                ..Default::default()
            },
            WriterConfig {
                entries_capacity: Some((1 << 20) + 1),
                ..Default::default()
            },
            WriterConfig {
                batch_capacity: Some(0),
                ..Default::default()
            },
            WriterConfig {
                workers: Some(33),
                ..Default::default()
            },
            WriterConfig {
                deferred_capacity: Some((1 << 23) + 1),
                ..Default::default()
            },
            WriterConfig {
                deferred_per_iteration: Some(0),
                ..Default::default()
            },
            WriterConfig {
                flush_delay: Some(Duration::from_millis(99)),
                ..Default::default()
            },
            WriterConfig {
                flush_delay: Some(Duration::from_secs(24 * 60 * 60 + 1)),
                ..Default::default()
            },
            WriterConfig {
                request_timeout: Some(Duration::ZERO),
                ..Default::default()
            },
        ];

        for config in invalid {
            assert!(
                matches!(config.validate(), Err(WriterError::Configuration(_))),
                "expected {config:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_validate_bounds_inclusive() {
        let config = WriterConfig {
            entries_capacity: Some(256),
            batch_capacity: Some(16_384),
            workers: Some(1),
            deferred_capacity: Some(0),
            flush_delay: Some(MIN_FLUSH_DELAY),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_framing_split() {
        let framing = Framing::split("[],").unwrap();
        assert_eq!(framing, Framing::json_array());

        let framing = Framing::split("<<>>||").unwrap();
        assert_eq!(&framing.prefix[..], b"<<");
        assert_eq!(&framing.suffix[..], b">>");
        assert_eq!(&framing.separator[..], b"||");

        assert!(Framing::split("").is_none());
        assert!(Framing::split("[]").is_none());
    }

    #[test]
    fn test_framing_empty_batch() {
        assert_eq!(&Framing::json_array().empty_batch()[..], b"[]");
        assert!(Framing::default().empty_batch().is_empty());
    }
}
