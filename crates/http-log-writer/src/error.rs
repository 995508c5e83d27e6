// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;
use std::io;

/// Errors returned to a producer by [`crate::HttpLogWriter::write`] and
/// by the lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriterError {
    /// The handle does not point to a live writer.
    #[error("writer is not initialized")]
    NotInitialized,

    /// The writer was stopped and will never accept entries again.
    #[error("writer is disabled")]
    Disabled,

    /// The entry queue is full; the entry was dropped and counted as lost.
    #[error("writer's buffer is full")]
    BufferFull,

    /// The writer cannot start with the given configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl From<WriterError> for io::Error {
    fn from(err: WriterError) -> Self {
        let kind = match err {
            WriterError::NotInitialized => io::ErrorKind::NotConnected,
            WriterError::Disabled => io::ErrorKind::BrokenPipe,
            WriterError::BufferFull => io::ErrorKind::WouldBlock,
            WriterError::Configuration(_) => io::ErrorKind::InvalidInput,
        };
        io::Error::new(kind, err)
    }
}

/// A failed delivery attempt. Handled inside the worker pool and never
/// surfaced to the producer.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Connection, timeout or body transfer failure.
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered with a status worth retrying later.
    #[error("endpoint responded with retryable status {0}")]
    Retryable(StatusCode),

    /// The endpoint refused the payload; retrying would not help.
    #[error("endpoint rejected payload with status {0}")]
    Rejected(StatusCode),

    /// The request could not be built from the provider configuration.
    #[error("failed to build request: {0}")]
    Request(String),
}

impl SendError {
    /// Classifies a non-success response status.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            SendError::Retryable(status)
        } else {
            SendError::Rejected(status)
        }
    }

    /// Whether the batch should be parked in the deferred buffer.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::Network(_) | SendError::Retryable(_))
    }
}

impl From<reqwest::Error> for SendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            SendError::Request(err.to_string())
        } else {
            SendError::Network(err.to_string())
        }
    }
}
