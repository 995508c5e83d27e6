// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Asynchronous, batching HTTP transport for pre-encoded log records.
//!
//! Producers hand opaque byte sequences to an [`HttpLogWriter`]; the writer
//! never blocks them. A pool of workers assembles the records into framed
//! batches and ships each batch with one HTTP request. Batches that fail to
//! deliver are parked in a bounded deferred buffer and retried later.
//!
//! ```text
//!   producer ──write()──> Entry Queue ──> Worker ──> Batch Assembler
//!                              (bounded)      │
//!                                             ├── ok ──────> Transport
//!                                             └── failure ─> Deferred Retry Buffer
//!                                                                 │
//!                                               (retried later) <─┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use http_log_writer::{presets, HttpLogWriter, WriterConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (provider, framing) = presets::datadog(presets::DATADOG_ADDR_US, "api-key")?;
//! let writer = HttpLogWriter::new(WriterConfig {
//!     provider: Some(provider),
//!     framing,
//!     ..Default::default()
//! });
//!
//! writer.write(br#"{"message":"hello"}"#)?;
//! writer.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod batch;
pub mod config;
pub mod deferred;
pub mod error;
pub mod http;
pub mod presets;
pub mod provider;
pub mod queue;
pub mod transport;
mod worker;
pub mod writer;

pub use config::{Framing, ShutdownHooks, WriterConfig};
pub use error::{SendError, WriterError};
pub use provider::{BodyTransform, Provider, RequestDecorator};
pub use transport::{HttpTransport, Transport};
pub use writer::{HttpLogWriter, LifecycleState, WriterHandle};
