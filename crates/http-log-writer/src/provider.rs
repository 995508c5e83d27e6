// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Provider configuration: the remote endpoint and its request-shaping hooks.

use crate::error::WriterError;
use bytes::Bytes;
use reqwest::Url;
use std::fmt::Debug;
use std::sync::Arc;
use zstd::zstd_safe::CompressionLevel;

/// Mutates the outgoing request (URI, headers, auth) right before it is sent.
pub type RequestDecorator = Arc<dyn Fn(&mut reqwest::Request) + Send + Sync>;

/// Rewrites an assembled batch into the body actually sent. The input is
/// owned by the hook; the batch kept for retries is not affected.
pub type BodyTransform = Arc<dyn Fn(Bytes) -> Bytes + Send + Sync>;

#[derive(Clone)]
pub struct Provider {
    endpoint: Url,
    decorator: RequestDecorator,
    body_transform: Option<BodyTransform>,
    compression_level: Option<CompressionLevel>,
}

impl Provider {
    /// A provider posting batches to `endpoint`, shaped by `decorator`.
    pub fn manual(
        endpoint: &str,
        decorator: impl Fn(&mut reqwest::Request) + Send + Sync + 'static,
    ) -> Result<Self, WriterError> {
        Ok(Self {
            endpoint: parse_endpoint(endpoint)?,
            decorator: Arc::new(decorator),
            body_transform: None,
            compression_level: None,
        })
    }

    /// Keeps every hook but sends to `endpoint` instead, e.g. a preset
    /// routed through a relay.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, WriterError> {
        self.endpoint = parse_endpoint(endpoint)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_body_transform(
        mut self,
        transform: impl Fn(Bytes) -> Bytes + Send + Sync + 'static,
    ) -> Self {
        self.body_transform = Some(Arc::new(transform));
        self
    }

    /// Compresses every body with zstd and sets `Content-Encoding: zstd`.
    #[must_use]
    pub fn with_zstd_compression(mut self, level: CompressionLevel) -> Self {
        self.compression_level = Some(level);
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub(crate) fn decorate(&self, request: &mut reqwest::Request) {
        (self.decorator)(request);
    }

    pub(crate) fn transform_body(&self, body: Bytes) -> Bytes {
        match &self.body_transform {
            Some(transform) => transform(body),
            None => body,
        }
    }

    pub(crate) fn compression_level(&self) -> Option<CompressionLevel> {
        self.compression_level
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, WriterError> {
    Url::parse(endpoint).map_err(|e| {
        WriterError::Configuration(format!("invalid provider endpoint '{endpoint}': {e}"))
    })
}

impl Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("endpoint", &self.endpoint.as_str())
            .field("body_transform", &self.body_transform.is_some())
            .field("compression_level", &self.compression_level)
            .finish_non_exhaustive()
    }
}
