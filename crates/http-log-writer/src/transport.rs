// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transport client: one request per flushed batch.

use crate::error::SendError;
use crate::http::get_client;
use crate::provider::Provider;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_ENCODING};
use reqwest::Method;
use std::time::{Duration, Instant};
use tracing::{debug, error};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers one assembled batch. A worker awaits this before touching its
    /// next batch, so a worker never has two sends in flight.
    async fn send(&self, batch: Bytes) -> Result<(), SendError>;

    /// Checks that the endpoint is reachable and accepts requests.
    async fn ping(&self) -> Result<(), SendError>;
}

/// [`Transport`] posting batches to a [`Provider`] over a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    provider: Provider,
    ping_body: Bytes,
}

impl HttpTransport {
    /// `ping_body` is what [`Transport::ping`] posts, usually an empty batch.
    #[must_use]
    pub fn new(
        provider: Provider,
        ping_body: Bytes,
        timeout: Duration,
        https_proxy: Option<&str>,
    ) -> Self {
        HttpTransport {
            client: get_client(timeout, https_proxy),
            provider,
            ping_body,
        }
    }

    fn create_request(&self, batch: Bytes) -> Result<reqwest::Request, SendError> {
        let mut request = reqwest::Request::new(Method::POST, self.provider.endpoint().clone());
        self.provider.decorate(&mut request);

        let mut body = self.provider.transform_body(batch);
        if let Some(level) = self.provider.compression_level() {
            match zstd::bulk::compress(&body, level) {
                Ok(compressed) => {
                    body = Bytes::from(compressed);
                    request
                        .headers_mut()
                        .insert(CONTENT_ENCODING, HeaderValue::from_static("zstd"));
                }
                Err(e) => debug!("HTTP_WRITER | Failed to compress data: {}", e),
            }
        }
        *request.body_mut() = Some(reqwest::Body::from(body));
        Ok(request)
    }

    async fn execute(&self, batch: Bytes) -> Result<(), SendError> {
        let request = self.create_request(batch)?;
        let time = Instant::now();
        let resp = self.client.execute(request).await;
        let elapsed = time.elapsed();

        match resp {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    debug!(
                        "HTTP_WRITER | Request accepted with {} after {} ms",
                        status,
                        elapsed.as_millis()
                    );
                    return Ok(());
                }
                let err = SendError::from_status(status);
                if !err.is_retryable() {
                    error!(
                        "HTTP_WRITER | Request was rejected with {}: {:?}",
                        status,
                        resp.text().await.unwrap_or_default()
                    );
                }
                Err(err)
            }
            Err(e) => {
                debug!(
                    "HTTP_WRITER | Request failed after {} ms: {:?}",
                    elapsed.as_millis(),
                    e
                );
                Err(SendError::from(e))
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, batch: Bytes) -> Result<(), SendError> {
        self.execute(batch).await
    }

    async fn ping(&self) -> Result<(), SendError> {
        self.execute(self.ping_body.clone()).await
    }
}
