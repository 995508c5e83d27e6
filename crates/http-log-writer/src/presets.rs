// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ready-made provider and framing configurations for known log intakes.

use crate::config::Framing;
use crate::error::WriterError;
use crate::provider::Provider;
use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use zstd::zstd_safe::CompressionLevel;

pub const DATADOG_ADDR_US: &str = "https://http-intake.logs.datadoghq.com/v1/input";
pub const DATADOG_ADDR_EU: &str = "https://http-intake.logs.datadoghq.eu/v1/input";
pub const ROLLBAR_ADDR: &str = "https://api.rollbar.com/api/1/items/";

const DD_API_KEY_HEADER: &str = "DD-API-KEY";
const APPLICATION_JSON: &str = "application/json";

/// Datadog HTTP log intake at `addr` (see [`DATADOG_ADDR_US`],
/// [`DATADOG_ADDR_EU`]) authenticated with `api_key`.
pub fn datadog(addr: &str, api_key: &str) -> Result<(Provider, Framing), WriterError> {
    let api_key = header_value("API key", api_key)?;
    let provider = Provider::manual(addr, move |req| {
        let headers = req.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(DD_API_KEY_HEADER, api_key.clone());
    })?;
    Ok((provider, Framing::json_array()))
}

/// Datadog v2 logs API for `site` (e.g. `datadoghq.com`), optionally
/// compressing payloads with zstd.
pub fn datadog_v2(
    site: &str,
    api_key: &str,
    compression_level: Option<CompressionLevel>,
) -> Result<(Provider, Framing), WriterError> {
    let site = site.trim().trim_end_matches('/');
    if site.is_empty() {
        return Err(WriterError::Configuration(
            "Datadog site cannot be empty".to_string(),
        ));
    }
    let addr = format!("https://http-intake.logs.{site}/api/v2/logs");
    let (mut provider, framing) = datadog(&addr, api_key)?;
    if let Some(level) = compression_level {
        provider = provider.with_zstd_compression(level);
    }
    Ok((provider, framing))
}

/// Rollbar items API. Batches are sent as
/// `{"access_token":"<token>","data":[...]}`.
pub fn rollbar(access_token: &str) -> Result<(Provider, Framing), WriterError> {
    let token = serde_json::to_string(access_token)
        .map_err(|e| WriterError::Configuration(format!("invalid Rollbar token: {e}")))?;
    let body_start = Bytes::from(format!("{{\"access_token\":{token},\"data\":"));
    let body_end = Bytes::from_static(b"}");

    let provider = Provider::manual(ROLLBAR_ADDR, |req| {
        req.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    })?
    .with_body_transform(move |body| {
        let mut wrapped = Vec::with_capacity(body_start.len() + body.len() + body_end.len());
        wrapped.extend_from_slice(&body_start);
        wrapped.extend_from_slice(&body);
        wrapped.extend_from_slice(&body_end);
        Bytes::from(wrapped)
    });
    Ok((provider, Framing::json_array()))
}

/// Any intake accepting a JSON array of records at `addr`.
pub fn json(addr: &str) -> Result<(Provider, Framing), WriterError> {
    let provider = Provider::manual(addr, |req| {
        req.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    })?;
    Ok((provider, Framing::json_array()))
}

fn header_value(what: &str, value: &str) -> Result<HeaderValue, WriterError> {
    HeaderValue::from_str(value)
        .map_err(|e| WriterError::Configuration(format!("invalid {what}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn decorated(provider: &Provider) -> reqwest::Request {
        let mut request = reqwest::Request::new(Method::POST, provider.endpoint().clone());
        provider.decorate(&mut request);
        request
    }

    #[test]
    fn test_datadog_preset() {
        let (provider, framing) = datadog(DATADOG_ADDR_EU, "mock-api-key").unwrap();
        let request = decorated(&provider);

        assert_eq!(request.url().as_str(), DATADOG_ADDR_EU);
        assert_eq!(request.headers().get("DD-API-KEY").unwrap(), "mock-api-key");
        assert_eq!(
            request.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(framing, Framing::json_array());
        assert!(provider.compression_level().is_none());
    }

    #[test]
    fn test_datadog_rejects_invalid_api_key() {
        assert!(matches!(
            datadog(DATADOG_ADDR_US, "bad\nkey"),
            Err(WriterError::Configuration(_))
        ));
    }

    #[test]
    fn test_datadog_v2_preset() {
        let (provider, _) = datadog_v2("datadoghq.eu", "key", Some(3)).unwrap();
        assert_eq!(
            provider.endpoint().as_str(),
            "https://http-intake.logs.datadoghq.eu/api/v2/logs"
        );
        assert_eq!(provider.compression_level(), Some(3));

        assert!(datadog_v2("  ", "key", None).is_err());
    }

    #[test]
    fn test_json_preset() {
        let (provider, framing) = json("http://localhost:8080/logs").unwrap();
        let request = decorated(&provider);
        assert_eq!(request.headers().get(CONTENT_TYPE).unwrap(), APPLICATION_JSON);
        assert_eq!(framing, Framing::json_array());
    }

    #[test]
    fn test_rollbar_preset_wraps_body() {
        let (provider, framing) = rollbar("tok\"en").unwrap();
        let request = decorated(&provider);
        assert_eq!(request.url().as_str(), ROLLBAR_ADDR);

        let body = provider.transform_body(Bytes::from_static(br#"[{"a":1}]"#));
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["access_token"], "tok\"en");
        assert_eq!(parsed["data"][0]["a"], 1);
        assert_eq!(framing, Framing::json_array());
    }
}
