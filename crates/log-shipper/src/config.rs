// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ShipperError;
use http_log_writer::{presets, Framing, Provider, ShutdownHooks, WriterConfig};
use std::env;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_SITE: &str = "datadoghq.com";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Log intake the shipper sends to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Datadog,
    Rollbar,
    Manual,
}

impl ProviderKind {
    fn parse(value: &str) -> Result<Self, ShipperError> {
        match value.trim().to_lowercase().as_str() {
            "datadog" => Ok(ProviderKind::Datadog),
            "rollbar" => Ok(ProviderKind::Rollbar),
            "manual" => Ok(ProviderKind::Manual),
            other => Err(ShipperError::InvalidConfig(format!(
                "Unknown provider '{other}'. Must be one of: datadog, rollbar, manual"
            ))),
        }
    }
}

/// Configuration for the log shipper
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    pub provider: ProviderKind,
    /// Datadog API key
    pub api_key: Option<String>,
    /// Datadog site (e.g., datadoghq.com, datadoghq.eu)
    pub site: String,
    /// Intake URL; required for `manual`, overrides the preset address otherwise
    pub url: Option<String>,
    pub rollbar_token: Option<String>,
    /// Framing for `manual`, as prefix, suffix and separator of equal length
    pub framing: Option<String>,
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
    pub flush_interval: Option<Duration>,
    pub buffer_size: Option<usize>,
    pub deferred_size: Option<usize>,
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Datadog,
            api_key: None,
            site: DEFAULT_SITE.to_string(),
            url: None,
            rollbar_token: None,
            framing: None,
            workers: None,
            batch_size: None,
            flush_interval: None,
            buffer_size: None,
            deferred_size: None,
            https_proxy: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ShipperConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ShipperError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ShipperError> {
        let provider = match lookup("LOG_SHIPPER_PROVIDER") {
            Some(value) => ProviderKind::parse(&value)?,
            None => ProviderKind::Datadog,
        };
        let number = |key: &str| -> Result<Option<usize>, ShipperError> {
            lookup(key)
                .map(|value| {
                    value.trim().parse::<usize>().map_err(|e| {
                        ShipperError::InvalidConfig(format!("{key} must be a number: {e}"))
                    })
                })
                .transpose()
        };

        let config = Self {
            provider,
            api_key: lookup("DD_API_KEY"),
            site: lookup("DD_SITE").unwrap_or_else(|| DEFAULT_SITE.to_string()),
            url: lookup("LOG_SHIPPER_URL"),
            rollbar_token: lookup("ROLLBAR_ACCESS_TOKEN"),
            framing: lookup("LOG_SHIPPER_FRAMING"),
            workers: number("LOG_SHIPPER_WORKERS")?,
            batch_size: number("LOG_SHIPPER_BATCH_SIZE")?,
            flush_interval: number("LOG_SHIPPER_FLUSH_INTERVAL_MS")?
                .map(|ms| Duration::from_millis(ms as u64)),
            buffer_size: number("LOG_SHIPPER_BUFFER_SIZE")?,
            deferred_size: number("LOG_SHIPPER_DEFERRED_SIZE")?,
            https_proxy: lookup("DD_PROXY_HTTPS").or_else(|| lookup("HTTPS_PROXY")),
            log_level: lookup("LOG_SHIPPER_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ShipperError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ShipperError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        self.writer_config(None)?.validate()?;
        Ok(())
    }

    /// Builds the writer configuration, checking provider credentials.
    pub fn writer_config(
        &self,
        cancel_token: Option<CancellationToken>,
    ) -> Result<WriterConfig, ShipperError> {
        let (provider, framing) = self.provider_and_framing()?;
        Ok(WriterConfig {
            provider: Some(provider),
            framing,
            entries_capacity: self.buffer_size,
            batch_capacity: self.batch_size,
            workers: self.workers,
            flush_delay: self.flush_interval,
            deferred_capacity: self.deferred_size,
            https_proxy: self.https_proxy.clone(),
            shutdown: ShutdownHooks {
                cancel_token,
                tracker: None,
            },
            ..Default::default()
        })
    }

    fn provider_and_framing(&self) -> Result<(Provider, Framing), ShipperError> {
        let (provider, framing) = match self.provider {
            ProviderKind::Datadog => {
                let api_key = required(self.api_key.as_deref(), "DD_API_KEY")?;
                if self.site.trim().is_empty() {
                    return Err(ShipperError::InvalidConfig(
                        "DD_SITE cannot be empty".to_string(),
                    ));
                }
                match &self.url {
                    Some(url) => presets::datadog(url, api_key)?,
                    None => presets::datadog_v2(&self.site, api_key, None)?,
                }
            }
            ProviderKind::Rollbar => {
                let token = required(self.rollbar_token.as_deref(), "ROLLBAR_ACCESS_TOKEN")?;
                let (provider, framing) = presets::rollbar(token)?;
                match &self.url {
                    Some(url) => (provider.with_endpoint(url)?, framing),
                    None => (provider, framing),
                }
            }
            ProviderKind::Manual => {
                let url = required(self.url.as_deref(), "LOG_SHIPPER_URL")?;
                let (provider, default_framing) = presets::json(url)?;
                let framing = match &self.framing {
                    Some(framing) => Framing::split(framing.clone()).ok_or_else(|| {
                        ShipperError::InvalidConfig(format!(
                            "LOG_SHIPPER_FRAMING '{framing}' must be prefix, suffix and separator of equal length"
                        ))
                    })?,
                    None => default_framing,
                };
                (provider, framing)
            }
        };
        Ok((provider, framing))
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ShipperError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ShipperError::InvalidConfig(format!("{name} is not set"))),
    }
}
