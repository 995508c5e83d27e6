// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use http_log_writer::WriterError;

/// Errors that stop the shipper before or while it runs
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Writer error: {0}")]
    Writer(#[from] WriterError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ShipperError::InvalidConfig("DD_API_KEY is not set".to_string());
        assert_eq!(error.to_string(), "Invalid configuration: DD_API_KEY is not set");
    }

    #[test]
    fn test_from_writer_error() {
        let error = ShipperError::from(WriterError::Disabled);
        assert!(matches!(error, ShipperError::Writer(WriterError::Disabled)));
        assert_eq!(error.to_string(), "Writer error: writer is disabled");
    }
}
