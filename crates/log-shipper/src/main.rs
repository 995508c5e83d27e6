// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ships newline-delimited records read from stdin to an HTTP log intake.
//! Stops on end of input or Ctrl-C, flushing what was accepted.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod config;
mod error;

use std::env;
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use config::ShipperConfig;
use http_log_writer::{HttpLogWriter, WriterError};

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("LOG_SHIPPER_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .with_writer(std::io::stderr)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match ShipperConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating log shipper config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let cancel_token = CancellationToken::new();
    let writer_config = match config.writer_config(Some(cancel_token.clone())) {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating writer config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let writer = HttpLogWriter::new(writer_config);
    if let Err(e) = writer.start() {
        error!("Error starting log writer: {e}");
        return ExitCode::FAILURE;
    }
    match writer.ping().await {
        Ok(()) => info!("Log intake reachable, shipping stdin"),
        Err(e) => warn!("Log intake not reachable yet, records will be retried: {e}"),
    }

    tokio::spawn({
        let cancel_token = cancel_token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received interrupt, shutting down");
            }
            cancel_token.cancel();
        }
    });

    let shipped = ship_lines(&writer, &cancel_token).await;

    writer.shutdown().await;
    info!(
        "Shipped {} records, {} rejected by a full buffer, {} batches dropped",
        shipped,
        writer.lost_entries(),
        writer.dropped_packs()
    );
    // A stdin read may still be parked on a blocking thread after Ctrl-C,
    // which would keep the runtime from shutting down.
    std::process::exit(0)
}

/// Reads stdin until EOF or cancellation. Returns how many records the
/// writer accepted.
async fn ship_lines(writer: &HttpLogWriter, cancel_token: &CancellationToken) -> u64 {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut shipped = 0;

    loop {
        let line = tokio::select! {
            () = cancel_token.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("End of input");
                break;
            }
            Err(e) => {
                error!("Error reading stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match writer.write(line.as_bytes()) {
            Ok(_) => shipped += 1,
            // Counted by the writer, reported on exit.
            Err(WriterError::BufferFull) => {}
            Err(e) => {
                error!("Log writer stopped accepting records: {e}");
                break;
            }
        }
    }
    shipped
}
