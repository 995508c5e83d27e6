// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pooled HTTP client used by the transport.
//!
//! One client is shared by every worker of a writer so connections are
//! reused across batches. When the `fips` feature is enabled the client is
//! built on a FIPS-compliant rustls configuration.

use reqwest::ClientBuilder;
use std::error::Error;
use std::time::Duration;
use tracing::error;
#[cfg(feature = "fips")]
use tracing::debug;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(270);
const TCP_KEEPALIVE: Duration = Duration::from_secs(120);

/// Builds the shared client. A proxy that cannot be parsed is reported and
/// ignored rather than preventing delivery.
#[must_use]
pub fn get_client(timeout: Duration, https_proxy: Option<&str>) -> reqwest::Client {
    match build_client(timeout, https_proxy) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "HTTP_WRITER | Unable to build HTTP client: {}, falling back to direct connection",
                e
            );
            match build_client(timeout, None) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "HTTP_WRITER | Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    timeout: Duration,
    https_proxy: Option<&str>,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = create_reqwest_client_builder()?
        .timeout(timeout)
        .pool_idle_timeout(Some(POOL_IDLE_TIMEOUT))
        .tcp_keepalive(Some(TCP_KEEPALIVE));

    if let Some(https_uri) = https_proxy {
        client = client.proxy(reqwest::Proxy::https(https_uri)?);
    }

    Ok(client.build()?)
}

#[cfg(not(feature = "fips"))]
fn create_reqwest_client_builder() -> Result<ClientBuilder, Box<dyn Error>> {
    Ok(reqwest::Client::builder().use_rustls_tls())
}

#[cfg(feature = "fips")]
fn create_reqwest_client_builder() -> Result<ClientBuilder, Box<dyn Error>> {
    Ok(reqwest::Client::builder().use_preconfigured_tls(fips_tls_config()?))
}

/// TLS 1.2+ over the process-wide crypto provider, which has to be a FIPS
/// one installed before the first writer starts.
#[cfg(feature = "fips")]
fn fips_tls_config() -> Result<rustls::ClientConfig, Box<dyn Error>> {
    let provider = rustls::crypto::CryptoProvider::get_default()
        .filter(|provider| provider.fips())
        .ok_or("no FIPS crypto provider installed")?;

    let config = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS13, &rustls::version::TLS12])?
        .with_root_certificates(native_roots()?)
        .with_no_client_auth();

    if !config.fips() {
        return Err("TLS configuration is not FIPS-compliant".into());
    }
    debug!("HTTP_WRITER | Using FIPS TLS configuration");
    Ok(config)
}

#[cfg(feature = "fips")]
fn native_roots() -> Result<rustls::RootCertStore, Box<dyn Error>> {
    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) =
        roots.add_parsable_certificates(rustls_native_certs::load_native_certs().certs);
    if ignored > 0 {
        debug!("HTTP_WRITER | Ignored {} unparsable native certificates", ignored);
    }
    if added == 0 {
        return Err("native root store has no usable certificates".into());
    }
    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_without_proxy() {
        assert!(build_client(Duration::from_secs(1), None).is_ok());
    }

    #[test]
    fn test_build_client_with_proxy() {
        assert!(build_client(Duration::from_secs(1), Some("http://127.0.0.1:3128")).is_ok());
    }

    #[test]
    fn test_get_client_falls_back_on_invalid_proxy() {
        // Falls back to a direct client instead of failing.
        let _client = get_client(Duration::from_secs(1), Some("::not a proxy::"));
    }
}
