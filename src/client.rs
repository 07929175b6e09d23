use tokio::time::Duration;
use tracing::{info, warn};

/// Configuration for building the HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout: Duration,
    pub skip_tls_verify: bool,
}

/// Builds the reqwest HTTP client shared by every endpoint worker.
///
/// The timeout bounds each request; an expired deadline is reported like any
/// other transport error.
pub fn build_client(config: &ClientConfig) -> Result<reqwest::Client, reqwest::Error> {
    let mut client_builder = reqwest::Client::builder().timeout(config.request_timeout);

    if config.skip_tls_verify {
        warn!("Skipping TLS certificate verification");
        client_builder = client_builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    let client = client_builder.build()?;
    info!(
        request_timeout = ?config.request_timeout,
        skip_tls_verify = config.skip_tls_verify,
        "HTTP client configured"
    );

    Ok(client)
}
