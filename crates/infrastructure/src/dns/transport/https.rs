//! DNS-over-HTTPS transport (RFC 8484).
//!
//! Queries are POSTed as raw wire format with the `application/dns-message`
//! content type; the response body is the raw wire format answer.

use super::{transport_err, TransportResponse};
use crate::dns::bootstrap::Bootstrap;
use hushdns_domain::{ResolveError, Upstream};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Content type required by RFC 8484 §4.1/§4.2.1.
const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

pub struct HttpsTransport {
    upstream: Upstream,
    url: String,
    bootstrap: Arc<Bootstrap>,
    client: tokio::sync::OnceCell<reqwest::Client>,
}

impl HttpsTransport {
    pub fn new(upstream: Upstream, bootstrap: Arc<Bootstrap>) -> Self {
        let url = upstream.url();
        Self {
            upstream,
            url,
            bootstrap,
            client: tokio::sync::OnceCell::new(),
        }
    }

    /// HTTP/2 client with connection pooling, built on first use. Hostname
    /// upstreams get their addresses injected from the bootstrap so the OS
    /// resolver is never consulted.
    async fn client(&self) -> Result<&reqwest::Client, ResolveError> {
        self.client
            .get_or_try_init(|| async {
                let mut builder = reqwest::Client::builder()
                    .use_rustls_tls()
                    .pool_max_idle_per_host(4)
                    .http2_prior_knowledge();

                if self.upstream.host_ip().is_none() {
                    let ips = self.bootstrap.upstream_ips(&self.upstream).await?;
                    let addrs: Vec<SocketAddr> = ips
                        .values()
                        .iter()
                        .map(|ip| SocketAddr::new(*ip, self.upstream.port))
                        .collect();
                    builder = builder.resolve_to_addrs(&self.upstream.host, &addrs);
                }

                builder.build().map_err(|e| {
                    ResolveError::Configuration(format!(
                        "failed to build DoH client for '{}': {}",
                        self.upstream, e
                    ))
                })
            })
            .await
    }

    pub async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Option<Duration>,
    ) -> Result<TransportResponse, ResolveError> {
        let server = self.upstream.to_string();
        let client = self.client().await?;

        debug!(url = %self.url, message_len = message_bytes.len(), "sending DoH query");

        let mut request = client
            .post(&self.url)
            .header("Content-Type", DNS_MESSAGE_CONTENT_TYPE)
            .header("Accept", DNS_MESSAGE_CONTENT_TYPE)
            .body(message_bytes.to_vec());

        if let Some(d) = timeout {
            request = request.timeout(d);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ResolveError::Timeout {
                    server: server.clone(),
                    timeout_ms: timeout.map(|d| d.as_millis() as u64).unwrap_or(0),
                }
            } else {
                transport_err(&server, format_args!("DoH request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(transport_err(
                &server,
                format_args!(
                    "DoH server returned HTTP {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }

        let response_bytes = response
            .bytes()
            .await
            .map_err(|e| transport_err(&server, format_args!("failed to read DoH response: {}", e)))?;

        debug!(url = %self.url, response_len = response_bytes.len(), "DoH response received");

        Ok(TransportResponse {
            bytes: response_bytes.to_vec(),
            protocol_used: "HTTPS",
        })
    }
}
