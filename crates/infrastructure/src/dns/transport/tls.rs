use super::tcp::{read_with_length_prefix, send_with_length_prefix};
use super::{io_timeout, transport_err, TransportResponse};
use crate::dns::bootstrap::{Bootstrap, IpSet};
use dashmap::DashMap;
use hushdns_domain::{ResolveError, Upstream};
use rustls::pki_types::ServerName;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tracing::debug;

const MAX_IDLE_PER_HOST: usize = 2;

static SHARED_TLS_CONFIG: LazyLock<Arc<rustls::ClientConfig>> = LazyLock::new(|| {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Arc::new(config)
});

type TlsConnection = TlsStream<TcpStream>;
type TlsConnectionPool = DashMap<String, Vec<TlsConnection>>;

// Idle connections are interchangeable across an upstream's IPs, so the
// pool is keyed by the upstream itself.
static TLS_POOL: LazyLock<TlsConnectionPool> = LazyLock::new(TlsConnectionPool::new);

pub struct TlsTransport {
    upstream: Upstream,
    bootstrap: Arc<Bootstrap>,
    ips: tokio::sync::OnceCell<Arc<IpSet>>,
}

impl TlsTransport {
    pub fn new(upstream: Upstream, bootstrap: Arc<Bootstrap>) -> Self {
        Self {
            upstream,
            bootstrap,
            ips: tokio::sync::OnceCell::new(),
        }
    }

    async fn ip_set(&self) -> Result<&Arc<IpSet>, ResolveError> {
        self.ips
            .get_or_try_init(|| async {
                self.bootstrap
                    .upstream_ips(&self.upstream)
                    .await
                    .map(Arc::new)
            })
            .await
    }

    fn take_pooled(&self, key: &str) -> Option<TlsConnection> {
        let mut entry = TLS_POOL.get_mut(key)?;
        entry.pop()
    }

    fn return_to_pool(&self, key: &str, stream: TlsConnection) {
        let mut entry = TLS_POOL.entry(key.to_string()).or_default();
        if entry.len() < MAX_IDLE_PER_HOST {
            entry.push(stream);
        }
    }

    async fn connect_new(
        &self,
        server: &str,
        timeout: Option<Duration>,
    ) -> Result<TlsConnection, ResolveError> {
        let connector = tokio_rustls::TlsConnector::from(SHARED_TLS_CONFIG.clone());

        let server_name =
            ServerName::try_from(self.upstream.tls_server_name().to_string()).map_err(|e| {
                ResolveError::Configuration(format!(
                    "invalid TLS server name '{}': {}",
                    self.upstream.tls_server_name(),
                    e
                ))
            })?;

        let ips = self.ip_set().await?;
        let (addr, tcp_stream) = self
            .bootstrap
            .dial(server, ips, self.upstream.port, timeout)
            .await?;

        let handshake = async {
            connector
                .connect(server_name, tcp_stream)
                .await
                .map_err(|e| transport_err(server, format_args!("TLS handshake failed: {}", e)))
        };
        let tls_stream = io_timeout(timeout, server, handshake).await?;

        debug!(server = %server, %addr, "TLS connection established");
        Ok(tls_stream)
    }

    async fn send_on_stream(
        &self,
        stream: &mut TlsConnection,
        server: &str,
        message_bytes: &[u8],
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, ResolveError> {
        let exchange = async {
            send_with_length_prefix(stream, server, message_bytes).await?;
            read_with_length_prefix(stream, server).await
        };

        io_timeout(timeout, server, exchange).await
    }

    pub async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Option<Duration>,
    ) -> Result<TransportResponse, ResolveError> {
        let server = self.upstream.to_string();

        if let Some(mut stream) = self.take_pooled(&server) {
            match self
                .send_on_stream(&mut stream, &server, message_bytes, timeout)
                .await
            {
                Ok(response_bytes) => {
                    debug!(server = %server, "TLS query via pooled connection");
                    self.return_to_pool(&server, stream);
                    return Ok(TransportResponse {
                        bytes: response_bytes,
                        protocol_used: "TLS",
                    });
                }
                Err(_) => {
                    debug!(server = %server, "pooled TLS connection stale, reconnecting");
                }
            }
        }

        let mut stream = self.connect_new(&server, timeout).await?;

        let response_bytes = self
            .send_on_stream(&mut stream, &server, message_bytes, timeout)
            .await?;

        debug!(
            server = %server,
            response_len = response_bytes.len(),
            "TLS response received"
        );

        self.return_to_pool(&server, stream);

        Ok(TransportResponse {
            bytes: response_bytes,
            protocol_used: "TLS",
        })
    }
}
