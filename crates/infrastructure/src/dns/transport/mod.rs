pub mod tcp;
pub mod udp;

#[cfg(feature = "dns-over-https")]
pub mod https;
#[cfg(feature = "dns-over-rustls")]
pub mod tls;

use crate::dns::bootstrap::Bootstrap;
use hushdns_domain::{NetProtocol, ResolveError, Upstream};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct TransportResponse {
    pub bytes: Vec<u8>,

    pub protocol_used: &'static str,
}

pub enum Transport {
    UdpTcp(udp::UdpTcpTransport),
    #[cfg(feature = "dns-over-rustls")]
    Tls(tls::TlsTransport),
    #[cfg(feature = "dns-over-https")]
    Https(https::HttpsTransport),
}

impl Transport {
    pub fn new(upstream: &Upstream, bootstrap: &Arc<Bootstrap>) -> Result<Transport, ResolveError> {
        match upstream.net {
            NetProtocol::TcpUdp => Ok(Transport::UdpTcp(udp::UdpTcpTransport::new(
                upstream.clone(),
                Arc::clone(bootstrap),
            ))),

            #[cfg(feature = "dns-over-rustls")]
            NetProtocol::TcpTls => Ok(Transport::Tls(tls::TlsTransport::new(
                upstream.clone(),
                Arc::clone(bootstrap),
            ))),

            #[cfg(not(feature = "dns-over-rustls"))]
            NetProtocol::TcpTls => Err(ResolveError::Configuration(format!(
                "'{}': enable the 'dns-over-rustls' feature for tcp-tls upstreams",
                upstream
            ))),

            #[cfg(feature = "dns-over-https")]
            NetProtocol::Https => Ok(Transport::Https(https::HttpsTransport::new(
                upstream.clone(),
                Arc::clone(bootstrap),
            ))),

            #[cfg(not(feature = "dns-over-https"))]
            NetProtocol::Https => Err(ResolveError::Configuration(format!(
                "'{}': enable the 'dns-over-https' feature for https upstreams",
                upstream
            ))),
        }
    }

    pub async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Option<Duration>,
    ) -> Result<TransportResponse, ResolveError> {
        match self {
            Self::UdpTcp(t) => t.send(message_bytes, timeout).await,
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(t) => t.send(message_bytes, timeout).await,
            #[cfg(feature = "dns-over-https")]
            Self::Https(t) => t.send(message_bytes, timeout).await,
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        match self {
            Self::UdpTcp(_) => "UDP",
            #[cfg(feature = "dns-over-rustls")]
            Self::Tls(_) => "TLS",
            #[cfg(feature = "dns-over-https")]
            Self::Https(_) => "HTTPS",
        }
    }
}

/// Bound `fut` by the per-call deadline; `None` leaves it unbounded.
pub(crate) async fn io_timeout<T, F>(
    timeout: Option<Duration>,
    server: &str,
    fut: F,
) -> Result<T, ResolveError>
where
    F: Future<Output = Result<T, ResolveError>>,
{
    match timeout {
        Some(d) => tokio::time::timeout(d, fut)
            .await
            .map_err(|_| ResolveError::Timeout {
                server: server.to_string(),
                timeout_ms: d.as_millis() as u64,
            })?,
        None => fut.await,
    }
}

pub(crate) fn transport_err(server: &str, cause: impl std::fmt::Display) -> ResolveError {
    ResolveError::Transport {
        server: server.to_string(),
        cause: cause.to_string(),
    }
}
