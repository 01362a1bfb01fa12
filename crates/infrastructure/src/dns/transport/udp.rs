//! Plain DNS transport (RFC 1035 §4.2).
//!
//! Queries go out over UDP without framing, limited to 4096 bytes with
//! EDNS(0). A response with the TC bit set is retried over TCP with 2-byte
//! length framing.

use super::{io_timeout, tcp, transport_err, TransportResponse};
use crate::dns::bootstrap::{Bootstrap, IpSet};
use hushdns_domain::{ResolveError, Upstream};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Maximum UDP DNS response size with EDNS(0)
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

pub struct UdpTcpTransport {
    upstream: Upstream,
    bootstrap: Arc<Bootstrap>,
    ips: tokio::sync::OnceCell<Arc<IpSet>>,
}

impl UdpTcpTransport {
    pub fn new(upstream: Upstream, bootstrap: Arc<Bootstrap>) -> Self {
        Self {
            upstream,
            bootstrap,
            ips: tokio::sync::OnceCell::new(),
        }
    }

    /// Endpoint address for this call. Literal IP hosts never touch the
    /// bootstrap; hostname upstreams resolve once and rotate on failure.
    async fn target(&self) -> Result<SocketAddr, ResolveError> {
        if let Some(ip) = self.upstream.host_ip() {
            return Ok(SocketAddr::new(ip, self.upstream.port));
        }

        let set = self
            .ips
            .get_or_try_init(|| async {
                self.bootstrap
                    .upstream_ips(&self.upstream)
                    .await
                    .map(Arc::new)
            })
            .await?;

        Ok(SocketAddr::new(set.current(), self.upstream.port))
    }

    fn rotate_on_error(&self) {
        if let Some(set) = self.ips.get() {
            set.next();
        }
    }

    pub async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Option<Duration>,
    ) -> Result<TransportResponse, ResolveError> {
        let server = self.upstream.to_string();

        let result = self.exchange(&server, message_bytes, timeout).await;
        if result.is_err() {
            self.rotate_on_error();
        }

        result
    }

    async fn exchange(
        &self,
        server: &str,
        message_bytes: &[u8],
        timeout: Option<Duration>,
    ) -> Result<TransportResponse, ResolveError> {
        let addr = self.target().await?;

        let response =
            io_timeout(timeout, server, self.udp_exchange(addr, server, message_bytes)).await?;

        if is_truncated(&response) {
            debug!(server = %server, "UDP response truncated, retrying over TCP");

            let bytes =
                io_timeout(timeout, server, tcp::exchange(addr, server, message_bytes)).await?;

            return Ok(TransportResponse {
                bytes,
                protocol_used: "TCP",
            });
        }

        Ok(TransportResponse {
            bytes: response,
            protocol_used: "UDP",
        })
    }

    async fn udp_exchange(
        &self,
        addr: SocketAddr,
        server: &str,
        message_bytes: &[u8],
    ) -> Result<Vec<u8>, ResolveError> {
        // Bind to ephemeral port (0 = OS assigns)
        let bind_addr = if addr.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };

        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| transport_err(server, format_args!("failed to bind UDP socket: {}", e)))?;

        let bytes_sent = socket
            .send_to(message_bytes, addr)
            .await
            .map_err(|e| transport_err(server, format_args!("failed to send UDP query: {}", e)))?;

        debug!(server = %server, bytes_sent, "UDP query sent");

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];

        let (bytes_received, from_addr) = socket.recv_from(&mut recv_buf).await.map_err(|e| {
            transport_err(server, format_args!("failed to receive UDP response: {}", e))
        })?;

        if from_addr.ip() != addr.ip() {
            warn!(
                expected = %addr,
                received_from = %from_addr,
                "UDP response from unexpected source"
            );
        }

        recv_buf.truncate(bytes_received);

        debug!(server = %server, bytes_received, "UDP response received");

        Ok(recv_buf)
    }
}

/// TC bit lives in bit 1 of the third header byte.
fn is_truncated(response: &[u8]) -> bool {
    response.len() > 2 && response[2] & 0x02 != 0
}
