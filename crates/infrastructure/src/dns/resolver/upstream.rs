use super::Resolver;
use crate::dns::bootstrap::Bootstrap;
use crate::dns::forwarding::{MessageBuilder, ResponseParser};
use crate::dns::transport::Transport;
use async_trait::async_trait;
use hickory_proto::rr::RecordType;
use hushdns_domain::{Request, ResolveError, Response, ResponseType, Upstream};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const UPSTREAM_RESOLVER_TYPE: &str = "upstream";

/// Probe target for construction-time verification.
const TEST_QUERY_NAME: &str = "github.com.";

/// Sends one DNS query to one configured endpoint.
pub struct UpstreamResolver {
    upstream: Upstream,
    transport: Transport,
    timeout: Option<Duration>,
}

impl UpstreamResolver {
    pub async fn new(
        upstream: Upstream,
        bootstrap: &Arc<Bootstrap>,
        timeout: Option<Duration>,
        verify: bool,
    ) -> Result<Self, ResolveError> {
        let resolver = Self::unchecked(upstream, bootstrap, timeout)?;

        if verify {
            resolver.self_test().await?;
        }

        Ok(resolver)
    }

    /// Construction without the probe; bootstrap internals and group
    /// building verify separately.
    pub(crate) fn unchecked(
        upstream: Upstream,
        bootstrap: &Arc<Bootstrap>,
        timeout: Option<Duration>,
    ) -> Result<Self, ResolveError> {
        let transport = Transport::new(&upstream, bootstrap)?;

        Ok(Self {
            upstream,
            transport,
            timeout,
        })
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Synthetic `A github.com.` query; an upstream that cannot answer it
    /// is considered broken.
    pub(crate) async fn self_test(&self) -> Result<(), ResolveError> {
        let request = MessageBuilder::build_request(TEST_QUERY_NAME, RecordType::A)?;

        let response = self.resolve(&request).await.map_err(|e| {
            ResolveError::Configuration(format!("test resolve of upstream server failed: {}", e))
        })?;

        if response.response_type != ResponseType::Resolved {
            return Err(ResolveError::Configuration(format!(
                "test resolve of upstream server '{}' returned {}",
                self.upstream, response.response_type
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Resolver for UpstreamResolver {
    async fn resolve(&self, request: &Request) -> Result<Response, ResolveError> {
        let server = self.upstream.to_string();

        let query_bytes = MessageBuilder::serialize(&request.message)?;

        let reply = self.transport.send(&query_bytes, self.timeout).await?;

        let message = ResponseParser::parse(&reply.bytes).map_err(|e| ResolveError::Transport {
            server: server.clone(),
            cause: e.to_string(),
        })?;

        if message.id() != request.message.id() {
            return Err(ResolveError::Transport {
                server,
                cause: format!(
                    "unexpected message id {} (sent {})",
                    message.id(),
                    request.message.id()
                ),
            });
        }

        debug!(
            upstream = %self.upstream,
            protocol = reply.protocol_used,
            rcode = ?message.response_code(),
            answers = message.answers().len(),
            "upstream answered"
        );

        // SERVFAIL and NXDOMAIN are successful exchanges at this layer; only
        // wire failures are errors.
        Ok(Response::resolved(message, &server))
    }

    fn resolver_type(&self) -> &'static str {
        UPSTREAM_RESOLVER_TYPE
    }

    fn name(&self) -> String {
        self.upstream.to_string()
    }

    fn log_config(&self) {
        info!(
            upstream = %self.upstream,
            timeout_ms = self.timeout.map(|d| d.as_millis() as u64).unwrap_or(0),
            "upstream resolver"
        );
    }
}
