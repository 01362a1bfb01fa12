use super::group::GroupRegistry;
use super::Resolver;
use crate::dns::bootstrap::Bootstrap;
use async_trait::async_trait;
use hushdns_domain::{Request, ResolveError, Response, UpstreamsConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const STRICT_RESOLVER_TYPE: &str = "strict";

/// Tries the upstreams of a group in declared order, falling through on
/// failure or timeout. No randomization, no weighting.
pub struct StrictResolver {
    registry: GroupRegistry,
    timeout: Option<Duration>,
}

impl StrictResolver {
    pub async fn new(
        cfg: &UpstreamsConfig,
        bootstrap: &Arc<Bootstrap>,
        verify_upstreams: bool,
    ) -> Result<Self, ResolveError> {
        Ok(Self {
            registry: GroupRegistry::from_config(cfg, bootstrap, verify_upstreams).await?,
            timeout: cfg.timeout(),
        })
    }
}

#[async_trait]
impl Resolver for StrictResolver {
    async fn resolve(&self, request: &Request) -> Result<Response, ResolveError> {
        let statuses = self.registry.resolvers_for(&request.group);

        if let [single] = statuses {
            debug!(resolver = %single.resolver().name(), "delegating to single upstream");
            return single.resolver().resolve(request).await;
        }

        let mut resolvers = Vec::with_capacity(statuses.len());
        let mut causes = Vec::with_capacity(statuses.len());

        for (position, status) in statuses.iter().enumerate() {
            let name = status.resolver().name();

            let attempt = status.resolve_tracked(request);
            let result = match self.timeout {
                Some(d) => match tokio::time::timeout(d, attempt).await {
                    Ok(result) => result,
                    Err(_) => {
                        status.record_error();
                        Err(ResolveError::Timeout {
                            server: name.clone(),
                            timeout_ms: d.as_millis() as u64,
                        })
                    }
                },
                None => attempt.await,
            };

            match result {
                Ok(response) => {
                    debug!(resolver = %name, position, "upstream responded");
                    return Ok(response);
                }
                Err(e) => {
                    warn!(resolver = %name, position, error = %e, "failing over to next upstream");
                    resolvers.push(name);
                    causes.push(e.to_string());
                }
            }
        }

        Err(ResolveError::AllUpstreamsFailed { resolvers, causes })
    }

    fn resolver_type(&self) -> &'static str {
        STRICT_RESOLVER_TYPE
    }

    fn name(&self) -> String {
        format!(
            "{} upstreams '{}'",
            STRICT_RESOLVER_TYPE,
            self.registry.describe()
        )
    }

    fn log_config(&self) {
        self.registry.log_config(STRICT_RESOLVER_TYPE);
    }
}
