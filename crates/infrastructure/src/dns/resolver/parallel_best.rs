use super::group::GroupRegistry;
use super::status::UpstreamStatus;
use super::Resolver;
use crate::dns::bootstrap::Bootstrap;
use async_trait::async_trait;
use hushdns_domain::{Request, ResolveError, Response, UpstreamsConfig};
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

const PARALLEL_RESOLVER_TYPE: &str = "parallel_best";

/// Number of upstreams raced per request.
const RACE_WIDTH: usize = 2;

/// Races two weighted-randomly chosen upstreams of a group and returns the
/// first successful answer.
pub struct ParallelBestResolver {
    registry: GroupRegistry,
}

impl ParallelBestResolver {
    pub async fn new(
        cfg: &UpstreamsConfig,
        bootstrap: &Arc<Bootstrap>,
        verify_upstreams: bool,
    ) -> Result<Self, ResolveError> {
        Ok(Self {
            registry: GroupRegistry::from_config(cfg, bootstrap, verify_upstreams).await?,
        })
    }

    /// Used by the bootstrap chain, which supplies pre-built resolvers and
    /// skips verification.
    pub(crate) fn from_statuses(statuses: Vec<Arc<UpstreamStatus>>) -> Self {
        Self {
            registry: GroupRegistry::single_default(statuses),
        }
    }

    /// Two distinct picks; the second draw excludes the first winner.
    fn pick_two(
        statuses: &[Arc<UpstreamStatus>],
    ) -> (&Arc<UpstreamStatus>, &Arc<UpstreamStatus>) {
        let first = weighted_random(statuses, None);
        let second = weighted_random(statuses, Some(first));
        (first, second)
    }
}

/// Weighted random pick over the statuses, proportional to each upstream's
/// current weight.
fn weighted_random<'a>(
    statuses: &'a [Arc<UpstreamStatus>],
    exclude: Option<&Arc<UpstreamStatus>>,
) -> &'a Arc<UpstreamStatus> {
    let candidates: SmallVec<[(&'a Arc<UpstreamStatus>, u64); 8]> = statuses
        .iter()
        .filter(|&status| exclude.map_or(true, |e| !Arc::ptr_eq(e, status)))
        .map(|status| (status, status.weight()))
        .collect();

    if candidates.is_empty() {
        return &statuses[0];
    }

    let total: u64 = candidates.iter().map(|(_, weight)| *weight).sum();
    let mut roll = fastrand::u64(..total);

    for &(status, weight) in &candidates {
        if roll < weight {
            return status;
        }
        roll -= weight;
    }

    // Unreachable while weights stay positive.
    candidates[candidates.len() - 1].0
}

#[async_trait]
impl Resolver for ParallelBestResolver {
    async fn resolve(&self, request: &Request) -> Result<Response, ResolveError> {
        let statuses = self.registry.resolvers_for(&request.group);

        if let [single] = statuses {
            debug!(resolver = %single.resolver().name(), "delegating to single upstream");
            return single.resolver().resolve(request).await;
        }

        let (first, second) = Self::pick_two(statuses);
        debug!(
            first = %first.resolver().name(),
            second = %second.resolver().name(),
            "racing upstreams"
        );

        let (tx, mut rx) = mpsc::channel::<(String, Result<Response, ResolveError>)>(RACE_WIDTH);

        for status in [first, second] {
            let status = Arc::clone(status);
            let request = request.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = status.resolve_tracked(&request).await;
                // Channel capacity matches the racer count, so the losing
                // task completes its send without blocking and exits.
                let _ = tx.send((status.resolver().name(), result)).await;
            });
        }
        drop(tx);

        let mut causes = Vec::new();
        while let Some((name, result)) = rx.recv().await {
            match result {
                Ok(response) => {
                    debug!(resolver = %name, "using response from resolver");
                    return Ok(response);
                }
                Err(e) => {
                    debug!(resolver = %name, error = %e, "resolution failed from resolver");
                    causes.push(e.to_string());
                }
            }
        }

        Err(ResolveError::AllUpstreamsFailed {
            resolvers: vec![first.resolver().name(), second.resolver().name()],
            causes,
        })
    }

    fn resolver_type(&self) -> &'static str {
        PARALLEL_RESOLVER_TYPE
    }

    fn name(&self) -> String {
        format!(
            "{} upstreams '{}'",
            PARALLEL_RESOLVER_TYPE,
            self.registry.describe()
        )
    }

    fn log_config(&self) {
        self.registry.log_config(PARALLEL_RESOLVER_TYPE);
    }
}
