use super::status::UpstreamStatus;
use super::upstream::UpstreamResolver;
use crate::dns::bootstrap::Bootstrap;
use futures::future;
use hushdns_domain::{ResolveError, UpstreamsConfig, UPSTREAM_DEFAULT_GROUP};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Immutable map from client group name to its upstream statuses. Built at
/// startup, shared read-only afterwards.
pub(crate) struct GroupRegistry {
    groups: HashMap<Arc<str>, Vec<Arc<UpstreamStatus>>>,
}

impl GroupRegistry {
    pub(crate) async fn from_config(
        cfg: &UpstreamsConfig,
        bootstrap: &Arc<Bootstrap>,
        verify_upstreams: bool,
    ) -> Result<Self, ResolveError> {
        if !cfg.groups.contains_key(UPSTREAM_DEFAULT_GROUP) {
            return Err(ResolveError::Configuration(format!(
                "upstream group '{}' is mandatory",
                UPSTREAM_DEFAULT_GROUP
            )));
        }

        let mut groups = HashMap::with_capacity(cfg.groups.len());

        for (name, upstreams) in &cfg.groups {
            let mut resolvers = Vec::with_capacity(upstreams.len());

            for upstream in upstreams {
                match UpstreamResolver::unchecked(upstream.clone(), bootstrap, cfg.timeout()) {
                    Ok(resolver) => resolvers.push(resolver),
                    Err(e) => {
                        warn!(group = %name, upstream = %upstream, error = %e, "skipping unusable upstream");
                    }
                }
            }

            if verify_upstreams {
                let probes = resolvers.iter().map(|resolver| resolver.self_test());
                let results = future::join_all(probes).await;

                let mut has_verified = false;
                for (resolver, result) in resolvers.iter().zip(results) {
                    match result {
                        Ok(()) => has_verified = true,
                        Err(e) => {
                            // Kept in the group anyway; the weighting steers
                            // traffic away until it recovers.
                            warn!(group = %name, upstream = %resolver.upstream(), error = %e, "upstream failed test resolve");
                        }
                    }
                }

                if !has_verified {
                    return Err(ResolveError::Configuration(format!(
                        "no valid upstream for group {}",
                        name
                    )));
                }
            }

            if resolvers.is_empty() {
                return Err(ResolveError::Configuration(format!(
                    "no usable upstream for group {}",
                    name
                )));
            }

            let statuses = resolvers
                .into_iter()
                .map(|resolver| Arc::new(UpstreamStatus::new(Arc::new(resolver))))
                .collect();

            groups.insert(Arc::from(name.as_str()), statuses);
        }

        Ok(Self { groups })
    }

    /// Registry with the given statuses as the default group; used by the
    /// bootstrap chain.
    pub(crate) fn single_default(statuses: Vec<Arc<UpstreamStatus>>) -> Self {
        let mut groups = HashMap::with_capacity(1);
        groups.insert(Arc::from(UPSTREAM_DEFAULT_GROUP), statuses);
        Self { groups }
    }

    /// Resolvers for the group chosen by the client classifier; unknown
    /// names fall back to the default group.
    pub(crate) fn resolvers_for(&self, group: &str) -> &[Arc<UpstreamStatus>] {
        self.groups
            .get(group)
            .or_else(|| self.groups.get(UPSTREAM_DEFAULT_GROUP))
            .map(|statuses| statuses.as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn describe(&self) -> String {
        let mut parts: Vec<String> = self
            .groups
            .iter()
            .map(|(name, statuses)| {
                let upstreams: Vec<String> = statuses
                    .iter()
                    .map(|status| status.resolver().upstream().to_string())
                    .collect();
                format!("{} ({})", name, upstreams.join(","))
            })
            .collect();
        parts.sort();
        parts.join("; ")
    }

    pub(crate) fn log_config(&self, resolver_type: &str) {
        for (name, statuses) in &self.groups {
            let upstreams: Vec<String> = statuses
                .iter()
                .map(|status| status.resolver().upstream().to_string())
                .collect();

            info!(
                resolver = resolver_type,
                group = %name,
                upstreams = %upstreams.join(", "),
                "upstream group"
            );
        }
    }
}
