//! Bootstrap resolution: turning upstream hostnames into IPs without the
//! OS resolver.

mod cache;
mod filter;
pub mod ipset;

pub use ipset::IpSet;

use crate::dns::forwarding::{MessageBuilder, ResponseParser};
use crate::dns::resolver::{ParallelBestResolver, Resolver, UpstreamResolver, UpstreamStatus};
use crate::dns::transport::io_timeout;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;
use hushdns_domain::{
    BootstrapEntry, Config, IpVersion, NetProtocol, ResolveError, Upstream,
};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Resolves the hostnames of configured upstreams.
///
/// With `bootstrapDns` configured, lookups run through a private chain:
/// query type filter, small always-prefetching cache, parallel-best over
/// the bootstrap upstreams. Without it, the system resolver is used.
pub struct Bootstrap {
    connect_ip_version: IpVersion,
    timeout: Option<Duration>,
    // Empty until the second construction phase; empty means system resolver.
    resolver: OnceLock<Arc<dyn Resolver>>,
    // Pre-known IPs of the bootstrap upstreams themselves. Consulted before
    // the chain so that resolving a bootstrap upstream's own host can never
    // recurse into the chain.
    bootstrapped: HashMap<Upstream, Vec<IpAddr>>,
}

impl Bootstrap {
    /// Bootstrap and its internal upstream resolvers reference each other,
    /// so construction runs in two phases: allocate with an empty resolver
    /// slot, build the chain against that allocation, fill the slot.
    pub async fn new(cfg: &Config) -> Result<Arc<Self>, ResolveError> {
        let bootstrapped = validate_entries(&cfg.bootstrap_dns)?;

        let bootstrap = Arc::new(Bootstrap {
            connect_ip_version: cfg.connect_ip_version,
            timeout: cfg.upstreams.timeout(),
            resolver: OnceLock::new(),
            bootstrapped,
        });

        if bootstrap.bootstrapped.is_empty() {
            info!("bootstrapDns is not configured, using system resolver");
            return Ok(bootstrap);
        }

        let mut statuses = Vec::with_capacity(bootstrap.bootstrapped.len());
        for upstream in bootstrap.bootstrapped.keys() {
            let resolver =
                UpstreamResolver::unchecked(upstream.clone(), &bootstrap, cfg.upstreams.timeout())?;
            statuses.push(Arc::new(UpstreamStatus::new(Arc::new(resolver))));
        }

        let parallel = ParallelBestResolver::from_statuses(statuses);
        let cached = cache::CachingResolver::new(Arc::new(parallel));
        let chain: Arc<dyn Resolver> = Arc::new(filter::QueryTypeFilter::new(Arc::new(cached)));

        let _ = bootstrap.resolver.set(chain);

        Ok(bootstrap)
    }

    /// IPs for one configured upstream.
    pub async fn upstream_ips(&self, upstream: &Upstream) -> Result<IpSet, ResolveError> {
        // Literal IPs never need a lookup.
        if let Some(ip) = upstream.host_ip() {
            return Ok(IpSet::new(vec![ip]));
        }

        // Recursion break: a bootstrap upstream resolves to its configured
        // IPs, bypassing the chain it is part of.
        if let Some(ips) = self.bootstrapped.get(upstream) {
            return Ok(IpSet::new(ips.clone()));
        }

        let ips = self
            .resolve(&upstream.host, self.connect_ip_version.query_types())
            .await?;

        Ok(IpSet::new(ips))
    }

    /// Resolve `host` for the given query types through the bootstrap chain,
    /// or through the OS resolver when no bootstrap DNS is configured.
    pub async fn resolve(
        &self,
        host: &str,
        query_types: &[RecordType],
    ) -> Result<Vec<IpAddr>, ResolveError> {
        let Some(resolver) = self.resolver.get() else {
            return self.system_lookup(host).await;
        };

        let mut ips = Vec::new();
        let mut causes = Vec::new();

        for query_type in query_types {
            match self.resolve_type(resolver.as_ref(), host, *query_type).await {
                Ok(mut found) => ips.append(&mut found),
                Err(e) => causes.push(e.to_string()),
            }
        }

        if !causes.is_empty() {
            return Err(ResolveError::Transport {
                server: host.to_string(),
                cause: causes.join("; "),
            });
        }

        if ips.is_empty() {
            return Err(ResolveError::NoSuchHost(host.to_string()));
        }

        Ok(ips)
    }

    async fn resolve_type(
        &self,
        resolver: &dyn Resolver,
        host: &str,
        query_type: RecordType,
    ) -> Result<Vec<IpAddr>, ResolveError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        let request = MessageBuilder::build_request(host, query_type)?;
        let response = resolver.resolve(&request).await?;

        if response.message.response_code() != ResponseCode::NoError {
            return Ok(Vec::new());
        }

        Ok(ResponseParser::ip_addresses(&response.message))
    }

    async fn system_lookup(&self, host: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let target = format!("{}:0", host);
        let lookup = tokio::net::lookup_host(target);

        let addrs = match self.timeout {
            Some(d) => tokio::time::timeout(d, lookup)
                .await
                .map_err(|_| ResolveError::Timeout {
                    server: host.to_string(),
                    timeout_ms: d.as_millis() as u64,
                })?,
            None => lookup.await,
        }
        .map_err(|e| ResolveError::Transport {
            server: host.to_string(),
            cause: format!("system resolution failed: {}", e),
        })?;

        let ips: Vec<IpAddr> = addrs
            .map(|addr| addr.ip())
            .filter(|ip| self.connect_ip_version.includes(ip))
            .collect();

        if ips.is_empty() {
            return Err(ResolveError::NoSuchHost(host.to_string()));
        }

        Ok(ips)
    }

    /// Dialer for transports that open their own connections (DoT). One IP
    /// is chosen uniformly at random; the standard dialer connects to it.
    pub async fn dial(
        &self,
        server: &str,
        ips: &IpSet,
        port: u16,
        timeout: Option<Duration>,
    ) -> Result<(SocketAddr, TcpStream), ResolveError> {
        let addr = SocketAddr::new(ips.random(), port);

        debug!(%addr, server = %server, "dialing upstream");

        let connect = async {
            TcpStream::connect(addr).await.map_err(|e| ResolveError::Transport {
                server: server.to_string(),
                cause: format!("connection to {} failed: {}", addr, e),
            })
        };
        let stream = io_timeout(timeout, server, connect).await?;

        Ok((addr, stream))
    }
}

fn validate_entries(
    entries: &[BootstrapEntry],
) -> Result<HashMap<Upstream, Vec<IpAddr>>, ResolveError> {
    let mut bootstrapped = HashMap::with_capacity(entries.len());
    let mut problems = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        let index = i + 1; // user visible index starts at 1
        let upstream = &entry.upstream;

        let mut ips = Vec::new();

        if let Some(ip) = upstream.host_ip() {
            ips.push(ip);
        } else if upstream.net == NetProtocol::TcpUdp {
            problems.push(format!(
                "item {}: '{}': protocol {} must use IP instead of hostname",
                index, upstream, upstream.net
            ));
            continue;
        }

        ips.extend(entry.ips.iter().copied());

        if ips.is_empty() {
            problems.push(format!("item {}: '{}': no IPs configured", index, upstream));
            continue;
        }

        bootstrapped.insert(upstream.clone(), ips);
    }

    if !problems.is_empty() {
        return Err(ResolveError::Configuration(format!(
            "invalid bootstrapDns configuration: {}",
            problems.join("; ")
        )));
    }

    Ok(bootstrapped)
}
