use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use hickory_proto::rr::RecordType;

use crate::upstream::Upstream;

/// Name of the upstream group every configuration must define.
pub const UPSTREAM_DEFAULT_GROUP: &str = "default";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub upstreams: UpstreamsConfig,

    /// Resolvers used to look up the IPs of hostname upstreams without
    /// touching the OS resolver.
    #[serde(default, rename = "bootstrapDns")]
    pub bootstrap_dns: Vec<BootstrapEntry>,

    /// Governs which address families the bootstrap queries for.
    #[serde(default, rename = "connectIPVersion")]
    pub connect_ip_version: IpVersion,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamsConfig {
    /// Group name to ordered upstream list. `default` is mandatory;
    /// other names represent client classifications.
    #[serde(default)]
    pub groups: HashMap<String, Vec<Upstream>>,

    /// Per upstream call timeout in milliseconds. Zero disables the deadline.
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
            timeout: default_timeout_ms(),
        }
    }
}

impl UpstreamsConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_millis(self.timeout))
    }
}

fn default_timeout_ms() -> u64 {
    2000
}

/// One bootstrap upstream with its pre-known IPs.
///
/// `ips` may be empty only when the upstream host is a literal IP; hostname
/// entries (allowed for HTTPS/TLS transports) need at least one explicit IP
/// to break the chicken-and-egg at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapEntry {
    pub upstream: Upstream,

    #[serde(default)]
    pub ips: Vec<IpAddr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    #[default]
    Dual,
    V4,
    V6,
}

impl IpVersion {
    pub fn query_types(&self) -> &'static [RecordType] {
        match self {
            IpVersion::Dual => &[RecordType::A, RecordType::AAAA],
            IpVersion::V4 => &[RecordType::A],
            IpVersion::V6 => &[RecordType::AAAA],
        }
    }

    pub fn includes(&self, ip: &IpAddr) -> bool {
        match self {
            IpVersion::Dual => true,
            IpVersion::V4 => ip.is_ipv4(),
            IpVersion::V6 => ip.is_ipv6(),
        }
    }
}
