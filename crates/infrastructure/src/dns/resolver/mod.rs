mod group;
pub mod parallel_best;
pub mod status;
pub mod strict;
pub mod upstream;

pub use parallel_best::ParallelBestResolver;
pub use status::UpstreamStatus;
pub use strict::StrictResolver;
pub use upstream::UpstreamResolver;

pub(crate) use group::GroupRegistry;

use async_trait::async_trait;
use hushdns_domain::{Request, ResolveError, Response};

/// Contract every resolution stage implements. The request pipeline
/// consumes it, and the bootstrap chain is composed out of it.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, request: &Request) -> Result<Response, ResolveError>;

    /// Stable identifier, e.g. `parallel_best`.
    fn resolver_type(&self) -> &'static str;

    /// Human readable name, including the group composition for strategies.
    fn name(&self) -> String;

    fn is_enabled(&self) -> bool {
        true
    }

    /// Write the active configuration to the log. Implementations emit at
    /// least one line.
    fn log_config(&self);
}
