pub mod bootstrap;
pub mod forwarding;
pub mod resolver;
pub mod transport;

pub use bootstrap::{Bootstrap, IpSet};
pub use resolver::{
    ParallelBestResolver, Resolver, StrictResolver, UpstreamResolver, UpstreamStatus,
};
