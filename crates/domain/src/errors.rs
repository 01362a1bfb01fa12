use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no such host {0}")]
    NoSuchHost(String),

    #[error("invalid DNS message: {0}")]
    Protocol(String),

    #[error("transport error from {server}: {cause}")]
    Transport { server: String, cause: String },

    #[error("timeout from {server} after {timeout_ms}ms")]
    Timeout { server: String, timeout_ms: u64 },

    #[error("resolution was not successful, used resolvers: {} errors: {}", .resolvers.join(", "), .causes.join("; "))]
    AllUpstreamsFailed {
        resolvers: Vec<String>,
        causes: Vec<String>,
    },
}

impl ResolveError {
    /// True for failures that count against an upstream's selection weight.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ResolveError::Transport { .. } | ResolveError::Timeout { .. }
        )
    }
}
