use super::upstream::UpstreamResolver;
use super::Resolver;
use hushdns_domain::{Request, ResolveError, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Instant;

/// Full weight of an upstream that has not failed within the error window.
const WEIGHT_MAX: u64 = 60;
/// Floor weight; keeps recently failed upstreams probeable so they can
/// recover.
const WEIGHT_MIN: u64 = 1;
/// Errors older than this no longer influence selection.
const ERROR_MEMORY_SECS: u64 = 60 * 60;

static PROCESS_START: LazyLock<Instant> = LazyLock::new(Instant::now);

fn uptime_secs() -> u64 {
    PROCESS_START.elapsed().as_secs()
}

/// Couples an upstream resolver with the timestamp of its last failure.
///
/// The timestamp is a single atomic slot; the weight function tolerates
/// mildly stale reads, so no lock is involved.
pub struct UpstreamStatus {
    resolver: Arc<UpstreamResolver>,
    // Uptime second of the last error plus one; zero means never failed.
    last_error: AtomicU64,
}

impl UpstreamStatus {
    pub fn new(resolver: Arc<UpstreamResolver>) -> Self {
        Self {
            resolver,
            last_error: AtomicU64::new(0),
        }
    }

    pub fn resolver(&self) -> &Arc<UpstreamResolver> {
        &self.resolver
    }

    pub(crate) fn record_error(&self) {
        self.last_error.store(uptime_secs() + 1, Ordering::Release);
    }

    fn seconds_since_error(&self) -> Option<u64> {
        match self.last_error.load(Ordering::Acquire) {
            0 => None,
            at => Some(uptime_secs().saturating_sub(at - 1)),
        }
    }

    /// Selection weight: one point per whole minute since the last error,
    /// floored at [`WEIGHT_MIN`]; upstreams without a recent error get
    /// [`WEIGHT_MAX`].
    pub(crate) fn weight(&self) -> u64 {
        weight_from(self.seconds_since_error())
    }

    /// Resolve through the wrapped upstream, stamping the error slot on
    /// failure.
    pub(crate) async fn resolve_tracked(&self, request: &Request) -> Result<Response, ResolveError> {
        let result = self.resolver.resolve(request).await;

        if result.is_err() {
            self.record_error();
        }

        result
    }
}

fn weight_from(seconds_since_error: Option<u64>) -> u64 {
    match seconds_since_error {
        Some(secs) if secs < ERROR_MEMORY_SECS => (secs / 60).max(WEIGHT_MIN),
        _ => WEIGHT_MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::bootstrap::Bootstrap;
    use hushdns_domain::Config;

    #[test]
    fn fresh_error_drops_weight_to_the_floor() {
        assert_eq!(weight_from(Some(0)), WEIGHT_MIN);
        assert_eq!(weight_from(Some(59)), WEIGHT_MIN);
    }

    #[test]
    fn weight_grows_one_point_per_minute() {
        assert_eq!(weight_from(Some(60)), 1);
        assert_eq!(weight_from(Some(30 * 60)), 30);
        assert_eq!(weight_from(Some(59 * 60 + 59)), 59);
    }

    #[test]
    fn old_or_absent_errors_give_full_weight() {
        assert_eq!(weight_from(Some(ERROR_MEMORY_SECS)), WEIGHT_MAX);
        assert_eq!(weight_from(None), WEIGHT_MAX);
    }

    #[tokio::test]
    async fn recording_an_error_lowers_the_weight() {
        let bootstrap = Bootstrap::new(&Config::default()).await.unwrap();
        let resolver = UpstreamResolver::unchecked(
            "tcp+udp:127.0.0.1".parse().unwrap(),
            &bootstrap,
            None,
        )
        .unwrap();

        let status = UpstreamStatus::new(Arc::new(resolver));
        assert_eq!(status.weight(), WEIGHT_MAX);

        status.record_error();
        assert_eq!(status.weight(), WEIGHT_MIN);
    }
}
