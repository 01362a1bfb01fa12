use crate::dns::forwarding::{MessageBuilder, ResponseParser};
use crate::dns::resolver::Resolver;
use async_trait::async_trait;
use dashmap::DashMap;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::RecordType;
use hushdns_domain::{Request, ResolveError, Response};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lower bound on how long positive answers are kept. Bootstrap lookups feed
/// long-lived connections; short upstream TTLs would only cause churn.
const MIN_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// A hit this close to expiry triggers a background refresh, so a user
/// request never has to wait for the server lookup and its own query
/// back to back.
const PREFETCH_WINDOW: Duration = Duration::from_secs(120);

#[derive(Hash, PartialEq, Eq, Clone)]
struct CacheKey {
    name: String,
    query_type: RecordType,
}

#[derive(Clone)]
struct CachedAnswer {
    message: Message,
    expires_at: Instant,
    refreshing: Arc<AtomicBool>,
}

/// Small positive cache in front of the bootstrap upstreams.
pub(super) struct CachingResolver {
    inner: Arc<dyn Resolver>,
    entries: Arc<DashMap<CacheKey, CachedAnswer>>,
}

impl CachingResolver {
    pub(super) fn new(inner: Arc<dyn Resolver>) -> Self {
        Self {
            inner,
            entries: Arc::new(DashMap::new()),
        }
    }

    fn key_for(request: &Request) -> Option<CacheKey> {
        Some(CacheKey {
            name: request.question_name()?,
            query_type: request.question_type()?,
        })
    }

    fn store(entries: &DashMap<CacheKey, CachedAnswer>, key: CacheKey, response: &Response) {
        if response.message.response_code() != ResponseCode::NoError
            || response.message.answers().is_empty()
        {
            return;
        }

        let ttl = ResponseParser::min_ttl(&response.message)
            .map(|secs| Duration::from_secs(secs.into()))
            .unwrap_or(MIN_CACHE_TTL)
            .max(MIN_CACHE_TTL);

        entries.insert(
            key,
            CachedAnswer {
                message: response.message.clone(),
                expires_at: Instant::now() + ttl,
                refreshing: Arc::new(AtomicBool::new(false)),
            },
        );
    }

    fn spawn_refresh(&self, key: CacheKey, guard: Arc<AtomicBool>) {
        let inner = Arc::clone(&self.inner);
        let entries = Arc::clone(&self.entries);

        tokio::spawn(async move {
            let request = match MessageBuilder::build_request(&key.name, key.query_type) {
                Ok(request) => request,
                Err(_) => return,
            };

            match inner.resolve(&request).await {
                Ok(response) => {
                    debug!(name = %key.name, "bootstrap prefetch refreshed entry");
                    Self::store(&entries, key, &response);
                }
                Err(e) => warn!(name = %key.name, error = %e, "bootstrap prefetch failed"),
            }

            guard.store(false, Ordering::Release);
        });
    }
}

#[async_trait]
impl Resolver for CachingResolver {
    async fn resolve(&self, request: &Request) -> Result<Response, ResolveError> {
        let Some(key) = Self::key_for(request) else {
            return self.inner.resolve(request).await;
        };

        let hit = self.entries.get(&key).map(|entry| entry.clone());
        if let Some(hit) = hit {
            let now = Instant::now();
            if hit.expires_at > now {
                if hit.expires_at - now < PREFETCH_WINDOW
                    && !hit.refreshing.swap(true, Ordering::AcqRel)
                {
                    self.spawn_refresh(key.clone(), Arc::clone(&hit.refreshing));
                }

                debug!(name = %key.name, query_type = %key.query_type, "bootstrap cache hit");

                let mut message = hit.message.clone();
                message.set_id(request.message.id());
                return Ok(Response::cached(message));
            }
        }

        let response = self.inner.resolve(request).await?;
        Self::store(&self.entries, key, &response);
        Ok(response)
    }

    fn resolver_type(&self) -> &'static str {
        "caching"
    }

    fn name(&self) -> String {
        format!("caching ({})", self.inner.name())
    }

    fn log_config(&self) {
        info!(
            min_ttl_secs = MIN_CACHE_TTL.as_secs(),
            prefetch = true,
            "bootstrap cache"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_proto::op::{MessageType, OpCode};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Name, RData, Record};
    use std::str::FromStr;
    use std::sync::atomic::AtomicUsize;

    struct Counting {
        hits: AtomicUsize,
        rcode: ResponseCode,
    }

    impl Counting {
        fn answering() -> Self {
            Self {
                hits: AtomicUsize::new(0),
                rcode: ResponseCode::NoError,
            }
        }

        fn failing() -> Self {
            Self {
                hits: AtomicUsize::new(0),
                rcode: ResponseCode::ServFail,
            }
        }
    }

    #[async_trait]
    impl Resolver for Counting {
        async fn resolve(&self, request: &Request) -> Result<Response, ResolveError> {
            self.hits.fetch_add(1, Ordering::SeqCst);

            let mut message = Message::new();
            message.set_id(request.message.id());
            message.set_message_type(MessageType::Response);
            message.set_op_code(OpCode::Query);
            message.set_response_code(self.rcode);
            if self.rcode == ResponseCode::NoError {
                message.add_answer(Record::from_rdata(
                    Name::from_str("example.com.").unwrap(),
                    30,
                    RData::A(A([1, 2, 3, 4].into())),
                ));
            }

            Ok(Response::resolved(message, "mock"))
        }

        fn resolver_type(&self) -> &'static str {
            "counting"
        }

        fn name(&self) -> String {
            "counting".to_string()
        }

        fn log_config(&self) {}
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let inner = Arc::new(Counting::answering());
        let cache = CachingResolver::new(Arc::clone(&inner) as Arc<dyn Resolver>);

        let request = MessageBuilder::build_request("example.com.", RecordType::A).unwrap();

        let first = cache.resolve(&request).await.unwrap();
        let second = cache.resolve(&request).await.unwrap();

        assert_eq!(first.response_type, hushdns_domain::ResponseType::Resolved);
        assert_eq!(second.response_type, hushdns_domain::ResponseType::Cached);
        assert_eq!(inner.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_answer_echoes_the_request_id() {
        let inner = Arc::new(Counting::answering());
        let cache = CachingResolver::new(Arc::clone(&inner) as Arc<dyn Resolver>);

        let first = MessageBuilder::build_request("example.com.", RecordType::A).unwrap();
        cache.resolve(&first).await.unwrap();

        let second = MessageBuilder::build_request("example.com.", RecordType::A).unwrap();
        let response = cache.resolve(&second).await.unwrap();

        assert_eq!(response.message.id(), second.message.id());
    }

    #[tokio::test]
    async fn error_responses_are_not_cached() {
        let inner = Arc::new(Counting::failing());
        let cache = CachingResolver::new(Arc::clone(&inner) as Arc<dyn Resolver>);

        let request = MessageBuilder::build_request("example.com.", RecordType::A).unwrap();

        cache.resolve(&request).await.unwrap();
        cache.resolve(&request).await.unwrap();

        assert_eq!(inner.hits.load(Ordering::SeqCst), 2);
    }
}
