use crate::dns::resolver::Resolver;
use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode};
use hickory_proto::rr::RecordType;
use hushdns_domain::{Request, ResolveError, Response};
use std::sync::Arc;
use tracing::{debug, info};

/// First stage of the bootstrap chain: only address queries go upstream,
/// anything else gets an empty NOERROR answer.
pub(super) struct QueryTypeFilter {
    inner: Arc<dyn Resolver>,
}

impl QueryTypeFilter {
    pub(super) fn new(inner: Arc<dyn Resolver>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Resolver for QueryTypeFilter {
    async fn resolve(&self, request: &Request) -> Result<Response, ResolveError> {
        match request.question_type() {
            Some(RecordType::A) | Some(RecordType::AAAA) => self.inner.resolve(request).await,
            query_type => {
                debug!(?query_type, "refusing non-address bootstrap query");

                let mut message = Message::new();
                message.set_id(request.message.id());
                message.set_message_type(MessageType::Response);
                message.set_op_code(OpCode::Query);
                for query in request.message.queries() {
                    message.add_query(query.clone());
                }

                Ok(Response::filtered(message))
            }
        }
    }

    fn resolver_type(&self) -> &'static str {
        "filtering"
    }

    fn name(&self) -> String {
        format!("filtering ({})", self.inner.name())
    }

    fn log_config(&self) {
        info!(allowed = "A, AAAA", "bootstrap query type filter");
    }
}
