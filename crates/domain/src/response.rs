use hickory_proto::op::Message;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Answered by a live upstream.
    Resolved,
    Cached,
    Blocked,
    Filtered,
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResponseType::Resolved => "RESOLVED",
            ResponseType::Cached => "CACHED",
            ResponseType::Blocked => "BLOCKED",
            ResponseType::Filtered => "FILTERED",
        })
    }
}

/// Response envelope produced by a resolver.
#[derive(Debug, Clone)]
pub struct Response {
    pub message: Message,
    pub reason: String,
    pub response_type: ResponseType,
    pub resolved_by: Option<Arc<str>>,
}

impl Response {
    pub fn resolved(message: Message, upstream: &str) -> Self {
        Self {
            message,
            reason: format!("RESOLVED ({})", upstream),
            response_type: ResponseType::Resolved,
            resolved_by: Some(Arc::from(upstream)),
        }
    }

    pub fn cached(message: Message) -> Self {
        Self {
            message,
            reason: "CACHED".to_string(),
            response_type: ResponseType::Cached,
            resolved_by: None,
        }
    }

    pub fn filtered(message: Message) -> Self {
        Self {
            message,
            reason: "FILTERED".to_string(),
            response_type: ResponseType::Filtered,
            resolved_by: None,
        }
    }
}
