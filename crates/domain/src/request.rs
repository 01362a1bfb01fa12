use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use crate::config::UPSTREAM_DEFAULT_GROUP;

/// Protocol the client used to reach the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientProtocol {
    Udp,
    Tcp,
    Tls,
    Https,
}

impl fmt::Display for ClientProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClientProtocol::Udp => "UDP",
            ClientProtocol::Tcp => "TCP",
            ClientProtocol::Tls => "TLS",
            ClientProtocol::Https => "HTTPS",
        })
    }
}

/// Query envelope handed through the resolution pipeline.
///
/// Built once by the listener and treated as immutable from then on. The
/// client classifier stamps `group` before the strategies see the request;
/// it defaults to the mandatory `default` group.
#[derive(Debug, Clone)]
pub struct Request {
    pub message: Message,
    pub client_ip: Option<IpAddr>,
    pub client_name: Option<Arc<str>>,
    pub protocol: ClientProtocol,
    pub group: Arc<str>,
}

impl Request {
    pub fn new(message: Message, protocol: ClientProtocol) -> Self {
        Self {
            message,
            client_ip: None,
            client_name: None,
            protocol,
            group: Arc::from(UPSTREAM_DEFAULT_GROUP),
        }
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    pub fn with_client_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<Arc<str>>) -> Self {
        self.group = group.into();
        self
    }

    /// Lowercased name of the first question, if any.
    pub fn question_name(&self) -> Option<String> {
        self.message
            .queries()
            .first()
            .map(|q| q.name().to_utf8().to_lowercase())
    }

    pub fn question_type(&self) -> Option<RecordType> {
        self.message.queries().first().map(|q| q.query_type())
    }
}
