use hickory_proto::op::Message;
use hickory_proto::rr::RData;
use hushdns_domain::ResolveError;
use std::net::IpAddr;

/// Parses raw wire responses and extracts the pieces the core cares about.
pub struct ResponseParser;

impl ResponseParser {
    pub fn parse(bytes: &[u8]) -> Result<Message, ResolveError> {
        Message::from_vec(bytes)
            .map_err(|e| ResolveError::Protocol(format!("failed to parse DNS response: {}", e)))
    }

    /// All A/AAAA addresses in the answer section.
    pub fn ip_addresses(message: &Message) -> Vec<IpAddr> {
        message
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                RData::A(a) => Some(IpAddr::V4(a.0)),
                RData::AAAA(aaaa) => Some(IpAddr::V6(aaaa.0)),
                _ => None,
            })
            .collect()
    }

    pub fn min_ttl(message: &Message) -> Option<u32> {
        message.answers().iter().map(|record| record.ttl()).min()
    }
}
