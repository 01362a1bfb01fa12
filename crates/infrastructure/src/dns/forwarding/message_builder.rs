use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query};
use hickory_proto::rr::{DNSClass, Name, RecordType};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use hushdns_domain::{ClientProtocol, Request, ResolveError};
use std::str::FromStr;

pub struct MessageBuilder;

impl MessageBuilder {
    /// Build a recursion-desired query with EDNS(0) and a random ID.
    pub fn build_query(name: &str, record_type: RecordType) -> Result<Message, ResolveError> {
        let name = Name::from_str(name)
            .map_err(|e| ResolveError::Protocol(format!("invalid name '{}': {}", name, e)))?;

        let mut query = Query::new();
        query.set_name(name);
        query.set_query_type(record_type);
        query.set_query_class(DNSClass::IN);

        let mut message = Message::new();
        message.set_id(fastrand::u16(..));
        message.set_message_type(MessageType::Query);
        message.set_op_code(OpCode::Query);
        message.set_recursion_desired(true);
        message.add_query(query);
        message.set_edns(Self::default_edns());

        Ok(message)
    }

    /// Request envelope for internally issued lookups (self tests, bootstrap).
    pub fn build_request(name: &str, record_type: RecordType) -> Result<Request, ResolveError> {
        Ok(Request::new(
            Self::build_query(name, record_type)?,
            ClientProtocol::Udp,
        ))
    }

    pub fn serialize(message: &Message) -> Result<Vec<u8>, ResolveError> {
        let mut buf = Vec::with_capacity(512);
        let mut encoder = BinEncoder::new(&mut buf);

        message.emit(&mut encoder).map_err(|e| {
            ResolveError::Protocol(format!("failed to serialize DNS message: {}", e))
        })?;

        Ok(buf)
    }

    fn default_edns() -> Edns {
        let mut edns = Edns::new();
        edns.set_max_payload(4096);
        edns.set_version(0);
        edns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_carries_question_and_recursion_flag() {
        let message = MessageBuilder::build_query("example.com.", RecordType::A).unwrap();

        assert_eq!(message.queries().len(), 1);
        assert_eq!(message.queries()[0].query_type(), RecordType::A);
        assert!(message.recursion_desired());
    }

    #[test]
    fn serialized_query_round_trips() {
        let message = MessageBuilder::build_query("example.com.", RecordType::AAAA).unwrap();
        let bytes = MessageBuilder::serialize(&message).unwrap();

        let parsed = Message::from_vec(&bytes).unwrap();
        assert_eq!(parsed.id(), message.id());
        assert_eq!(parsed.queries()[0].query_type(), RecordType::AAAA);
    }

    #[test]
    fn request_defaults_to_the_default_group() {
        let request = MessageBuilder::build_request("example.com.", RecordType::A).unwrap();
        assert_eq!(&*request.group, "default");
    }
}
