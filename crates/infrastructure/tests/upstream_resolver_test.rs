use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::RecordType;
use hushdns_domain::{ResolveError, ResponseType, Upstream};
use hushdns_infrastructure::dns::forwarding::{MessageBuilder, ResponseParser};
use hushdns_infrastructure::dns::resolver::{Resolver, UpstreamResolver};
use std::net::IpAddr;
use std::time::Duration;

mod helpers;
use helpers::{answer_message, system_bootstrap, MockUpstream, TIMEOUT_MS};

async fn resolver_for(upstream: Upstream, verify: bool) -> Result<UpstreamResolver, ResolveError> {
    UpstreamResolver::new(
        upstream,
        &system_bootstrap().await,
        Some(Duration::from_millis(TIMEOUT_MS)),
        verify,
    )
    .await
}

fn request() -> hushdns_domain::Request {
    MessageBuilder::build_request("example.com.", RecordType::A).unwrap()
}

#[tokio::test]
async fn resolves_over_udp() {
    let server = MockUpstream::answering([123, 124, 122, 122].into(), 123).await;
    let sut = resolver_for(server.upstream(), false).await.unwrap();

    let request = request();
    let response = sut.resolve(&request).await.unwrap();

    assert_eq!(response.response_type, ResponseType::Resolved);
    assert_eq!(response.message.response_code(), ResponseCode::NoError);
    assert_eq!(response.message.id(), request.message.id());
    assert_eq!(
        ResponseParser::ip_addresses(&response.message),
        vec![IpAddr::from([123, 124, 122, 122])]
    );
    assert_eq!(
        response.resolved_by.as_deref(),
        Some(sut.name().as_str())
    );
}

#[tokio::test]
async fn servfail_is_a_successful_exchange() {
    let server = MockUpstream::with_handler(|query| {
        let mut message = Message::new();
        message.set_id(query.id());
        message.set_message_type(MessageType::Response);
        message.set_op_code(OpCode::Query);
        message.set_response_code(ResponseCode::ServFail);
        for q in query.queries() {
            message.add_query(q.clone());
        }
        Some(message)
    })
    .await;

    let sut = resolver_for(server.upstream(), false).await.unwrap();

    let response = sut.resolve(&request()).await.unwrap();

    assert_eq!(response.response_type, ResponseType::Resolved);
    assert_eq!(response.message.response_code(), ResponseCode::ServFail);
}

#[tokio::test]
async fn truncated_udp_answer_is_retried_over_tcp() {
    let server = MockUpstream::truncating([123, 124, 122, 122].into(), 123).await;
    let sut = resolver_for(server.upstream(), false).await.unwrap();

    let response = sut.resolve(&request()).await.unwrap();

    assert_eq!(
        ResponseParser::ip_addresses(&response.message),
        vec![IpAddr::from([123, 124, 122, 122])]
    );
    assert_eq!(server.hit_count(), 2, "one UDP and one TCP exchange");
}

#[tokio::test]
async fn mismatched_response_id_is_a_transport_error() {
    let server = MockUpstream::with_handler(|query| {
        let mut message = answer_message(query, [1, 2, 3, 4].into(), 60);
        message.set_id(query.id().wrapping_add(1));
        Some(message)
    })
    .await;

    let sut = resolver_for(server.upstream(), false).await.unwrap();

    let result = sut.resolve(&request()).await;

    match result {
        Err(ResolveError::Transport { cause, .. }) => {
            assert!(cause.contains("unexpected message id"), "got: {}", cause);
        }
        other => panic!("expected transport error, got {:?}", other.map(|r| r.reason)),
    }
}

#[tokio::test]
async fn unanswered_query_times_out() {
    let silent = MockUpstream::with_handler(|_| None).await;
    let sut = resolver_for(silent.upstream(), false).await.unwrap();

    let result = sut.resolve(&request()).await;

    assert!(matches!(result, Err(ResolveError::Timeout { .. })));
}

#[tokio::test]
async fn verification_passes_against_answering_upstream() {
    let server = MockUpstream::answering([140, 82, 121, 3].into(), 60).await;

    let result = resolver_for(server.upstream(), true).await;

    assert!(result.is_ok());
}

#[tokio::test]
async fn verification_fails_against_unreachable_upstream() {
    let result = resolver_for("wrong".parse().unwrap(), true).await;

    assert!(matches!(result, Err(ResolveError::Configuration(_))));
}

#[tokio::test]
async fn resolver_contract_identifiers() {
    let server = MockUpstream::answering([123, 124, 122, 122].into(), 123).await;
    let sut = resolver_for(server.upstream(), false).await.unwrap();

    assert_eq!(sut.resolver_type(), "upstream");
    assert_eq!(sut.name(), server.upstream().to_string());
    assert!(sut.is_enabled());
    sut.log_config();
}
