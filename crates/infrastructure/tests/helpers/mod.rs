#![allow(dead_code)]

use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use hushdns_domain::{Config, Upstream, UpstreamsConfig, UPSTREAM_DEFAULT_GROUP};
use hushdns_infrastructure::dns::Bootstrap;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::oneshot;

/// Per-call timeout used throughout the integration tests.
pub const TIMEOUT_MS: u64 = 250;

type Handler = Arc<dyn Fn(&Message) -> Option<Message> + Send + Sync>;

/// In-process DNS server answering on UDP and TCP from the same port.
pub struct MockUpstream {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    shutdown: Vec<oneshot::Sender<()>>,
}

impl MockUpstream {
    /// Answers every query with a single A record.
    pub async fn answering(ip: Ipv4Addr, ttl: u32) -> Self {
        Self::start(
            Arc::new(move |query| Some(answer_message(query, ip, ttl))),
            Duration::ZERO,
            false,
        )
        .await
    }

    /// Sleeps before answering; used for timeout scenarios.
    pub async fn delayed(ip: Ipv4Addr, ttl: u32, delay: Duration) -> Self {
        Self::start(
            Arc::new(move |query| Some(answer_message(query, ip, ttl))),
            delay,
            false,
        )
        .await
    }

    /// UDP answers come back truncated; the real answer is served on TCP.
    pub async fn truncating(ip: Ipv4Addr, ttl: u32) -> Self {
        Self::start(
            Arc::new(move |query| Some(answer_message(query, ip, ttl))),
            Duration::ZERO,
            true,
        )
        .await
    }

    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
    {
        Self::start(Arc::new(handler), Duration::ZERO, false).await
    }

    async fn start(handler: Handler, delay: Duration, truncate_udp: bool) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("bind mock upstream");
        let addr = socket.local_addr().expect("mock upstream addr");
        let socket = Arc::new(socket);

        let listener = TcpListener::bind(addr)
            .await
            .expect("bind mock upstream TCP");

        let hits = Arc::new(AtomicUsize::new(0));
        let (udp_shutdown_tx, mut udp_shutdown_rx) = oneshot::channel();
        let (tcp_shutdown_tx, mut tcp_shutdown_rx) = oneshot::channel();

        let udp_hits = Arc::clone(&hits);
        let udp_handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];

            loop {
                tokio::select! {
                    _ = &mut udp_shutdown_rx => break,
                    result = socket.recv_from(&mut buf) => {
                        let Ok((len, peer)) = result else { break };
                        udp_hits.fetch_add(1, Ordering::SeqCst);

                        let Ok(query) = Message::from_vec(&buf[..len]) else { continue };

                        let handler = Arc::clone(&udp_handler);
                        let socket = Arc::clone(&socket);
                        tokio::spawn(async move {
                            if delay > Duration::ZERO {
                                tokio::time::sleep(delay).await;
                            }

                            let Some(mut response) = handler(&query) else { return };
                            if truncate_udp {
                                response.set_truncated(true);
                                response.take_answers();
                            }

                            if let Ok(bytes) = response.to_vec() {
                                let _ = socket.send_to(&bytes, peer).await;
                            }
                        });
                    }
                }
            }
        });

        let tcp_hits = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut tcp_shutdown_rx => break,
                    result = listener.accept() => {
                        let Ok((mut stream, _)) = result else { break };
                        let handler = Arc::clone(&handler);
                        let hits = Arc::clone(&tcp_hits);

                        tokio::spawn(async move {
                            let mut len_buf = [0u8; 2];
                            if stream.read_exact(&mut len_buf).await.is_err() {
                                return;
                            }

                            let mut query_buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
                            if stream.read_exact(&mut query_buf).await.is_err() {
                                return;
                            }

                            hits.fetch_add(1, Ordering::SeqCst);

                            let Ok(query) = Message::from_vec(&query_buf) else { return };

                            if delay > Duration::ZERO {
                                tokio::time::sleep(delay).await;
                            }

                            let Some(response) = handler(&query) else { return };
                            let Ok(bytes) = response.to_vec() else { return };

                            let _ = stream.write_all(&(bytes.len() as u16).to_be_bytes()).await;
                            let _ = stream.write_all(&bytes).await;
                        });
                    }
                }
            }
        });

        Self {
            addr,
            hits,
            shutdown: vec![udp_shutdown_tx, tcp_shutdown_tx],
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Descriptor pointing at this server.
    pub fn upstream(&self) -> Upstream {
        format!("tcp+udp:{}", self.addr)
            .parse()
            .expect("mock upstream descriptor")
    }

    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        for tx in self.shutdown.drain(..) {
            let _ = tx.send(());
        }
    }
}

/// Response echoing the query with one A record in the answer section.
pub fn answer_message(query: &Message, ip: Ipv4Addr, ttl: u32) -> Message {
    let mut response = Message::new();
    response.set_id(query.id());
    response.set_message_type(MessageType::Response);
    response.set_op_code(OpCode::Query);
    response.set_recursion_desired(query.recursion_desired());
    response.set_recursion_available(true);
    response.set_response_code(ResponseCode::NoError);

    for query in query.queries() {
        response.add_query(query.clone());
    }

    if let Some(question) = query.queries().first() {
        response.add_answer(Record::from_rdata(
            question.name().clone(),
            ttl,
            RData::A(A(ip)),
        ));
    }

    response
}

/// Config with the given upstreams as the default group and the test timeout.
pub fn upstreams_config(upstreams: Vec<Upstream>) -> UpstreamsConfig {
    let mut groups = HashMap::new();
    groups.insert(UPSTREAM_DEFAULT_GROUP.to_string(), upstreams);

    UpstreamsConfig {
        groups,
        timeout: TIMEOUT_MS,
    }
}

/// Bootstrap falling back to the OS resolver, as used by most tests.
pub async fn system_bootstrap() -> Arc<Bootstrap> {
    Bootstrap::new(&Config::default())
        .await
        .expect("system bootstrap")
}
