//! UDP transport implementation for CoAP.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{ToSocketAddrs, UdpSocket};

use super::{CoapTransport, MAX_DATAGRAM_SIZE, Packet, Transport, TransportMessage};
use crate::Endpoint;
use crate::error::Result;

#[derive(Debug)]
struct UdpInner {
    sock: UdpSocket,
    addr: SocketAddr,
}

/// UDP transport implementation.
///
/// The [`UdpTransport`] wraps a [`UdpSocket`] and exposes methods for
/// sending and receiving CoAP datagrams. Reliability is provided by the
/// transaction layer on top of it.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    inner: Arc<UdpInner>,
}

impl UdpTransport {
    /// Creates a new UDP transport bound to the specified address.
    pub async fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let sock = UdpSocket::bind(addr).await?;
        let addr = sock.local_addr()?;
        Ok(Self {
            inner: Arc::new(UdpInner { sock, addr }),
        })
    }

    /// Receive UDP datagrams on this transport until the endpoint shuts
    /// down. Each datagram is fully dispatched before the next is read.
    pub(crate) async fn receive_datagram(self, endpoint: Endpoint) -> Result<()> {
        let udp_tp = Transport::new(self.clone());
        let mut shutdown = endpoint.shutdown_signal();
        // Buffer to recv packet.
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            let received = tokio::select! {
                changed = shutdown.changed() => match changed {
                    Ok(()) => continue,
                    Err(_) => break,
                },
                received = self.inner.sock.recv_from(&mut buf) => received,
            };
            let (len, source) = match received {
                Ok(received) => received,
                Err(err) => {
                    log::warn!("Failed to receive on {}: {}", self.inner.addr, err);
                    continue;
                }
            };

            if len == 0 {
                log::error!("[{}] Got an empty datagram from the peer.", source);
                continue;
            }
            // Copy buf.
            let datagram = bytes::Bytes::copy_from_slice(&buf[..len]);
            let packet = Packet::new(datagram, source);

            let msg = TransportMessage {
                transport: udp_tp.clone(),
                packet,
            };

            endpoint.receive_transport_message(msg).await;
        }
        log::debug!("Stopped receiving on udp {}", self.inner.addr);

        Ok(())
    }
}

#[async_trait::async_trait]
impl CoapTransport for UdpTransport {
    async fn send_msg(&self, buf: &[u8], addr: &SocketAddr) -> Result<usize> {
        Ok(self.inner.sock.send_to(buf, addr).await?)
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.addr
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::{Error, TransactionError};
    use crate::message::{Code, MessageType, Request};
    use crate::router::{Resource, Router};
    use crate::transaction::ServerTransaction;
    use crate::transport::incoming::IncomingRequest;

    struct Deferred;

    #[async_trait]
    impl Resource for Deferred {
        async fn handle(&self, _: &IncomingRequest, response: &mut ServerTransaction) {
            response.defer().await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
            response.set_payload("TWO!!!");
        }
    }

    async fn start_server() -> (Endpoint, SocketAddr) {
        let router = Router::new()
            .get("/one", |_: &IncomingRequest, response: &mut ServerTransaction| {
                response.set_payload("ONE!!!");
            })
            .get("/two", Deferred);
        let server = Endpoint::builder()
            .with_name("server")
            .with_handler(router)
            .build();
        let addr = server.start_udp_transport("127.0.0.1:0").await.unwrap();

        (server, addr)
    }

    async fn start_client() -> Endpoint {
        let client = Endpoint::builder().with_name("client").build();
        client.start_udp_transport("127.0.0.1:0").await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_piggybacked_response_over_loopback() {
        let (server, addr) = start_server().await;
        let client = start_client().await;

        let request = Request::get("/one")
            .with_host("127.0.0.1")
            .with_port(addr.port());
        let response = client.send_request(request).await.unwrap().unwrap();

        assert_eq!(response.msg_type, MessageType::Acknowledgement);
        assert_eq!(response.code, Code::CONTENT);
        assert_eq!(response.payload(), b"ONE!!!");
        assert_eq!(response.source(), addr);

        client.shutdown();
        server.shutdown();
    }

    #[tokio::test]
    async fn test_separate_response_over_loopback() {
        let (server, addr) = start_server().await;
        let client = start_client().await;

        let response = client
            .send_request(Request::get("/two").with_peer(addr))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(response.msg_type, MessageType::Confirmable);
        assert_eq!(response.payload(), b"TWO!!!");

        // The separate response was acknowledged, nothing is left pending.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(server.transactions().is_empty());
        assert!(client.transactions().is_empty());

        client.shutdown();
        server.shutdown();
    }

    #[tokio::test]
    async fn test_retransmitted_datagram_gets_the_same_answer() {
        let (server, addr) = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        // GET coap://concord.orion.deepdarc.com/security/p-1/
        let request = [
            0x42, 0x01, 0x74, 0xaa, 0x73, 0xaa, 0x3d, 0x0d, 0x63, 0x6f, 0x6e, 0x63, 0x6f, 0x72, 0x64,
            0x2e, 0x6f, 0x72, 0x69, 0x6f, 0x6e, 0x2e, 0x64, 0x65, 0x65, 0x70, 0x64, 0x61, 0x72, 0x63,
            0x2e, 0x63, 0x6f, 0x6d, 0x88, 0x73, 0x65, 0x63, 0x75, 0x72, 0x69, 0x74, 0x79, 0x03, 0x70,
            0x2d, 0x31, 0x00, 0x51, 0x28,
        ];
        let mut first = [0u8; MAX_DATAGRAM_SIZE];
        let mut second = [0u8; MAX_DATAGRAM_SIZE];

        socket.send_to(&request, addr).await.unwrap();
        let (first_len, _) = socket.recv_from(&mut first).await.unwrap();
        socket.send_to(&request, addr).await.unwrap();
        let (second_len, _) = socket.recv_from(&mut second).await.unwrap();

        assert_eq!(first[..first_len], second[..second_len]);
        let answer = crate::codec::decode(&first[..first_len]).unwrap();
        assert_eq!(answer.msg_type, MessageType::Acknowledgement);
        assert_eq!(answer.message_id, 0x74aa);
        assert_eq!(&answer.token[..], &[0x73, 0xaa]);
        assert_eq!(answer.code, Code::NOT_FOUND);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_malformed_datagram_is_ignored() {
        let (server, addr) = start_server().await;
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        socket.send_to(&[0x40, 0x01], addr).await.unwrap();
        socket.send_to(&[0x40, 0x01, 0x00, 0x01, 0xff], addr).await.unwrap();

        let client = start_client().await;
        let response = client
            .send_request(Request::get("/one").with_peer(addr))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.payload(), b"ONE!!!");

        client.shutdown();
        server.shutdown();
    }

    #[tokio::test]
    async fn test_no_answer_after_shutdown() {
        let (server, addr) = start_server().await;
        let client = start_client().await;

        server.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let request = Request::get("/one")
            .with_peer(addr)
            .with_timeout(Duration::from_millis(300));
        let result = client.send_request(request).await;

        assert_matches!(result, Err(Error::TransactionError(TransactionError::Timeout)));

        client.shutdown();
    }
}
