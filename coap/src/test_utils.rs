//! Test utilities for all unit tests in the library.

use crate::endpoint::{Endpoint, EndpointBuilder, EndpointHandler};
use crate::transport::Transport;

use self::transport::MockTransport;

fn attach_mock(endpoint: &Endpoint, transport: &MockTransport) {
    endpoint
        .attach_transport(Transport::new(transport.clone()))
        .expect("failed to attach the mock transport");
}

fn build_test_endpoint() -> Endpoint {
    EndpointBuilder::new().with_name("test").build()
}

pub fn create_test_endpoint() -> (Endpoint, MockTransport) {
    let endpoint = build_test_endpoint();
    let transport = MockTransport::new();

    attach_mock(&endpoint, &transport);

    (endpoint, transport)
}

pub fn create_test_endpoint_with_handler(handler: impl EndpointHandler) -> (Endpoint, MockTransport) {
    let endpoint = EndpointBuilder::new()
        .with_name("test")
        .with_handler(handler)
        .build();
    let transport = MockTransport::new();

    attach_mock(&endpoint, &transport);

    (endpoint, transport)
}

pub mod transaction {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;

    use bytes::Bytes;
    use tokio::sync::watch;
    use tokio::time::{self};
    use tokio::task;

    use super::create_test_endpoint;
    use super::transport::MockTransport;
    use crate::codec;
    use crate::endpoint::Endpoint;
    use crate::message::{Code, Message, MessageType, Request};
    use crate::transaction::client::ClientTransaction;
    use crate::transaction::fsm::{ResponseState, State};
    use crate::transaction::{ACK_TIMEOUT, EXCHANGE_TIMEOUT, ServerTransaction};
    use crate::transport::incoming::{IncomingMessage, IncomingRequest};
    use crate::transport::{Packet, Transport, TransportMessage};

    /// Asserts that the last state received in the [`watch::Receiver`] is equal to the expected.
    #[macro_export]
    macro_rules! assert_eq_state {
        ($watcher:expr, $state:expr $(,)?) => {{
            $crate::test_utils::transaction::wait_state_change(&mut $watcher).await;
            assert_eq!(*$watcher.borrow(), $state);
        }};
        ($watcher:expr, $state:expr, $($arg:tt)+) => {{
            $crate::test_utils::transaction::wait_state_change(&mut $watcher).await;
            assert_eq!(*$watcher.borrow(), $state, $($arg)+);
        }};
    }

    pub async fn wait_state_change<S>(state: &mut watch::Receiver<S>) {
        if let Ok(Err(_err)) = time::timeout(Duration::from_millis(50), state.changed()).await {
            panic!("The channel has been closed")
        }
    }

    pub fn peer_addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)), 5683)
    }

    /// The remote side of a test: injects datagrams into the endpoint as
    /// if received from `addr`.
    #[derive(Clone)]
    pub struct TestPeer {
        pub addr: SocketAddr,
        endpoint: Endpoint,
        transport: Transport,
    }

    impl TestPeer {
        pub fn new(endpoint: &Endpoint, transport: MockTransport) -> Self {
            Self {
                addr: peer_addr(),
                endpoint: endpoint.clone(),
                transport: Transport::new(transport),
            }
        }

        pub async fn deliver(&self, message: &Message) {
            let encoded = codec::encode(message).expect("failed to encode test message");
            self.deliver_raw(&encoded).await;
        }

        pub async fn deliver_raw(&self, datagram: &[u8]) {
            let packet = Packet::new(Bytes::copy_from_slice(datagram), self.addr);
            let message = TransportMessage {
                transport: self.transport.clone(),
                packet,
            };

            self.endpoint.receive_transport_message(message).await;
            task::yield_now().await;
        }

        /// The message as the endpoint would see it when received.
        pub fn incoming(&self, message: Message) -> IncomingMessage {
            let packet = Packet::new(Bytes::new(), self.addr);
            let transport = TransportMessage {
                transport: self.transport.clone(),
                packet,
            };

            IncomingMessage::new(message, transport)
        }
    }

    pub struct TestTimer {
        attempt: u32,
    }

    impl TestTimer {
        pub fn new() -> Self {
            Self { attempt: 1 }
        }

        /// Sleeps past the deadline of a transaction created now.
        pub async fn exchange_timeout(&self) {
            time::sleep(EXCHANGE_TIMEOUT + Duration::from_millis(10)).await;
        }

        /// Sleeps through `n` retransmission periods of a transaction
        /// created now.
        pub async fn wait_for_retransmissions(&mut self, n: usize) {
            for _ in 0..n {
                time::sleep(ACK_TIMEOUT * self.attempt * self.attempt).await;
                self.attempt += 1;
                task::yield_now().await;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub struct ClientTestContext {
        pub client: ClientTransaction,
        pub endpoint: Endpoint,
        pub peer: TestPeer,
        pub transport: MockTransport,
        pub state: watch::Receiver<State>,
    }

    impl ClientTestContext {
        pub async fn setup(request: Request) -> Self {
            let (endpoint, transport) = create_test_endpoint();

            Self::new(request, endpoint, transport).await
        }

        pub async fn setup_failing(request: Request, fail_at: usize) -> Self {
            let endpoint = super::build_test_endpoint();
            let transport = MockTransport::failing_at(fail_at);
            super::attach_mock(&endpoint, &transport);

            Self::new(request, endpoint, transport).await
        }

        async fn new(request: Request, endpoint: Endpoint, transport: MockTransport) -> Self {
            let peer = TestPeer::new(&endpoint, transport.clone());
            let request = request.with_peer(peer.addr);

            let client = endpoint
                .new_client_transaction(request)
                .await
                .expect("failure sending request");

            let mut state = client.subscribe_state();
            time::timeout(
                Duration::from_millis(50),
                state.wait_for(|state| *state != State::Preparing && *state != State::Registered),
            )
            .await
            .expect("transaction did not send its message")
            .expect("transaction state channel closed");

            assert_eq!(transport.sent_count(), 1, "the message should be sent once");

            Self {
                client,
                endpoint,
                peer,
                transport,
                state,
            }
        }
    }

    pub struct ServerTestContext {
        pub server: ServerTransaction,
        pub request: IncomingRequest,
        pub endpoint: Endpoint,
        pub peer: TestPeer,
        pub transport: MockTransport,
        pub state: watch::Receiver<ResponseState>,
    }

    impl ServerTestContext {
        pub fn setup(msg_type: MessageType) -> Self {
            let (endpoint, transport) = create_test_endpoint();
            let peer = TestPeer::new(&endpoint, transport.clone());

            let mut message = Message::new(msg_type, Code::GET, 0x7d34).with_token(vec![0x71, 0x0c, 0xbe, 0xef]);
            message.options.set_path("/one").expect("valid path");
            let request = peer.incoming(message);

            let server = ServerTransaction::new(&request, endpoint.clone());
            let state = server.subscribe_state().expect("lock poisoned");

            Self {
                server,
                request,
                endpoint,
                peer,
                transport,
                state,
            }
        }
    }
}

pub mod transport {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use crate::codec;
    use crate::message::Message;
    use crate::transport::CoapTransport;

    struct SentDatagram {
        buf: Vec<u8>,
        #[allow(dead_code)]
        target: SocketAddr,
        at: Instant,
    }

    /// A mock transport, for testing purposes
    #[derive(Clone)]
    pub struct MockTransport {
        sent: Arc<Mutex<Vec<SentDatagram>>>,
        addr: SocketAddr,
        fail_at: Option<usize>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                sent: Default::default(),
                addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), crate::DEFAULT_PORT),
                fail_at: None,
            }
        }

        /// A transport whose `fail_at`-th send fails.
        pub fn failing_at(fail_at: usize) -> Self {
            Self {
                fail_at: Some(fail_at),
                ..Self::new()
            }
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        pub fn sent_buffers(&self) -> Vec<Vec<u8>> {
            self.sent.lock().unwrap().iter().map(|sent| sent.buf.clone()).collect()
        }

        pub fn sent_at(&self) -> Vec<Instant> {
            self.sent.lock().unwrap().iter().map(|sent| sent.at).collect()
        }

        pub fn last_buffer(&self) -> Option<Vec<u8>> {
            let guard = self.sent.lock().unwrap();
            guard.last().map(|sent| sent.buf.clone())
        }

        pub fn last_message(&self) -> Option<Message> {
            self.last_buffer().map(|buf| codec::decode(&buf).unwrap())
        }

        fn push_msg(&self, buf: &[u8], target: SocketAddr) -> usize {
            let mut guard = self.sent.lock().unwrap();
            guard.push(SentDatagram {
                buf: buf.to_vec(),
                target,
                at: Instant::now(),
            });
            guard.len()
        }
    }

    #[async_trait::async_trait]
    impl CoapTransport for MockTransport {
        async fn send_msg(&self, buf: &[u8], address: &SocketAddr) -> crate::Result<usize> {
            let current_count = self.push_msg(buf, *address);

            if let Some(fail_at) = self.fail_at
                && fail_at == current_count
            {
                return Err(crate::Error::TransportError("Simulated failure".into()));
            }

            Ok(buf.len())
        }

        fn local_addr(&self) -> SocketAddr {
            self.addr
        }
    }
}
