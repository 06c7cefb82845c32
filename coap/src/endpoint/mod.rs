#![warn(missing_docs)]
//! CoAP Endpoint

mod builder;
mod config;
mod handler;

pub use builder::EndpointBuilder;
pub use config::EndpointConfig;
pub use handler::EndpointHandler;

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use bytes::Bytes;
use tokio::net::ToSocketAddrs;
use tokio::sync::watch;
use utils::DnsResolver;

use crate::codec;
use crate::error::{Error, Result, TransactionError};
use crate::message::{Code, Message, MessageType, Request};
use crate::transaction::{ClientTransaction, ResponseState, ServerTransaction, TransactionKey, TransactionManager};
use crate::transport::incoming::{IncomingMessage, IncomingRequest, IncomingResponse};
use crate::transport::outgoing::OutgoingMessage;
use crate::transport::udp::UdpTransport;
use crate::transport::{CoapTransport, Transport, TransportMessage};

struct EndpointInner {
    /// The transport datagrams are sent through.
    transport: Mutex<Option<Transport>>,
    /// The name of the endpoint.
    name: String,
    /// Timeouts and limits.
    config: EndpointConfig,
    /// The resolver for DNS lookups, created on first use.
    resolver: OnceLock<DnsResolver>,
    /// Live transactions and recent responses.
    transactions: TransactionManager,
    /// The application handler for inbound requests.
    handler: Option<Box<dyn EndpointHandler>>,
    /// Next message-id to allocate.
    next_message_id: AtomicU16,
    /// Set once the endpoint shuts down.
    shutdown: watch::Sender<bool>,
}

/// A CoAP endpoint.
///
/// Sends requests and tracks them until answered, and dispatches inbound
/// requests to its [`EndpointHandler`]. Cloning is cheap and every clone
/// drives the same endpoint.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

impl Endpoint {
    /// Returns a EndpointBuilder to create an `Endpoint`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use coap::*;
    /// let endpoint = Endpoint::builder()
    ///     .with_name("My Endpoint")
    ///     .build();
    /// ```
    pub fn builder() -> EndpointBuilder {
        EndpointBuilder::default()
    }

    /// Get the endpoint name.
    pub fn get_name(&self) -> &String {
        &self.inner.name
    }

    /// Get the endpoint configuration.
    pub fn config(&self) -> &EndpointConfig {
        &self.inner.config
    }

    /// Binds a UDP socket to `addr` and starts receiving on it.
    ///
    /// Returns the bound address, which tells the port picked when `addr`
    /// asks for port 0.
    pub async fn start_udp_transport<A: ToSocketAddrs>(&self, addr: A) -> Result<SocketAddr> {
        let udp = UdpTransport::bind(addr).await?;
        let local_addr = udp.local_addr();

        self.attach_transport(Transport::new(udp.clone()))?;
        log::info!("CoAP UDP transport started, bound to: {}", local_addr);

        tokio::spawn(udp.receive_datagram(self.clone()));
        tokio::spawn(self.clone().sweep_responses());

        Ok(local_addr)
    }

    pub(crate) fn attach_transport(&self, transport: Transport) -> Result<()> {
        if self.is_shutdown() {
            return Err(TransactionError::Shutdown.into());
        }
        let mut slot = self.inner.transport.lock().map_err(|_| Error::PoisonedLock)?;
        if slot.is_some() {
            return Err(Error::TransportError("a transport is already started".into()));
        }
        *slot = Some(transport);

        Ok(())
    }

    fn transport(&self) -> Result<Transport> {
        let slot = self.inner.transport.lock().map_err(|_| Error::PoisonedLock)?;

        match slot.as_ref() {
            Some(transport) => Ok(transport.clone()),
            None if self.is_shutdown() => Err(TransactionError::Shutdown.into()),
            None => Err(Error::TransportError("no transport started".into())),
        }
    }

    /// The address the endpoint receives on, once a transport is started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport().ok().map(|transport| transport.local_addr())
    }

    /// Sends `request` and waits for its response.
    ///
    /// Confirmable messages and requests are tracked until answered and
    /// return `Some(response)`. Anything else is sent once with
    /// [`send_message`](Self::send_message) and returns `None` as soon as
    /// it left the transport.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use coap::*;
    /// # use coap::message::Request;
    /// # async fn run(endpoint: Endpoint) -> Result<()> {
    /// let response = endpoint
    ///     .send_request(Request::get("/one").with_host("127.0.0.1"))
    ///     .await?;
    /// if let Some(response) = response {
    ///     println!("{}", String::from_utf8_lossy(response.payload()));
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn send_request(&self, request: Request) -> Result<Option<IncomingResponse>> {
        if !request.is_trackable() {
            self.send_message(request).await?;
            return Ok(None);
        }

        let response = self
            .new_client_transaction(request)
            .await?
            .receive_response()
            .await?;

        Ok(Some(response))
    }

    /// Sends `request` in a new transaction, without waiting for its
    /// outcome.
    pub async fn new_client_transaction(&self, request: Request) -> Result<ClientTransaction> {
        if !request.is_trackable() {
            return Err(Error::PreparationError(format!(
                "a non-confirmable {} cannot be tracked",
                request.code()
            )));
        }

        ClientTransaction::send_request(request, self.clone()).await
    }

    /// Sends `request` once, without tracking it.
    pub async fn send_message(&self, request: Request) -> Result<()> {
        let mut outgoing = self.prepare_outgoing(request).await?;

        self.send_outgoing(&mut outgoing).await
    }

    /// Stops the endpoint.
    ///
    /// The receive loop exits, the transport is released and every live
    /// transaction fails with [`TransactionError::Shutdown`].
    pub fn shutdown(&self) {
        if self.inner.shutdown.send_replace(true) {
            return;
        }
        if let Ok(mut slot) = self.inner.transport.lock() {
            slot.take();
        }
        match self.transactions().clear() {
            Ok(count) => log::info!(
                "Endpoint {} shut down, {} transaction keys dropped",
                self.inner.name,
                count
            ),
            Err(err) => log::error!("Failed to clear transactions: {}", err),
        }
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    pub fn is_shutdown(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    pub(crate) fn transactions(&self) -> &TransactionManager {
        &self.inner.transactions
    }

    /// Allocates the next message-id; ids wrap around after 65535.
    pub fn next_message_id(&self) -> u16 {
        self.inner.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Generates a random token of the configured length.
    pub fn generate_token(&self) -> Bytes {
        crate::generate_token(self.config().token_length)
    }

    fn dns_resolver(&self) -> &DnsResolver {
        self.inner.resolver.get_or_init(DnsResolver::default)
    }

    pub(crate) async fn dns_lookup(&self, host: &str) -> Result<IpAddr> {
        self.dns_resolver()
            .resolve(host)
            .await
            .map_err(|err| Error::PreparationError(format!("failed to resolve {host}: {err}")))
    }

    /// Fills in the defaults of `request` and resolves its destination.
    pub(crate) async fn prepare_outgoing(&self, request: Request) -> Result<OutgoingMessage> {
        if self.is_shutdown() {
            return Err(TransactionError::Shutdown.into());
        }
        let trackable = request.is_trackable();
        let Request {
            code,
            msg_type,
            path,
            host,
            port,
            peer,
            mut options,
            payload,
            message_id,
            token,
            ..
        } = request;

        if let Some(path) = path {
            options.set_path(&path)?;
        }

        let target = match (peer, host) {
            (Some(peer), _) => peer,
            (None, Some(host)) => {
                let port = port.unwrap_or(self.config().default_port);
                let ip = match utils::parse_ip_literal(&host) {
                    Some(ip) => ip,
                    None => {
                        options.set_host(&host);
                        self.dns_lookup(&host).await?
                    }
                };
                SocketAddr::new(ip, port)
            }
            (None, None) => return Err(Error::PreparationError("no destination".into())),
        };

        let token = match token {
            Some(token) => token,
            None if trackable => self.generate_token(),
            None => Bytes::new(),
        };
        let message = Message {
            msg_type,
            code,
            message_id: message_id.unwrap_or_else(|| self.next_message_id()),
            token,
            options,
            payload: payload.filter(|payload| !payload.is_empty()),
        };

        Ok(OutgoingMessage::new(message, target))
    }

    pub(crate) async fn send_outgoing(&self, outgoing: &mut OutgoingMessage) -> Result<()> {
        let encoded = outgoing.encode()?;

        log::debug!("=> {} to /{}", outgoing.message, outgoing.target);

        self.send_raw(&encoded, &outgoing.target).await
    }

    pub(crate) async fn send_raw(&self, buf: &[u8], target: &SocketAddr) -> Result<()> {
        let transport = self.transport()?;

        transport.send_msg(buf, target).await?;

        Ok(())
    }

    async fn send_message_to(&self, message: &Message, target: &SocketAddr) -> Result<()> {
        let encoded = codec::encode(message)?;

        log::debug!("=> {} to /{}", message, target);

        self.send_raw(&encoded, target).await
    }

    async fn sweep_responses(self) {
        let mut shutdown = self.shutdown_signal();
        let mut interval = tokio::time::interval(self.config().sweep_interval);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => match self.transactions().sweep_responses() {
                    Ok(0) => {}
                    Ok(count) => log::trace!("Evicted {} expired responses", count),
                    Err(err) => log::error!("Failed to sweep responses: {}", err),
                },
            }
        }
    }

    /// Dispatches one received datagram; datagrams are processed one at a
    /// time, in arrival order.
    pub(crate) async fn receive_transport_message(&self, message: TransportMessage) {
        if let Err(err) = self.process_transport_message(message).await {
            log::error!("Error on process transport message: {}", err);
        }
    }

    async fn process_transport_message(&self, transport_message: TransportMessage) -> Result<()> {
        let Ok(message) = transport_message.parse() else {
            return Ok(());
        };
        let incoming = IncomingMessage::new(message, transport_message);

        if incoming.is_request() {
            self.on_request(incoming).await
        } else {
            self.on_response(incoming).await
        }
    }

    async fn on_request(&self, request: IncomingRequest) -> Result<()> {
        let source = request.source();

        log::debug!("<= Request {} from /{}", request.message, source);

        if matches!(request.msg_type, MessageType::Acknowledgement | MessageType::Reset) {
            log::info!("Ignoring request carried in a {} from /{}", request.msg_type, source);
            return Ok(());
        }

        let key = TransactionKey::from_message_id(request.message_id, &source);

        if let Some(pending) = self.transactions().cached_response(&key)? {
            match pending.replay()? {
                Some(replay) => {
                    log::debug!("Duplicate request mid={} from /{}, replaying", request.message_id, source);
                    self.send_raw(&replay, &source).await?;
                }
                None => log::debug!(
                    "Duplicate request mid={} from /{} not answered yet",
                    request.message_id,
                    source
                ),
            }
            return Ok(());
        }

        let response = ServerTransaction::new(&request, self.clone());
        let pending = response.pending();
        let mut answered = pending.subscribe_state()?;

        self.transactions().cache_response(key, response.pending())?;

        tokio::spawn({
            let endpoint = self.clone();
            async move { endpoint.handle_request(request, response).await }
        });

        let window = self.config().piggyback_window;
        let endpoint = self.clone();
        tokio::spawn(async move {
            if tokio::time::timeout(window, wait_answered(&mut answered)).await.is_ok() {
                return;
            }
            match pending.defer(&endpoint).await {
                Ok(()) | Err(Error::AlreadySent) => {}
                Err(err) => log::warn!("Failed to acknowledge request from /{}: {}", pending.peer(), err),
            }
        });

        Ok(())
    }

    async fn handle_request(self, request: IncomingRequest, mut response: ServerTransaction) {
        match self.inner.handler {
            Some(ref handler) => handler.handle(request, response, &self).await,
            None => {
                log::debug!(
                    "Request {} from /{} was unhandled",
                    request.message,
                    request.source()
                );
                response.set_code(Code::NOT_IMPLEMENTED);
                if let Err(err) = response.send().await {
                    log::warn!("Failed to answer /{}: {}", request.source(), err);
                }
            }
        }
    }

    async fn on_response(&self, response: IncomingResponse) -> Result<()> {
        let source = response.source();

        log::debug!("<= {} from /{}", response.message, source);

        if response.is_ping() {
            return self.send_message_to(&Message::reset(response.message_id), &source).await;
        }

        let message_id_key = TransactionKey::from_message_id(response.message_id, &source);
        let token_key = TransactionKey::from_token(&response.token, &source);

        // Acknowledgements and resets echo our message-id; confirmable and
        // non-confirmable responses carry the peer's own, matched by token.
        let keys = match (response.msg_type, response.is_empty()) {
            (MessageType::Acknowledgement | MessageType::Reset, true) => vec![message_id_key],
            (MessageType::Acknowledgement | MessageType::Reset, false) => vec![message_id_key, token_key],
            _ => vec![token_key],
        };

        let Some(channel) = self.transactions().find(&keys)? else {
            if response.is_confirmable() && self.transactions().recently_finished(&keys)? {
                log::debug!(
                    "Duplicate {} from /{} for a finished transaction acknowledged",
                    response.message,
                    source
                );
                return self
                    .send_message_to(&Message::empty_ack(response.message_id), &source)
                    .await;
            }
            if response.is_reset() {
                log::info!("Unmatched reset mid={} from /{} dropped", response.message_id, source);
            } else {
                log::info!(
                    "Response {} from /{} was unhandled by any transaction",
                    response.message,
                    source
                );
            }
            return Ok(());
        };

        if response.is_confirmable() {
            self.send_message_to(&Message::empty_ack(response.message_id), &source)
                .await?;
        }

        if channel.try_send(response).is_err() {
            log::debug!("Transaction already finalized, message from /{} dropped", source);
        }

        Ok(())
    }
}

async fn wait_answered(state: &mut watch::Receiver<ResponseState>) {
    while *state.borrow_and_update() == ResponseState::New {
        if state.changed().await.is_err() {
            return;
        }
    }
}
