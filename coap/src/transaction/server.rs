use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::codec;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::message::{Code, Message, MessageType, Options};
use crate::transaction::client::ClientTransaction;
use crate::transaction::fsm::{ResponseState, StateMachine};
use crate::transport::incoming::IncomingRequest;
use crate::transport::outgoing::OutgoingMessage;

/// The response to one inbound request, shared by the application handle
/// and the dispatcher.
///
/// Keeps the bytes to send again when the peer retransmits the request:
/// the piggybacked answer, or the empty acknowledgement once deferred.
pub(crate) struct PendingResponse {
    peer: SocketAddr,
    request_id: u16,
    request_type: MessageType,
    token: Bytes,
    inner: Mutex<PendingInner>,
}

struct PendingInner {
    state_machine: StateMachine<ResponseState>,
    replay: Option<Bytes>,
    separate_id: Option<u16>,
}

impl PendingResponse {
    pub(crate) fn new(peer: SocketAddr, request_id: u16, request_type: MessageType, token: Bytes) -> Self {
        Self {
            peer,
            request_id,
            request_type,
            token,
            inner: Mutex::new(PendingInner {
                state_machine: StateMachine::new(ResponseState::New),
                replay: None,
                separate_id: None,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, PendingInner>> {
        self.inner.lock().map_err(|_| Error::PoisonedLock)
    }

    pub(crate) fn state(&self) -> Result<ResponseState> {
        Ok(self.lock()?.state_machine.state())
    }

    pub(crate) fn subscribe_state(&self) -> Result<watch::Receiver<ResponseState>> {
        Ok(self.lock()?.state_machine.subscribe_state())
    }

    /// Bytes to answer a retransmission of the request with; `None` while
    /// nothing was sent.
    pub(crate) fn replay(&self) -> Result<Option<Bytes>> {
        Ok(self.lock()?.replay.clone())
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Acknowledges the request with an empty message and turns the
    /// answer into a separate one.
    pub(crate) async fn defer(&self, endpoint: &Endpoint) -> Result<()> {
        let ack = {
            let mut inner = self.lock()?;
            if inner.state_machine.state() != ResponseState::New {
                return Err(Error::AlreadySent);
            }

            // A non-confirmable request is never acknowledged.
            let ack = match self.request_type {
                MessageType::Confirmable => Some(codec::encode(&Message::empty_ack(self.request_id))?),
                _ => None,
            };
            inner.replay = ack.clone();
            inner.separate_id = Some(endpoint.next_message_id());
            inner.state_machine.set_state(ResponseState::Deferred);

            ack
        };

        log::debug!(
            "Deferring response to mid={} from /{}",
            self.request_id,
            self.peer
        );
        if let Some(ack) = ack {
            endpoint.send_raw(&ack, &self.peer).await?;
        }

        Ok(())
    }
}

enum Delivery {
    Piggybacked(Bytes),
    Separate(OutgoingMessage),
}

/// A Server Transaction.
///
/// Handle given to the application to answer one inbound request. The
/// answer is piggybacked on the acknowledgement when sent within the
/// piggyback window; past it the request is acknowledged empty and the
/// answer is sent as a separate message, itself retransmitted until
/// acknowledged.
pub struct ServerTransaction {
    endpoint: Endpoint,
    pending: Arc<PendingResponse>,
    code: Code,
    options: Options,
    payload: Option<Bytes>,
}

impl ServerTransaction {
    pub(crate) fn new(request: &IncomingRequest, endpoint: Endpoint) -> Self {
        let pending = PendingResponse::new(
            request.source(),
            request.message_id,
            request.msg_type,
            request.token.clone(),
        );

        Self {
            endpoint,
            pending: Arc::new(pending),
            code: Code::CONTENT,
            options: Options::new(),
            payload: None,
        }
    }

    pub(crate) fn pending(&self) -> Arc<PendingResponse> {
        Arc::clone(&self.pending)
    }

    /// The response code, `2.05 Content` unless changed.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Sets the response code.
    pub fn set_code(&mut self, code: Code) {
        self.code = code;
    }

    /// The response payload, empty unless set.
    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    /// Sets the response payload. An empty payload is sent without the
    /// payload marker.
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        let payload = payload.into();
        self.payload = (!payload.is_empty()).then_some(payload);
    }

    /// Options of the response.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Mutable options of the response.
    pub fn options_mut(&mut self) -> &mut Options {
        &mut self.options
    }

    /// The peer that sent the request.
    pub fn peer(&self) -> SocketAddr {
        self.pending.peer()
    }

    /// Current state of the response.
    pub fn state(&self) -> Result<ResponseState> {
        self.pending.state()
    }

    /// Subscribe to state changes.
    pub fn subscribe_state(&self) -> Result<watch::Receiver<ResponseState>> {
        self.pending.subscribe_state()
    }

    /// Acknowledges the request now; the answer will be a separate message.
    ///
    /// Fails with [`Error::AlreadySent`] once anything was sent.
    pub async fn defer(&mut self) -> Result<()> {
        self.pending.defer(&self.endpoint).await
    }

    /// Sends the answer.
    ///
    /// Resolves once the answer is on the wire, or for a separate answer
    /// to a confirmable request, once the peer acknowledged it. Fails with
    /// [`Error::AlreadySent`] when called twice.
    pub async fn send(&mut self) -> Result<()> {
        match self.prepare_delivery()? {
            Delivery::Piggybacked(bytes) => {
                log::debug!("=> {} to /{}", self.code, self.peer());
                self.endpoint.send_raw(&bytes, &self.peer()).await
            }
            Delivery::Separate(outgoing) if outgoing.is_confirmable() => {
                log::debug!("=> Separate {} to /{}", self.code, self.peer());
                let deadline = Instant::now() + self.endpoint.config().exchange_timeout;
                let transaction = ClientTransaction::send_outgoing(outgoing, deadline, self.endpoint.clone())?;

                transaction.receive_response().await.map(|_| ())
            }
            Delivery::Separate(mut outgoing) => self.endpoint.send_outgoing(&mut outgoing).await,
        }
    }

    fn response_message(&self, msg_type: MessageType, message_id: u16) -> Message {
        Message {
            msg_type,
            code: self.code,
            message_id,
            token: self.pending.token.clone(),
            options: self.options.clone(),
            payload: self.payload.clone(),
        }
    }

    /// Encodes the answer and moves the state forward, under one lock so
    /// that the dispatcher never defers an answered request.
    fn prepare_delivery(&self) -> Result<Delivery> {
        let pending = &self.pending;
        let mut inner = pending.lock()?;

        match inner.state_machine.state() {
            ResponseState::New => {
                let message = match pending.request_type {
                    MessageType::Confirmable => {
                        self.response_message(MessageType::Acknowledgement, pending.request_id)
                    }
                    _ => self.response_message(MessageType::NonConfirmable, self.endpoint.next_message_id()),
                };
                let bytes = codec::encode(&message)?;

                inner.replay = Some(bytes.clone());
                inner.state_machine.set_state(ResponseState::Answered);

                Ok(Delivery::Piggybacked(bytes))
            }
            ResponseState::Deferred => {
                let msg_type = match pending.request_type {
                    MessageType::Confirmable => MessageType::Confirmable,
                    _ => MessageType::NonConfirmable,
                };
                let message_id = inner
                    .separate_id
                    .unwrap_or_else(|| self.endpoint.next_message_id());
                let mut outgoing = OutgoingMessage::new(self.response_message(msg_type, message_id), pending.peer);
                outgoing.encode()?;

                inner.state_machine.set_state(ResponseState::Delivered);

                Ok(Delivery::Separate(outgoing))
            }
            ResponseState::Answered | ResponseState::Delivered => Err(Error::AlreadySent),
        }
    }
}
