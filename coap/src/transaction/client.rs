use std::future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, sleep, sleep_until, timeout_at};
use tokio_util::either::Either;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result, TransactionError};
use crate::message::Request;
use crate::transaction::fsm::{State, StateMachine};
use crate::transaction::key::TransactionKey;
use crate::transport::incoming::{IncomingMessage, IncomingResponse};
use crate::transport::outgoing::OutgoingMessage;

/// A Client Transaction.
///
/// Sends one outbound message and waits for the message that finalizes
/// it. Confirmable messages are retransmitted until acknowledged, with the
/// `n`-th retransmission sent `n²` ack timeouts after the previous one.
/// The transaction fails once its deadline passes.
///
/// The outcome is delivered exactly once, through
/// [`receive_response`](Self::receive_response).
#[derive(Debug)]
pub struct ClientTransaction {
    message_id_key: TransactionKey,
    token_key: TransactionKey,
    state: watch::Receiver<State>,
    completion: oneshot::Receiver<Result<IncomingResponse>>,
}

struct RetransmitTask {
    keys: [TransactionKey; 2],
    endpoint: Endpoint,
    state_machine: StateMachine<State>,
    outgoing: OutgoingMessage,
    channel: mpsc::Receiver<IncomingMessage>,
    ack_timeout: Duration,
    deadline: Instant,
}

impl ClientTransaction {
    /// Prepares `request` and sends it in a new transaction.
    ///
    /// The deadline starts now, so time spent resolving the destination
    /// counts against it.
    pub(crate) async fn send_request(request: Request, endpoint: Endpoint) -> Result<Self> {
        let timeout = request
            .timeout
            .unwrap_or(endpoint.config().exchange_timeout);
        let deadline = Instant::now() + timeout;

        let outgoing = timeout_at(deadline, endpoint.prepare_outgoing(request))
            .await
            .map_err(|_| TransactionError::Timeout)??;

        Self::send_outgoing(outgoing, deadline, endpoint)
    }

    /// Registers `outgoing` under its message-id and token keys and spawns
    /// the task that sends it.
    pub(crate) fn send_outgoing(
        mut outgoing: OutgoingMessage,
        deadline: Instant,
        endpoint: Endpoint,
    ) -> Result<Self> {
        if endpoint.is_shutdown() {
            return Err(TransactionError::Shutdown.into());
        }
        outgoing.encode()?;

        let peer = outgoing.target;
        let message_id_key = TransactionKey::from_message_id(outgoing.message_id, &peer);
        let token_key = TransactionKey::from_token(&outgoing.token, &peer);

        let mut state_machine = StateMachine::new(State::Preparing);
        let state = state_machine.subscribe_state();

        let (sender, channel) = mpsc::channel(10);
        endpoint
            .transactions()
            .register(&[message_id_key, token_key], sender)?;
        state_machine.set_state(State::Registered);

        log::trace!(
            "Transaction Created [{:?}] ({} mid={} to /{})",
            message_id_key,
            outgoing.code,
            outgoing.message_id,
            peer
        );

        let (completion_tx, completion) = oneshot::channel();
        let task = RetransmitTask {
            keys: [message_id_key, token_key],
            ack_timeout: endpoint.config().ack_timeout,
            endpoint,
            state_machine,
            outgoing,
            channel,
            deadline,
        };
        tokio::spawn(task.run(completion_tx));

        Ok(Self {
            message_id_key,
            token_key,
            state,
            completion,
        })
    }

    /// Waits for the outcome of the transaction.
    ///
    /// Resolves with the message that finalized it: the response, or the
    /// empty acknowledgement when the message sent was not a request. A
    /// reset, the deadline, a transport failure or the endpoint shutting
    /// down resolve with the matching [`TransactionError`].
    pub async fn receive_response(self) -> Result<IncomingResponse> {
        self.completion.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Get the current state of the transaction.
    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<State> {
        self.state.clone()
    }

    /// Key matching acknowledgements and resets.
    pub fn message_id_key(&self) -> &TransactionKey {
        &self.message_id_key
    }

    /// Key matching responses by token.
    pub fn token_key(&self) -> &TransactionKey {
        &self.token_key
    }
}

impl RetransmitTask {
    async fn run(mut self, completion: oneshot::Sender<Result<IncomingResponse>>) {
        let result = self.drive().await;

        if let Err(err) = self.endpoint.transactions().finish(&self.keys) {
            log::error!("Failed to remove transaction {:?}: {}", self.keys[0], err);
        }
        self.state_machine.set_state(terminal_state(&result));

        log::trace!(
            "Transaction Destroyed [{:?}] ({})",
            self.keys[0],
            self.state_machine.state()
        );

        let _ = completion.send(result);
    }

    async fn drive(&mut self) -> Result<IncomingResponse> {
        let mut shutdown = self.endpoint.shutdown_signal();
        if *shutdown.borrow_and_update() {
            return Err(TransactionError::Shutdown.into());
        }

        self.transmit().await?;
        self.state_machine.set_state(State::Retrying);

        let mut attempt = 1;
        let retry = if self.outgoing.is_confirmable() {
            Either::Left(sleep(self.retry_period(attempt)))
        } else {
            Either::Right(future::pending::<()>())
        };
        let deadline = sleep_until(self.deadline);

        tokio::pin!(retry);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow_and_update() {
                        return Err(TransactionError::Shutdown.into());
                    }
                }
                received = self.channel.recv() => {
                    let Some(message) = received else {
                        return Err(TransactionError::Shutdown.into());
                    };
                    if self.awaits_separate_response(&message) {
                        log::debug!(
                            "Request mid={} acknowledged, waiting for a separate response",
                            self.outgoing.message_id
                        );
                        retry.set(Either::Right(future::pending()));
                        self.state_machine.set_state(State::AwaitingResponse);
                        continue;
                    }
                    if message.is_reset() {
                        return Err(TransactionError::Reset.into());
                    }
                    return Ok(message);
                }
                _ = deadline.as_mut() => {
                    log::debug!(
                        "Transaction mid={} to /{} timed out",
                        self.outgoing.message_id,
                        self.outgoing.target
                    );
                    return Err(TransactionError::Timeout.into());
                }
                _ = retry.as_mut() => {
                    attempt += 1;
                    log::debug!(
                        "Retransmitting mid={} to /{} (attempt {})",
                        self.outgoing.message_id,
                        self.outgoing.target,
                        attempt
                    );
                    self.transmit().await?;
                    retry.set(Either::Left(sleep(self.retry_period(attempt))));
                }
            }
        }
    }

    async fn transmit(&mut self) -> Result<()> {
        match self.endpoint.send_outgoing(&mut self.outgoing).await {
            Ok(()) => Ok(()),
            Err(err @ Error::TransactionError(_)) => Err(err),
            Err(err) => {
                log::warn!("Failed to send mid={}: {}", self.outgoing.message_id, err);
                Err(TransactionError::SendFailed(err.to_string()).into())
            }
        }
    }

    /// Wait after the `attempt`-th transmission.
    fn retry_period(&self, attempt: u32) -> Duration {
        self.ack_timeout * attempt.saturating_mul(attempt)
    }

    /// An empty acknowledgement of a request only stops retransmission;
    /// the response follows in its own message.
    fn awaits_separate_response(&self, message: &IncomingMessage) -> bool {
        self.outgoing.is_request() && message.is_ack() && message.is_empty()
    }
}

fn terminal_state(result: &Result<IncomingResponse>) -> State {
    match result {
        Ok(message) if message.is_empty() => State::Acknowledged,
        Ok(_) => State::Responded,
        Err(Error::TransactionError(TransactionError::Reset)) => State::Reset,
        Err(Error::TransactionError(TransactionError::Timeout)) => State::TimedOut,
        Err(_) => State::SendFailed,
    }
}
