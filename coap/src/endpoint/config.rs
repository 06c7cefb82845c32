use std::time::Duration;

use crate::DEFAULT_PORT;
use crate::transaction::{ACK_TIMEOUT, EXCHANGE_LIFETIME, EXCHANGE_TIMEOUT, PIGGYBACK_WINDOW};

/// Tunables of an [`Endpoint`](super::Endpoint).
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// # use coap::endpoint::EndpointConfig;
/// let config = EndpointConfig {
///     exchange_timeout: Duration::from_secs(10),
///     ..Default::default()
/// };
/// assert_eq!(config.default_port, 5683);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Destination port when a request names none.
    pub default_port: u16,
    /// Base retransmission period of confirmable messages.
    pub ack_timeout: Duration,
    /// Deadline of an outbound transaction, unless the request sets one.
    pub exchange_timeout: Duration,
    /// Time the handler has to answer before the request is acknowledged
    /// empty and the answer becomes a separate message.
    pub piggyback_window: Duration,
    /// How long a response is kept to answer retransmitted requests.
    pub response_lifetime: Duration,
    /// Maximum number of responses kept; the oldest go first.
    pub response_cache_capacity: usize,
    /// Period of the sweep of expired responses.
    pub sweep_interval: Duration,
    /// Length of generated tokens, at most 8.
    pub token_length: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            default_port: DEFAULT_PORT,
            ack_timeout: ACK_TIMEOUT,
            exchange_timeout: EXCHANGE_TIMEOUT,
            piggyback_window: PIGGYBACK_WINDOW,
            response_lifetime: EXCHANGE_LIFETIME,
            response_cache_capacity: 1024,
            sweep_interval: Duration::from_secs(30),
            token_length: 4,
        }
    }
}
