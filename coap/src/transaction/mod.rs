#![warn(missing_docs)]
//! Transaction Layer.
//!
//! Outbound confirmable messages and requests are driven by a
//! [`ClientTransaction`]; inbound requests are answered through a
//! [`ServerTransaction`]. Both are correlated with inbound datagrams by the
//! [`TransactionManager`] using [`TransactionKey`]s.

use std::time::Duration;

pub use client::ClientTransaction;
pub use fsm::{ResponseState, State};
pub use key::TransactionKey;
pub use manager::TransactionManager;
pub use server::ServerTransaction;

/// Outbound transactions.
pub mod client;
pub(crate) mod fsm;
mod key;
pub(crate) mod manager;
/// Inbound requests waiting for an answer.
pub mod server;

/// Base retransmission period; the `n`-th retransmission waits
/// `ACK_TIMEOUT * n²` after the previous one.
pub(crate) const ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Default deadline of an outbound transaction.
pub(crate) const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a response is kept to answer retransmitted requests.
pub(crate) const EXCHANGE_LIFETIME: Duration = Duration::from_secs(247);

/// How long the application has to answer before an empty acknowledgement
/// is sent and the response becomes a separate one.
pub(crate) const PIGGYBACK_WINDOW: Duration = Duration::from_millis(50);
