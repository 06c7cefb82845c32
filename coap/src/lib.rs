//! # coap
//!
//! A rust library that implements the message layer of the Constrained
//! Application Protocol (CoAP) over UDP.
//!

pub mod codec;
pub mod endpoint;
pub mod message;
pub mod router;
pub mod transaction;
pub mod transport;

pub(crate) mod error;

pub use endpoint::{Endpoint, EndpointHandler};
pub use error::{DecodeError, EncodeError, Error, Result, TransactionError};
pub use router::Router;

#[cfg(test)]
#[macro_use]
extern crate assert_matches;

#[cfg(test)]
pub(crate) mod test_utils;

use bytes::Bytes;
use rand::Rng;

/// Well-known CoAP port.
pub const DEFAULT_PORT: u16 = 5683;

/// Generates a random token of `n` bytes, at most
/// [`MAX_TOKEN_LEN`](message::MAX_TOKEN_LEN).
pub fn generate_token(n: usize) -> Bytes {
    let mut token = vec![0u8; n.min(message::MAX_TOKEN_LEN)];
    rand::rng().fill(&mut token[..]);
    Bytes::from(token)
}
