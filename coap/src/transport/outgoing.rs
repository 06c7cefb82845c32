use std::net::SocketAddr;
use std::ops;

use bytes::Bytes;

use crate::codec;
use crate::error::Result;
use crate::message::Message;

/// This type represents an outbound CoAP message.
#[derive(Debug)]
pub struct OutgoingMessage {
    /// The CoAP message.
    pub message: Message,
    /// The socket this message should be sent to.
    pub target: SocketAddr,
    /// Message encoded representation, empty until first encoded.
    pub encoded: Bytes,
}

impl OutgoingMessage {
    pub fn new(message: Message, target: SocketAddr) -> Self {
        Self {
            message,
            target,
            encoded: Bytes::new(),
        }
    }

    /// Encodes the message once; retransmissions reuse the same bytes.
    pub fn encode(&mut self) -> Result<Bytes> {
        if self.encoded.is_empty() {
            self.encoded = codec::encode(&self.message)?;
        }
        Ok(self.encoded.clone())
    }
}

impl ops::Deref for OutgoingMessage {
    type Target = Message;
    fn deref(&self) -> &Self::Target {
        &self.message
    }
}
