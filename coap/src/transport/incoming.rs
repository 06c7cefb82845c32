use std::fmt;
use std::net::SocketAddr;
use std::ops;

use crate::message::Message;

/// A decoded message received from a peer.
#[derive(Clone)]
pub struct IncomingMessage {
    /// The CoAP message.
    pub message: Message,
    /// Incoming message info.
    pub incoming_info: Box<IncomingInfo>,
}

/// An inbound request, as handed to the application.
pub type IncomingRequest = IncomingMessage;

/// The message that finalized an outbound transaction.
pub type IncomingResponse = IncomingMessage;

impl IncomingMessage {
    pub fn new(message: Message, transport: super::TransportMessage) -> Self {
        Self {
            message,
            incoming_info: Box::new(IncomingInfo { transport }),
        }
    }

    /// Address of the peer that sent this message.
    pub fn source(&self) -> SocketAddr {
        self.incoming_info.transport.packet.source
    }

    /// Local address the message was received on.
    pub fn local_addr(&self) -> SocketAddr {
        self.incoming_info.transport.transport.local_addr()
    }

    pub fn into_message(self) -> Message {
        self.message
    }
}

impl ops::Deref for IncomingMessage {
    type Target = Message;
    fn deref(&self) -> &Self::Target {
        &self.message
    }
}

impl fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingMessage")
            .field("message", &self.message)
            .field("source", &self.source())
            .finish()
    }
}

/// Incoming message info.
#[derive(Clone)]
pub struct IncomingInfo {
    /// The received transport packet.
    pub transport: super::TransportMessage,
}
