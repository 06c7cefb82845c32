//! Message model.

use std::fmt;

use bytes::Bytes;

mod code;
pub mod option;
mod request;

pub use code::Code;
pub use option::Options;
pub use request::Request;

/// Maximum token length in bytes.
pub const MAX_TOKEN_LEN: usize = 8;

/// The type of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum MessageType {
    /// Requires an acknowledgement, retransmitted until acknowledged.
    #[default]
    Confirmable = 0,
    /// Does not require an acknowledgement.
    NonConfirmable = 1,
    /// Acknowledges a confirmable message, optionally carrying a response.
    Acknowledgement = 2,
    /// Rejects a message that could not be processed.
    Reset = 3,
}

impl MessageType {
    /// Builds a message type from the two type bits of the header.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::Confirmable,
            1 => Self::NonConfirmable,
            2 => Self::Acknowledgement,
            _ => Self::Reset,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmable => "CON",
            Self::NonConfirmable => "NON",
            Self::Acknowledgement => "ACK",
            Self::Reset => "RST",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message as exchanged on the wire.
///
/// The peer addresses are not part of the message itself, see
/// [`IncomingMessage`](crate::transport::incoming::IncomingMessage).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// The message type.
    pub msg_type: MessageType,
    /// The request method or response code.
    pub code: Code,
    /// The message id, used for deduplication and ack matching.
    pub message_id: u16,
    /// The token, used to match responses to requests.
    pub token: Bytes,
    /// The message options.
    pub options: Options,
    /// The payload; `None` when the message has no payload.
    pub payload: Option<Bytes>,
}

impl Message {
    pub fn new(msg_type: MessageType, code: Code, message_id: u16) -> Self {
        Self {
            msg_type,
            code,
            message_id,
            ..Default::default()
        }
    }

    /// An empty acknowledgement for the message `message_id`.
    pub fn empty_ack(message_id: u16) -> Self {
        Self::new(MessageType::Acknowledgement, Code::EMPTY, message_id)
    }

    /// An empty reset for the message `message_id`.
    pub fn reset(message_id: u16) -> Self {
        Self::new(MessageType::Reset, Code::EMPTY, message_id)
    }

    pub fn with_token(mut self, token: impl Into<Bytes>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.set_payload(payload);
        self
    }

    /// Sets the payload; an empty payload is stored as no payload.
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        let payload = payload.into();
        self.payload = (!payload.is_empty()).then_some(payload);
    }

    /// Returns the payload bytes, empty when there is no payload.
    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    pub fn is_request(&self) -> bool {
        self.code.is_request()
    }

    pub fn is_response(&self) -> bool {
        self.code.is_response()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn is_confirmable(&self) -> bool {
        self.msg_type == MessageType::Confirmable
    }

    pub fn is_ack(&self) -> bool {
        self.msg_type == MessageType::Acknowledgement
    }

    pub fn is_reset(&self) -> bool {
        self.msg_type == MessageType::Reset
    }

    /// Returns `true` for an empty confirmable message (a ping).
    pub fn is_ping(&self) -> bool {
        self.is_confirmable() && self.is_empty()
    }

    /// The target path reconstructed from the `Uri-Path` options.
    pub fn path(&self) -> Option<String> {
        self.options.path()
    }

    /// The target host from the `Uri-Host` option.
    pub fn host(&self) -> Option<String> {
        self.options.host()
    }

    /// The target port from the `Uri-Port` option.
    pub fn port(&self) -> Option<u16> {
        self.options.port()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} mid={} token={:02x?}",
            self.msg_type,
            self.code,
            self.message_id,
            self.token.as_ref()
        )?;
        if let Some(path) = self.path() {
            write!(f, " {path}")?;
        }
        Ok(())
    }
}
