use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

use super::{Code, MessageType, Options};

/// A request-like description of a message to send.
///
/// Missing fields are filled in when the message is prepared for
/// sending: the message id and token are generated, `path` is split into
/// `Uri-Path` options, `host` is resolved into the destination address and
/// `port` defaults to the well-known port.
///
/// # Examples
///
/// ```
/// # use coap::message::{Code, Request};
/// let request = Request::get("/one")
///     .with_host("127.0.0.1")
///     .with_port(5683);
/// assert_eq!(request.code(), Code::GET);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub(crate) code: Code,
    pub(crate) msg_type: MessageType,
    pub(crate) path: Option<String>,
    pub(crate) host: Option<String>,
    pub(crate) port: Option<u16>,
    pub(crate) peer: Option<SocketAddr>,
    pub(crate) options: Options,
    pub(crate) payload: Option<Bytes>,
    pub(crate) message_id: Option<u16>,
    pub(crate) token: Option<Bytes>,
    pub(crate) timeout: Option<Duration>,
}

impl Request {
    /// Creates a confirmable message with the given code.
    pub fn new(code: Code) -> Self {
        Self {
            code,
            ..Default::default()
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Code::GET).with_path(path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Code::POST).with_path(path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Code::PUT).with_path(path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Code::DELETE).with_path(path)
    }

    pub fn with_code(mut self, code: Code) -> Self {
        self.code = code;
        self
    }

    pub fn with_type(mut self, msg_type: MessageType) -> Self {
        self.msg_type = msg_type;
        self
    }

    /// Sets the target path, e.g. `/sensors/temp`.
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(path.to_owned());
        self
    }

    /// Sets the destination host, an address literal or a name to resolve.
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = Some(host.to_owned());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the destination address directly, bypassing `host` and `port`.
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_option(mut self, number: u16, value: impl Into<Bytes>) -> Self {
        self.options.push(number, value);
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_message_id(mut self, message_id: u16) -> Self {
        self.message_id = Some(message_id);
        self
    }

    pub fn with_token(mut self, token: impl Into<Bytes>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Overrides the transaction deadline for this request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn msg_type(&self) -> MessageType {
        self.msg_type
    }

    /// Returns `true` when sending this message creates a transaction.
    pub fn is_trackable(&self) -> bool {
        self.msg_type == MessageType::Confirmable || self.code.is_request()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_default_to_confirmable() {
        let request = Request::get("/one");
        assert_eq!(request.msg_type(), MessageType::Confirmable);
        assert_eq!(request.path.as_deref(), Some("/one"));
        assert!(request.is_trackable());
    }

    #[test]
    fn test_non_confirmable_response_is_not_trackable() {
        let request = Request::new(Code::CONTENT).with_type(MessageType::NonConfirmable);
        assert!(!request.is_trackable());

        let request = Request::get("/").with_type(MessageType::NonConfirmable);
        assert!(request.is_trackable());
    }
}
