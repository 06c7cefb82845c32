use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Decode: {0}")]
    DecodeError(#[from] DecodeError),

    #[error("Encode: {0}")]
    EncodeError(#[from] EncodeError),

    #[error("Preparation failed: {0}")]
    PreparationError(String),

    #[error("Transport: {0}")]
    TransportError(String),

    #[error("Transaction Error: {0}")]
    TransactionError(#[from] TransactionError),

    #[error("Already sent")]
    AlreadySent,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Poisoned lock")]
    PoisonedLock,
}

/// A malformed inbound datagram.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum DecodeError {
    #[error("message truncated at offset {0}")]
    Truncated(usize),

    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid token length {0}")]
    InvalidTokenLength(u8),

    #[error("invalid option encoding at offset {0}")]
    InvalidOption(usize),

    #[error("payload marker not followed by a payload")]
    EmptyPayload,
}

/// An outbound message that cannot be put on the wire.
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum EncodeError {
    #[error("token of {0} bytes exceeds the 8 bytes limit")]
    TokenTooLong(usize),

    #[error("value of option {number} has an invalid length of {len} bytes")]
    InvalidOptionLength { number: u16, len: usize },
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TransactionError {
    #[error("Failed to send message: {0}")]
    SendFailed(String),
    #[error("Timeout reached after send message")]
    Timeout,
    #[error("Message rejected with a reset by the peer")]
    Reset,
    #[error("Endpoint is shutting down")]
    Shutdown,
}
