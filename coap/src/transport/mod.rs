//! Transport layer.
//!
//! This module defines how CoAP datagrams are exchanged with peers.
//!
//! All transports implement the [`CoapTransport`] trait and expose a
//! common interface for sending datagrams. The [`Transport`] struct is a
//! shared handle to any transport implementation.
//!
//! # Available Transports
//!
//! - [`udp`]: CoAP over UDP transport implementation.

use std::fmt;
use std::net::SocketAddr;
use std::ops;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec;
use crate::error::{DecodeError, Result};
use crate::message::Message;

pub mod incoming;
pub mod outgoing;
pub mod udp;

/// Size of the receive buffer; larger datagrams are truncated and then
/// rejected by the decoder.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// This type is a wrapper around a CoAP transport implementation.
#[derive(Clone)]
pub struct Transport {
    /// Shared transport instance.
    shared: Arc<dyn CoapTransport>,
}

impl Transport {
    /// Creates a new `Transport` instance with the given implementation.
    pub fn new(transport: impl CoapTransport) -> Self {
        Transport {
            shared: Arc::new(transport),
        }
    }
}

impl ops::Deref for Transport {
    type Target = dyn CoapTransport;

    fn deref(&self) -> &Self::Target {
        &*self.shared
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transport({})", self.local_addr())
    }
}

/// Trait for all transport implementations.
#[async_trait]
pub trait CoapTransport: Send + Sync + 'static {
    /// Sends data on the socket to the given address. On success, returns the
    /// number of bytes written.
    async fn send_msg(&self, buf: &[u8], address: &SocketAddr) -> Result<usize>;

    /// Get the local socket address bound to this transport.
    fn local_addr(&self) -> SocketAddr;
}

/// A datagram received from the network.
#[derive(Clone, Debug)]
pub struct Packet {
    /// Raw packet payload.
    pub data: Bytes,
    /// Remote address of the sender.
    pub source: SocketAddr,
    /// Time when the packet was received.
    pub timestamp: SystemTime,
}

impl Packet {
    /// Creates a new `Packet` with the given `data` and `source` addr.
    pub fn new(data: Bytes, source: SocketAddr) -> Self {
        Self {
            data,
            source,
            timestamp: SystemTime::now(),
        }
    }
}

/// A network packet received through a transport.
#[derive(Clone, Debug)]
pub struct TransportMessage {
    /// Transport that received the packet.
    pub transport: Transport,
    /// The raw packet data and metadata.
    pub packet: Packet,
}

impl TransportMessage {
    /// Decode the packet into a CoAP message.
    pub fn parse(&self) -> std::result::Result<Message, DecodeError> {
        let Self { transport, packet } = self;

        codec::decode(&packet.data).inspect_err(|err| {
            log::warn!(
                "Ignoring {} bytes packet from /{} on {}: {}",
                packet.data.len(),
                packet.source,
                transport.local_addr(),
                err,
            );
        })
    }
}
