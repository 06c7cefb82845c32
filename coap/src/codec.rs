//! Wire codec.
//!
//! Converts datagram payloads to and from [`Message`] values using the
//! fixed 4-byte header, the token, the delta-encoded options and the
//! payload marker.

use bytes::{BufMut, Bytes, BytesMut};
use utils::Scanner;

use crate::error::{DecodeError, EncodeError};
use crate::message::option::{MAX_OPTION_LEN, value_len_bounds};
use crate::message::{Code, MAX_TOKEN_LEN, Message, MessageType, Options};

/// Protocol version carried in every header.
pub const VERSION: u8 = 1;

/// Size of the fixed header.
pub const HEADER_LEN: usize = 4;

/// Marks the end of the options and the start of the payload.
pub const PAYLOAD_MARKER: u8 = 0xFF;

const EXTEND_1_BYTE: u8 = 13;
const EXTEND_2_BYTES: u8 = 14;
const RESERVED_NIBBLE: u8 = 15;

/// Decodes a datagram into a [`Message`].
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let mut scanner = Scanner::new(bytes);

    if bytes.len() < HEADER_LEN {
        return Err(DecodeError::Truncated(bytes.len()));
    }
    let first = scanner.next().map_err(|_| truncated(&scanner))?;
    let version = first >> 6;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let msg_type = MessageType::from_bits(first >> 4);
    let token_len = first & 0x0f;
    if token_len as usize > MAX_TOKEN_LEN {
        return Err(DecodeError::InvalidTokenLength(token_len));
    }
    let code = Code(scanner.next().map_err(|_| truncated(&scanner))?);
    let message_id = scanner.read_u16_be().map_err(|_| truncated(&scanner))?;
    let token = scanner
        .read_bytes(token_len as usize)
        .map_err(|_| truncated(&scanner))?;

    let mut options = Options::new();
    let mut number = 0u16;
    let mut payload = None;

    while let Some(&byte) = scanner.peek_byte() {
        if byte == PAYLOAD_MARKER {
            scanner.next().map_err(|_| truncated(&scanner))?;
            if scanner.is_eof() {
                return Err(DecodeError::EmptyPayload);
            }
            payload = Some(Bytes::copy_from_slice(scanner.read_to_end()));
            break;
        }
        let start = scanner.position();
        scanner.next().map_err(|_| truncated(&scanner))?;

        let delta = read_extended(&mut scanner, byte >> 4, start)?;
        let len = read_extended(&mut scanner, byte & 0x0f, start)?;

        number = u16::try_from(number as u32 + delta)
            .map_err(|_| DecodeError::InvalidOption(start))?;
        let value = scanner
            .read_bytes(len as usize)
            .map_err(|_| truncated(&scanner))?;

        options.push(number, Bytes::copy_from_slice(value));
    }

    Ok(Message {
        msg_type,
        code,
        message_id,
        token: Bytes::copy_from_slice(token),
        options,
        payload,
    })
}

fn truncated(scanner: &Scanner) -> DecodeError {
    DecodeError::Truncated(scanner.position())
}

fn read_extended(scanner: &mut Scanner, nibble: u8, start: usize) -> Result<u32, DecodeError> {
    match nibble {
        EXTEND_1_BYTE => {
            let ext = scanner.next().map_err(|_| truncated(scanner))?;
            Ok(ext as u32 + 13)
        }
        EXTEND_2_BYTES => {
            let ext = scanner.read_u16_be().map_err(|_| truncated(scanner))?;
            Ok(ext as u32 + 269)
        }
        RESERVED_NIBBLE => Err(DecodeError::InvalidOption(start)),
        n => Ok(n as u32),
    }
}

/// Encodes a [`Message`] into a datagram.
pub fn encode(message: &Message) -> Result<Bytes, EncodeError> {
    let token_len = message.token.len();
    if token_len > MAX_TOKEN_LEN {
        return Err(EncodeError::TokenTooLong(token_len));
    }

    let mut buf = BytesMut::with_capacity(
        HEADER_LEN + token_len + message.payload().len() + 1 + message.options.len() * 8,
    );

    buf.put_u8((VERSION << 6) | (message.msg_type.as_u8() << 4) | token_len as u8);
    buf.put_u8(message.code.as_u8());
    buf.put_u16(message.message_id);
    buf.put_slice(&message.token);

    let mut previous = 0u16;
    for (number, value) in message.options.iter() {
        let len = value.len();
        if !value_len_bounds(number).contains(&len) || len > MAX_OPTION_LEN {
            return Err(EncodeError::InvalidOptionLength { number, len });
        }
        let delta = (number - previous) as u32;
        let (delta_nibble, delta_ext) = split_extended(delta);
        let (len_nibble, len_ext) = split_extended(len as u32);

        buf.put_u8((delta_nibble << 4) | len_nibble);
        put_extended(&mut buf, delta_nibble, delta_ext);
        put_extended(&mut buf, len_nibble, len_ext);
        buf.put_slice(value);

        previous = number;
    }

    if let Some(payload) = message.payload.as_ref().filter(|p| !p.is_empty()) {
        buf.put_u8(PAYLOAD_MARKER);
        buf.put_slice(payload);
    }

    Ok(buf.freeze())
}

fn split_extended(value: u32) -> (u8, u32) {
    match value {
        0..13 => (value as u8, 0),
        13..269 => (EXTEND_1_BYTE, value - 13),
        _ => (EXTEND_2_BYTES, value - 269),
    }
}

fn put_extended(buf: &mut BytesMut, nibble: u8, ext: u32) {
    match nibble {
        EXTEND_1_BYTE => buf.put_u8(ext as u8),
        EXTEND_2_BYTES => buf.put_u16(ext as u16),
        _ => (),
    }
}
