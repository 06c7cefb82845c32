//! Binary scanning with the `Scanner` type.

type Result<T> = std::result::Result<T, ScannerError>;

/// A scanner for sequentially reading bytes from a binary input slice.
///
/// The `Scanner` tracks the current byte offset so that callers can report
/// where in a datagram a malformation was found.
pub struct Scanner<'buf> {
    /// The input byte slice being scanned.
    buffer: &'buf [u8],
    /// The current byte index within the buffer.
    index: usize,
}

impl<'buf> Scanner<'buf> {
    /// Create a `Scanner` from a byte slice.
    pub const fn new(buffer: &'buf [u8]) -> Self {
        Scanner { buffer, index: 0 }
    }

    /// Returns a slice of the remaining bytes in the scanner.
    #[inline]
    pub fn remaining(&self) -> &'buf [u8] {
        &self.buffer[self.index..]
    }

    /// Returns the current offset into the input.
    #[inline]
    pub fn position(&self) -> usize {
        self.index
    }

    /// Returns `true` if all the input was consumed.
    pub fn is_eof(&self) -> bool {
        self.index == self.buffer.len()
    }

    /// Returns a reference to the next byte without advancing the scanner
    /// position.
    ///
    /// If the scanner has reached the end of the buffer, it returns `None`.
    #[inline(always)]
    pub fn peek_byte(&self) -> Option<&u8> {
        self.buffer.get(self.index)
    }

    /// Reads the next byte and advance the scanner position.
    ///
    /// If the scanner has reached the end of the buffer, it returns `None`.
    pub fn next_byte(&mut self) -> Option<u8> {
        let byte = self.peek_byte().copied()?;
        self.index += 1;
        Some(byte)
    }

    /// Reads the next byte, failing with [`ScannerError::Eof`] at the end of
    /// the input.
    pub fn next(&mut self) -> Result<u8> {
        self.next_byte().ok_or(ScannerError::Eof)
    }

    /// Reads exactly `n` bytes.
    ///
    /// The scanner is left untouched when fewer than `n` bytes remain.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'buf [u8]> {
        let end = self.index.checked_add(n).ok_or(ScannerError::Eof)?;
        let bytes = self.buffer.get(self.index..end).ok_or(ScannerError::Eof)?;
        self.index = end;
        Ok(bytes)
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16_be(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Reads all the remaining bytes.
    pub fn read_to_end(&mut self) -> &'buf [u8] {
        let bytes = self.remaining();
        self.index = self.buffer.len();
        bytes
    }
}

/// Errors that can occur while reading the buffer.
#[derive(Debug, PartialEq, Clone, Copy, Eq)]
pub enum ScannerError {
    /// End of the buffer reached unexpectedly.
    Eof,
}

impl std::fmt::Display for ScannerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eof => write!(f, "unexpected end of input"),
        }
    }
}

impl std::error::Error for ScannerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u16_be_returns_value() {
        let mut scanner = Scanner::new(&[0x74, 0xaa, 0x01]);
        assert_eq!(scanner.read_u16_be(), Ok(0x74aa));
        assert_eq!(scanner.remaining(), &[0x01]);
    }

    #[test]
    fn test_read_bytes_does_not_advance_when_short() {
        let mut scanner = Scanner::new(&[1, 2, 3]);
        assert_eq!(scanner.read_bytes(4), Err(ScannerError::Eof));
        assert_eq!(scanner.position(), 0);
        assert_eq!(scanner.read_bytes(3), Ok(&[1u8, 2, 3][..]));
        assert!(scanner.is_eof());
    }

    #[test]
    fn test_read_to_end_consumes_everything() {
        let mut scanner = Scanner::new(b"hello");
        scanner.next().unwrap();
        assert_eq!(scanner.read_to_end(), b"ello");
        assert!(scanner.is_eof());
        assert_eq!(scanner.next(), Err(ScannerError::Eof));
    }

    #[test]
    fn test_peek_byte_does_not_advance() {
        let mut scanner = Scanner::new(&[0xff]);
        assert_eq!(scanner.peek_byte(), Some(&0xff));
        assert_eq!(scanner.position(), 0);
        assert_eq!(scanner.next_byte(), Some(0xff));
        assert_eq!(scanner.next_byte(), None);
    }
}
